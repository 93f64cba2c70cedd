// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Assembles a [`Pipeline`] from configuration.

use std::sync::Arc;

use quarry_config::QuarryConfig;
use quarry_core::{DomainGuard, QuarryError};
use quarry_llm::{ChatModel, LlmAnswerComposer, LlmDomainGuard, LlmQueryGenerator, OpenAiChatClient};
use quarry_memory::ConversationMemory;
use quarry_pipeline::{KeywordGuard, Pipeline, PipelineSettings};
use quarry_sql::{QueryValidator, RetrievalOptions, SqliteEngine, SqliteSchemaProvider};
use tracing::info;

/// Guard selected by `guard.mode`. The model-backed guard falls back to the
/// keyword guard when the model is unavailable.
pub fn select_guard(config: &QuarryConfig, chat: Arc<dyn ChatModel>) -> Arc<dyn DomainGuard> {
    let keyword: Arc<dyn DomainGuard> = Arc::new(KeywordGuard::from_config(&config.guard));
    match config.guard.mode.as_str() {
        "llm" => Arc::new(LlmDomainGuard::new(chat, keyword, config.guard.ask_threshold)),
        _ => keyword,
    }
}

pub async fn build_pipeline(config: &QuarryConfig) -> Result<Pipeline, QuarryError> {
    let validator = QueryValidator::for_dialect(&config.database.dialect).ok_or_else(|| {
        QuarryError::Config(format!("unknown SQL dialect `{}`", config.database.dialect))
    })?;

    let chat: Arc<dyn ChatModel> = Arc::new(OpenAiChatClient::from_config(&config.llm)?);
    let engine = SqliteEngine::open(&config.database.path)?;
    let schema = SqliteSchemaProvider::open(
        &config.database.path,
        RetrievalOptions::from(&config.database),
    )
    .await?;
    let memory = ConversationMemory::from_config(&config.memory)?;

    info!(
        database = %config.database.path,
        dialect = %validator.dialect(),
        model = %config.llm.model,
        guard = %config.guard.mode,
        "pipeline configured"
    );

    Pipeline::builder()
        .guard(select_guard(config, Arc::clone(&chat)))
        .schema(Arc::new(schema))
        .generator(Arc::new(LlmQueryGenerator::new(
            Arc::clone(&chat),
            validator.dialect().to_string(),
        )))
        .composer(Arc::new(LlmAnswerComposer::new(chat)))
        .engine(Arc::new(engine))
        .memory(Arc::new(memory))
        .validator(validator)
        .settings(PipelineSettings::from(&config.pipeline))
        .build()
}
