// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat-model backed query generation.

use std::sync::Arc;

use async_trait::async_trait;
use quarry_core::{
    GenerationError, GenerationRequest, Params, QueryGenerator, RepairContext, SqlCommand, codes,
};
use tracing::{debug, warn};

use crate::client::ChatModel;
use crate::prompt::{clip, extract_json_object, history_lines};
use crate::types::ChatMessage;

/// Character cap for the previous statement in a repair section.
const REPAIR_STATEMENT_CHARS: usize = 2000;

/// Character cap for the failure text in a repair section.
const REPAIR_ERROR_CHARS: usize = 600;

fn system_rules(dialect: &str) -> String {
    format!(
        r#"You are a production-grade Text-to-SQL generator for {dialect}.

CRITICAL OUTPUT FORMAT:
- Output MUST be valid JSON ONLY. No markdown. No code fences. No extra text.
- Output must match exactly this shape:

{{
  "sql": "SELECT ... ;",
  "params": {{ "param_name": "value" }},
  "assumptions": ["..."],
  "expected_columns": ["col1","col2"]
}}

SQL RULES:
- ONLY ONE SELECT statement. No multiple statements.
- No comments, no explanations.
- If returning rows, add LIMIT 200 (unless the user asks for an aggregate only).
- Use {dialect} syntax ONLY.
- Reference params in the SQL as :param_name.

IMPORTANT SCHEMA RULES:
- The database schema will be provided in the user message.
- Use ONLY tables and columns that appear in the provided schema.
- NEVER invent table or column names.
- If required information is missing from the schema, state assumptions explicitly.
"#
    )
}

/// Generates SQL commands by prompting a [`ChatModel`].
pub struct LlmQueryGenerator {
    model: Arc<dyn ChatModel>,
    dialect: String,
}

impl LlmQueryGenerator {
    /// `dialect` names the SQL flavour the model is told to write (e.g. "SQLite").
    pub fn new(model: Arc<dyn ChatModel>, dialect: impl Into<String>) -> Self {
        Self {
            model,
            dialect: dialect.into(),
        }
    }

    /// Builds the user message for one attempt.
    pub fn build_prompt(&self, request: &GenerationRequest) -> String {
        let mut parts = Vec::new();

        let history = history_lines(&request.history);
        if !history.is_empty() {
            parts.push(format!(
                "Conversation context (most recent last; use as background, do not invent schema):\n{history}"
            ));
        }
        parts.push(format!("Current question:\n{}", request.question));
        if !request.schema_context.trim().is_empty() {
            parts.push(request.schema_context.clone());
        }
        parts.push(
            "Rules:\n\
             - Use ONLY the schema provided above.\n\
             - Do NOT guess table or column names.\n\
             - If the question is ambiguous, state assumptions explicitly.\n\
             - If prior context implies filters/time range/entities, apply them and state assumptions.\n"
                .to_string(),
        );
        if let Some(repair) = &request.repair {
            parts.push(repair_section(repair));
        }

        parts
            .into_iter()
            .filter(|p| !p.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

fn repair_section(repair: &RepairContext) -> String {
    let error = clip(&repair.failure.message, REPAIR_ERROR_CHARS);

    if repair.failure.code == codes::GENERATION_PARSE_FAILED {
        return format!(
            "REPAIR INSTRUCTIONS (attempt {}):\n\
             - Output ONLY valid JSON, nothing else.\n\
             - JSON must have keys: sql, params, assumptions, expected_columns.\n\
             - Fix this error: {error}\n\
             - SQL must be ONE SELECT statement, start with SELECT, end with ';'.\n",
            repair.attempt
        );
    }

    format!(
        "EXECUTION FEEDBACK (the previous SQL failed):\n\
         - Attempt: {}\n\
         - Previous SQL: {}\n\
         - DB Error: {}: {error}\n\n\
         Fix requirements:\n\
         - Rewrite the SQL so it EXECUTES successfully and still answers the current question.\n\
         - Use ONLY the schema provided above. DO NOT guess table/column names.\n\
         - If an unknown column/table error happened, DO NOT invent names: re-check the schema context.\n\
         - Output ONLY valid JSON with keys: sql, params, assumptions, expected_columns.\n\
         - SQL must be ONE SELECT statement, start with SELECT, end with ';'.\n",
        repair.attempt,
        clip(&repair.previous_statement, REPAIR_STATEMENT_CHARS),
        repair.failure.code,
    )
}

/// Parses a completion into a command. Only the shape is checked here; the
/// statement itself is validated by the pipeline.
pub fn parse_command(raw: &str) -> Result<SqlCommand, GenerationError> {
    let object = extract_json_object(raw).ok_or_else(|| {
        GenerationError::Malformed("completion did not contain a JSON object".into())
    })?;

    let statement = match object.get("sql") {
        Some(serde_json::Value::String(sql)) if !sql.trim().is_empty() => sql.trim().to_string(),
        Some(serde_json::Value::String(_)) | None => {
            return Err(GenerationError::Malformed("JSON has no \"sql\" statement".into()));
        }
        Some(other) => {
            return Err(GenerationError::Malformed(format!(
                "\"sql\" must be a string, got {other}"
            )));
        }
    };

    let params = match object.get("params") {
        Some(serde_json::Value::Object(map)) => map.clone(),
        Some(serde_json::Value::Null) | None => Params::new(),
        Some(other) => {
            return Err(GenerationError::Malformed(format!(
                "\"params\" must be an object, got {other}"
            )));
        }
    };

    Ok(SqlCommand {
        statement,
        params,
        assumptions: string_list(object.get("assumptions")),
        expected_columns: string_list(object.get("expected_columns")),
    })
}

fn string_list(value: Option<&serde_json::Value>) -> Vec<String> {
    match value {
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::to_string)
            .collect(),
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

#[async_trait]
impl QueryGenerator for LlmQueryGenerator {
    fn name(&self) -> &str {
        "llm"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<SqlCommand, GenerationError> {
        let messages = [
            ChatMessage::system(system_rules(&self.dialect)),
            ChatMessage::user(self.build_prompt(request)),
        ];
        let attempt = request.repair.as_ref().map_or(0, |r| r.attempt);
        debug!(model = self.model.name(), attempt, "requesting SQL generation");

        let raw = self.model.complete(&messages).await?;
        parse_command(&raw).inspect_err(|e| {
            warn!(attempt, error = %e, "generator output rejected");
        })
    }
}
