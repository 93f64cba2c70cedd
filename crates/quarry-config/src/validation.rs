// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic checks that serde attributes cannot express.

use crate::diagnostic::ConfigError;
use crate::model::QuarryConfig;

/// Dialect names the statement validator understands.
pub const KNOWN_DIALECTS: &[&str] = &["sqlite", "mysql", "postgres", "generic", "ansi"];

/// Domain guard implementations selectable through `guard.mode`.
pub const GUARD_MODES: &[&str] = &["keyword", "llm"];

/// Validates a deserialized configuration.
///
/// Collects every violation instead of stopping at the first one.
pub fn validate_config(config: &QuarryConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    let p = &config.pipeline;
    if p.chunk_size == 0 {
        fail("pipeline.chunk_size must be greater than 0".into());
    }
    if p.max_rows == 0 {
        fail("pipeline.max_rows must be greater than 0".into());
    }
    if p.statement_timeout_ms == 0 {
        fail("pipeline.statement_timeout_ms must be greater than 0".into());
    }
    if p.event_buffer == 0 {
        fail("pipeline.event_buffer must be greater than 0".into());
    }

    if config.memory.max_messages == 0 {
        fail("memory.max_messages must be greater than 0".into());
    }
    if config.memory.max_chars_per_message == 0 {
        fail("memory.max_chars_per_message must be greater than 0".into());
    }
    if config.memory.default_conversation_id.trim().is_empty() {
        fail("memory.default_conversation_id must not be empty".into());
    }

    let db = &config.database;
    if db.path.trim().is_empty() {
        fail("database.path must not be empty".into());
    }
    if !KNOWN_DIALECTS.contains(&db.dialect.to_ascii_lowercase().as_str()) {
        fail(format!(
            "database.dialect `{}` is not supported (expected one of: {})",
            db.dialect,
            KNOWN_DIALECTS.join(", ")
        ));
    }
    if db.top_k_tables == 0 {
        fail("database.top_k_tables must be greater than 0".into());
    }
    if db.max_columns_per_table == 0 {
        fail("database.max_columns_per_table must be greater than 0".into());
    }

    if config.llm.base_url.trim().is_empty() {
        fail("llm.base_url must not be empty".into());
    }
    if !(0.0..=2.0).contains(&config.llm.temperature) {
        fail(format!(
            "llm.temperature must be between 0.0 and 2.0, got {}",
            config.llm.temperature
        ));
    }

    if !GUARD_MODES.contains(&config.guard.mode.as_str()) {
        fail(format!(
            "guard.mode `{}` is not supported (expected one of: {})",
            config.guard.mode,
            GUARD_MODES.join(", ")
        ));
    }
    if !(0.0..=1.0).contains(&config.guard.ask_threshold) {
        fail(format!(
            "guard.ask_threshold must be between 0.0 and 1.0, got {}",
            config.guard.ask_threshold
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
