// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the pipeline and its collaborators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Bound statement parameters, keyed by name.
pub type Params = serde_json::Map<String, serde_json::Value>;

/// One result row, keyed by column name. Values are already JSON-safe.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Error codes carried by [`ErrorClassification`] and `error` events.
pub mod codes {
    pub const OUT_OF_DOMAIN: &str = "OUT_OF_DOMAIN";
    pub const SCHEMA_CONTEXT_FAILED: &str = "SCHEMA_CONTEXT_FAILED";
    pub const TEXT_TO_SQL_FAILED: &str = "TEXT_TO_SQL_FAILED";
    pub const GENERATION_PARSE_FAILED: &str = "GENERATION_PARSE_FAILED";
    pub const SQL_VALIDATION_FAILED: &str = "SQL_VALIDATION_FAILED";
    pub const SQL_EXECUTION_FAILED: &str = "SQL_EXECUTION_FAILED";
    pub const SQL_EXECUTION_FAILED_RETRYABLE: &str = "SQL_EXECUTION_FAILED_RETRYABLE";
    pub const SQL_TIMEOUT: &str = "SQL_TIMEOUT";
    pub const COMPOSER_FAILED: &str = "COMPOSER_FAILED";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

/// Author of a conversation message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// A single remembered conversation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// Structured output of query generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SqlCommand {
    pub statement: String,
    #[serde(default)]
    pub params: Params,
    #[serde(default)]
    pub assumptions: Vec<String>,
    #[serde(default)]
    pub expected_columns: Vec<String>,
}

impl SqlCommand {
    /// A command with no parameters or annotations.
    pub fn statement(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            ..Self::default()
        }
    }
}

/// One streamed slice of a query's result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionChunk {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub chunk_index: usize,
    /// Rows in this chunk.
    pub row_count: usize,
    /// Rows sent so far in this attempt, including this chunk.
    pub rows_sent_total: usize,
    pub elapsed_ms: u64,
}

/// Classified failure: what went wrong and whether regenerating could fix it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorClassification {
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl ErrorClassification {
    pub fn new(code: impl Into<String>, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            retryable,
        }
    }
}

/// Failure information fed back into the next generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairContext {
    pub previous_statement: String,
    pub previous_params: Params,
    pub failure: ErrorClassification,
    /// Index of the attempt about to be generated.
    pub attempt: u32,
}

/// Everything a query generator is given for one attempt.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub question: String,
    pub history: Vec<Message>,
    pub schema_context: String,
    pub repair: Option<RepairContext>,
}

/// The rows handed to the composer.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResultSample {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub row_count: usize,
}

/// Penalties the composer should fold into its stated confidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConfidenceHints {
    pub sample_penalty: f64,
    pub retry_penalty: f64,
    pub row_count: usize,
}

/// Execution metadata passed to the composer.
#[derive(Debug, Clone, Serialize)]
pub struct CompositionMeta {
    pub attempt_count: u32,
    pub max_rows_limit: usize,
    pub is_sampled: bool,
    pub timeout_ms: u64,
    pub confidence_hints: ConfidenceHints,
}

/// Everything an answer composer is given.
#[derive(Debug, Clone)]
pub struct CompositionRequest {
    pub run_id: String,
    pub question: String,
    pub history: Vec<Message>,
    pub statement: String,
    pub params: Params,
    pub result: ResultSample,
    pub meta: CompositionMeta,
}

/// Outcome of the domain gate.
#[derive(Debug, Clone, PartialEq)]
pub enum GuardDecision {
    /// In scope; proceed to generation.
    Allow { matched: Vec<String> },
    /// In scope but underspecified; ask the user before spending generation cost.
    Ask {
        message: String,
        questions: Vec<String>,
    },
    /// Out of scope; redirect the user.
    Deny { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn role_round_trips_through_strings() {
        for role in [Role::User, Role::Assistant, Role::System] {
            assert_eq!(Role::from_str(&role.to_string()).unwrap(), role);
        }
        assert_eq!(Role::Assistant.to_string(), "assistant");
    }

    #[test]
    fn sql_command_deserializes_with_defaults() {
        let cmd: SqlCommand =
            serde_json::from_str(r#"{"statement": "SELECT 1;"}"#).unwrap();
        assert_eq!(cmd.statement, "SELECT 1;");
        assert!(cmd.params.is_empty());
        assert!(cmd.assumptions.is_empty());
    }
}
