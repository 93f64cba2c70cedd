// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for Quarry.
//!
//! All structs use `#[serde(deny_unknown_fields)]` so a misspelled key is
//! reported at startup instead of being silently ignored.

use serde::{Deserialize, Serialize};

/// Top-level Quarry configuration.
///
/// Every section is optional and defaults to values that run the pipeline
/// against a local SQLite file with the keyword domain guard.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QuarryConfig {
    /// Process identity and logging.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Retry budget and streaming limits of the orchestrator.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Per-conversation memory bounds.
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Target database and schema retrieval settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Chat-completion endpoint used by the generator, composer and LLM guard.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Domain gate settings.
    #[serde(default)]
    pub guard: GuardConfig,
}

/// Process identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_agent_name() -> String {
    "quarry".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Orchestrator limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Regeneration attempts allowed after the first one. A run makes at most
    /// `max_retries + 1` generation calls.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Rows per streamed chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Maximum rows streamed per attempt.
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,

    /// Statement timeout applied by the execution engine.
    #[serde(default = "default_statement_timeout_ms")]
    pub statement_timeout_ms: u64,

    /// Capacity of the event channel between a run and its consumer.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            chunk_size: default_chunk_size(),
            max_rows: default_max_rows(),
            statement_timeout_ms: default_statement_timeout_ms(),
            event_buffer: default_event_buffer(),
        }
    }
}

fn default_max_retries() -> u32 {
    2
}

fn default_chunk_size() -> usize {
    50
}

fn default_max_rows() -> usize {
    200
}

fn default_statement_timeout_ms() -> u64 {
    5000
}

fn default_event_buffer() -> usize {
    16
}

/// Conversation memory bounds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryConfig {
    /// Messages kept per conversation; the oldest is evicted first.
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,

    /// Stored messages are hard-cut to this many characters.
    #[serde(default = "default_max_chars_per_message")]
    pub max_chars_per_message: usize,

    /// Key used when a caller supplies an empty conversation id.
    #[serde(default = "default_conversation_id")]
    pub default_conversation_id: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_messages: default_max_messages(),
            max_chars_per_message: default_max_chars_per_message(),
            default_conversation_id: default_conversation_id(),
        }
    }
}

fn default_max_messages() -> usize {
    10
}

fn default_max_chars_per_message() -> usize {
    1500
}

fn default_conversation_id() -> String {
    "default".to_string()
}

/// Target database configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Path to the SQLite database queried by the pipeline. Opened read-only.
    #[serde(default = "default_database_path")]
    pub path: String,

    /// SQL dialect used for statement validation.
    #[serde(default = "default_dialect")]
    pub dialect: String,

    /// Tables included in schema context per question.
    #[serde(default = "default_top_k_tables")]
    pub top_k_tables: usize,

    /// Foreign-key hops expanded from the top-ranked tables.
    #[serde(default = "default_fk_hops")]
    pub fk_hops: usize,

    /// Columns listed per table in schema context.
    #[serde(default = "default_max_columns_per_table")]
    pub max_columns_per_table: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            dialect: default_dialect(),
            top_k_tables: default_top_k_tables(),
            fk_hops: default_fk_hops(),
            max_columns_per_table: default_max_columns_per_table(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("quarry").join("quarry.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("quarry.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_dialect() -> String {
    "sqlite".to_string()
}

fn default_top_k_tables() -> usize {
    6
}

fn default_fk_hops() -> usize {
    1
}

fn default_max_columns_per_table() -> usize {
    40
}

/// OpenAI-compatible chat completion endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key. `None` falls back to the `OPENAI_API_KEY` environment variable.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            model: default_llm_model(),
            temperature: 0.0,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4.1-mini".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

/// Domain gate configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GuardConfig {
    /// `keyword` for the static pattern guard, `llm` for the model-backed one.
    #[serde(default = "default_guard_mode")]
    pub mode: String,

    /// LLM guard: DENY/ASK decisions below this confidence are turned into ASK.
    #[serde(default = "default_ask_threshold")]
    pub ask_threshold: f64,

    /// Extra in-scope keywords appended to the built-in groups.
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            mode: default_guard_mode(),
            ask_threshold: default_ask_threshold(),
            keywords: Vec::new(),
        }
    }
}

fn default_guard_mode() -> String {
    "keyword".to_string()
}

fn default_ask_threshold() -> f64 {
    0.60
}
