// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The typed event sequence published for one pipeline run.
//!
//! Events are serialized as `{"event": <kind>, "data": {...}}` and can be
//! rendered as Server-Sent Events frames with [`PipelineEvent::to_sse`]:
//!
//! ```text
//! event: rows
//! data: {"columns": ["total"], "rows": [{"total": 42}], ...}
//! ```

use serde::Serialize;
use strum::Display;

use crate::types::{ErrorClassification, ExecutionChunk, Params};

/// Pipeline stage named in `step` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    DomainGuard,
    SchemaContext,
    TextToSql,
    SqlValidate,
    SqlExecute,
    Compose,
}

/// Optional status attached to a `step` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Ok,
    Retry,
    Fallback,
}

/// Terminal status reported by the `done` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Fail,
    NeedsInput,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepEvent {
    pub stage: Stage,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<StepStatus>,
    pub attempt: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SqlEvent {
    pub sql: String,
    pub params: Params,
    pub attempt: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowsEvent {
    #[serde(flatten)]
    pub chunk: ExecutionChunk,
    pub attempt: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorEvent {
    pub error_code: String,
    pub message: String,
    pub retryable: bool,
    pub attempt: u32,
}

impl ErrorEvent {
    pub fn from_classification(classification: &ErrorClassification, attempt: u32) -> Self {
        Self {
            error_code: classification.code.clone(),
            message: classification.message.clone(),
            retryable: classification.retryable,
            attempt,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerEvent {
    pub markdown: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DoneEvent {
    pub trace_id: String,
    pub status: RunStatus,
}

/// One event of a run. Emitted in transition order, never replayed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum PipelineEvent {
    Step(StepEvent),
    Sql(SqlEvent),
    Rows(RowsEvent),
    Error(ErrorEvent),
    Answer(AnswerEvent),
    Done(DoneEvent),
}

impl PipelineEvent {
    /// The event kind as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineEvent::Step(_) => "step",
            PipelineEvent::Sql(_) => "sql",
            PipelineEvent::Rows(_) => "rows",
            PipelineEvent::Error(_) => "error",
            PipelineEvent::Answer(_) => "answer",
            PipelineEvent::Done(_) => "done",
        }
    }

    /// Serializes only the payload of the event.
    pub fn data_json(&self) -> serde_json::Result<String> {
        match self {
            PipelineEvent::Step(e) => serde_json::to_string(e),
            PipelineEvent::Sql(e) => serde_json::to_string(e),
            PipelineEvent::Rows(e) => serde_json::to_string(e),
            PipelineEvent::Error(e) => serde_json::to_string(e),
            PipelineEvent::Answer(e) => serde_json::to_string(e),
            PipelineEvent::Done(e) => serde_json::to_string(e),
        }
    }

    /// Renders the event as one SSE frame.
    pub fn to_sse(&self) -> String {
        let data = self.data_json().unwrap_or_else(|e| {
            serde_json::json!({ "error_code": "ENCODING_FAILED", "message": e.to_string() })
                .to_string()
        });
        format!("event: {}\ndata: {}\n\n", self.kind(), data)
    }

    /// True for the `done` event that closes every run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineEvent::Done(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_kind_tag() {
        let event = PipelineEvent::Done(DoneEvent {
            trace_id: "run-1".into(),
            status: RunStatus::NeedsInput,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "done");
        assert_eq!(json["data"]["status"], "needs_input");
    }

    #[test]
    fn rows_event_flattens_chunk_fields() {
        let mut row = crate::types::Row::new();
        row.insert("total".into(), serde_json::json!(42));
        let event = PipelineEvent::Rows(RowsEvent {
            chunk: ExecutionChunk {
                columns: vec!["total".into()],
                rows: vec![row],
                chunk_index: 0,
                row_count: 1,
                rows_sent_total: 1,
                elapsed_ms: 3,
            },
            attempt: 1,
        });
        let sse = event.to_sse();
        assert!(sse.starts_with("event: rows\ndata: {"));
        assert!(sse.contains("\"rows_sent_total\":1"));
        assert!(sse.contains("\"attempt\":1"));
        assert!(sse.ends_with("\n\n"));
    }

    #[test]
    fn step_status_is_omitted_when_absent() {
        let event = PipelineEvent::Step(StepEvent {
            stage: Stage::TextToSql,
            message: "Drafting SQL".into(),
            status: None,
            attempt: 0,
        });
        let data = event.data_json().unwrap();
        assert!(!data.contains("status"));
        assert!(data.contains("\"stage\":\"text_to_sql\""));
    }
}
