// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Quarry question-to-query pipeline.
//!
//! This crate holds the shared vocabulary of the workspace: error types, the
//! data model passed between stages, the typed event stream, and the
//! collaborator traits the orchestrator is wired against.

pub mod error;
pub mod event;
pub mod traits;
pub mod types;
pub mod value;

pub use error::{BoxError, ExecutionFailure, GenerationError, QuarryError};
pub use event::{
    AnswerEvent, DoneEvent, ErrorEvent, PipelineEvent, RowsEvent, RunStatus, SqlEvent, Stage,
    StepEvent, StepStatus,
};
pub use traits::{
    AnswerComposer, DomainGuard, ExecutionEngine, QueryGenerator, RowSource,
    SchemaContextProvider,
};
pub use types::{
    codes, CompositionMeta, CompositionRequest, ConfidenceHints, ErrorClassification,
    ExecutionChunk, GenerationRequest, GuardDecision, Message, Params, RepairContext,
    ResultSample, Role, Row, SqlCommand,
};
pub use value::SqlValue;
