// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQL plumbing for Quarry.
//!
//! - [`validator`]: read-only, single-statement validation
//! - [`classify`]: rule-table classification of execution failures
//! - [`runner`]: chunked streaming execution with cancellation
//! - [`sqlite`]: the read-only SQLite execution engine
//! - [`schema`]: SQLite schema context for generation prompts

pub mod classify;
pub mod runner;
pub mod schema;
pub mod sqlite;
pub mod validator;

pub use classify::{
    ClassificationRule, ErrorClassifier, UnrecognizedFailurePolicy, UNRECOGNIZED_FAILURE_POLICY,
};
pub use runner::{ChunkStream, RunLimits, StreamingQueryRunner, WORKER_PANIC_MESSAGE};
pub use schema::{RetrievalOptions, SchemaSnapshot, SqliteSchemaProvider};
pub use sqlite::SqliteEngine;
pub use validator::{normalize, QueryValidator, SqlDialect, Validation};
