// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator trait definitions consumed by the pipeline orchestrator.
//!
//! The async collaborators use `#[async_trait]` so they can be held as
//! `Arc<dyn Trait>`. The execution engine is synchronous; the streaming
//! runner drives it from a blocking worker.

pub mod composer;
pub mod engine;
pub mod generator;
pub mod guard;
pub mod schema;

pub use composer::AnswerComposer;
pub use engine::{ExecutionEngine, RowSource};
pub use generator::QueryGenerator;
pub use guard::DomainGuard;
pub use schema::SchemaContextProvider;
