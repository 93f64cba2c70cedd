// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Quarry question-to-answer pipeline.
//!
//! A [`Pipeline`] gates a question by domain, gathers schema context,
//! generates a read-only statement, validates and executes it with chunked
//! streaming, and composes a markdown answer. Validation and execution
//! failures feed a bounded regeneration loop. Progress is published as a
//! typed event stream ([`PipelineRun`]) that always ends with one `answer`
//! followed by one `done`.

pub mod fallback;
pub mod guard;
pub mod pipeline;
pub mod run;
mod sink;

pub use guard::KeywordGuard;
pub use pipeline::{AttemptOutcome, Pipeline, PipelineBuilder, PipelineSettings, QueryResult};
pub use run::PipelineRun;
