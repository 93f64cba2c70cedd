// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Answer composer trait.

use async_trait::async_trait;

use crate::error::QuarryError;
use crate::types::CompositionRequest;

/// Writes the final markdown answer from a question and its result sample.
///
/// A failure here is never fatal to a run; the orchestrator substitutes a
/// deterministic fallback answer.
#[async_trait]
pub trait AnswerComposer: Send + Sync {
    fn name(&self) -> &str;

    async fn compose(&self, request: &CompositionRequest) -> Result<String, QuarryError>;
}
