// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query generator trait: natural language in, structured command out.

use async_trait::async_trait;

use crate::error::GenerationError;
use crate::types::{GenerationRequest, SqlCommand};

/// Turns a question (plus history, schema context and optional repair
/// context) into a [`SqlCommand`].
///
/// Implementations return [`GenerationError::Malformed`] when a response
/// arrived but could not be parsed, and [`GenerationError::Unavailable`]
/// when no response could be obtained at all.
#[async_trait]
pub trait QueryGenerator: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<SqlCommand, GenerationError>;
}
