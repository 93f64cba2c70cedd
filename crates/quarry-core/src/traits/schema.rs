// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use async_trait::async_trait;

use crate::error::QuarryError;

/// Returns the subset of the schema relevant to a question, rendered as
/// prompt-ready text.
#[async_trait]
pub trait SchemaContextProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn retrieve(&self, question: &str) -> Result<String, QuarryError>;
}
