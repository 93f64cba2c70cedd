// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock answer composer.

use async_trait::async_trait;
use quarry_core::{AnswerComposer, CompositionRequest, QuarryError};
use tokio::sync::Mutex;

enum Mode {
    Summary,
    Reply(String),
    Fail(String),
}

/// An answer composer with a fixed behaviour.
///
/// The default composer writes a one-line summary naming the row count and
/// the question, which keeps answers distinguishable across runs.
pub struct MockComposer {
    mode: Mode,
    requests: Mutex<Vec<CompositionRequest>>,
}

impl MockComposer {
    pub fn new() -> Self {
        Self::with_mode(Mode::Summary)
    }

    /// Always answers with `markdown`.
    pub fn replying(markdown: impl Into<String>) -> Self {
        Self::with_mode(Mode::Reply(markdown.into()))
    }

    /// Always fails with a provider error carrying `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_mode(Mode::Fail(message.into()))
    }

    fn with_mode(mode: Mode) -> Self {
        Self {
            mode,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub async fn requests(&self) -> Vec<CompositionRequest> {
        self.requests.lock().await.clone()
    }
}

impl Default for MockComposer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AnswerComposer for MockComposer {
    fn name(&self) -> &str {
        "mock-composer"
    }

    async fn compose(&self, request: &CompositionRequest) -> Result<String, QuarryError> {
        self.requests.lock().await.push(request.clone());
        match &self.mode {
            Mode::Summary => Ok(format!(
                "### Answer\n- {} row(s) for: {}\n",
                request.result.row_count, request.question
            )),
            Mode::Reply(markdown) => Ok(markdown.clone()),
            Mode::Fail(message) => Err(QuarryError::provider(message.clone())),
        }
    }
}
