// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted query generator for deterministic testing.
//!
//! `MockGenerator` implements `QueryGenerator` by popping pre-configured
//! outcomes from a FIFO queue and recording every request it receives, so
//! tests can assert on attempt counts and repair context.

use std::collections::VecDeque;

use async_trait::async_trait;
use quarry_core::{GenerationError, GenerationRequest, QueryGenerator, SqlCommand};
use tokio::sync::Mutex;

enum Step {
    Reply(Result<SqlCommand, GenerationError>),
    Hang,
}

/// A query generator that replays a script.
///
/// When the script runs out, generation fails with
/// [`GenerationError::Unavailable`].
#[derive(Default)]
pub struct MockGenerator {
    script: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// A generator answering with each statement in turn, without params.
    pub fn with_statements<I, S>(statements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let script = statements
            .into_iter()
            .map(|s| Step::Reply(Ok(SqlCommand::statement(s))))
            .collect();
        Self {
            script: Mutex::new(script),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queues a successful command.
    pub async fn push_command(&self, command: SqlCommand) {
        self.script.lock().await.push_back(Step::Reply(Ok(command)));
    }

    /// Queues a bare statement.
    pub async fn push_statement(&self, statement: impl Into<String>) {
        self.push_command(SqlCommand::statement(statement)).await;
    }

    /// Queues a generator failure.
    pub async fn push_error(&self, error: GenerationError) {
        self.script.lock().await.push_back(Step::Reply(Err(error)));
    }

    /// Queues a call that never completes.
    pub async fn push_hang(&self) {
        self.script.lock().await.push_back(Step::Hang);
    }

    /// Every request received so far, in call order.
    pub async fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn calls(&self) -> usize {
        self.requests.lock().await.len()
    }
}

#[async_trait]
impl QueryGenerator for MockGenerator {
    fn name(&self) -> &str {
        "mock-generator"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<SqlCommand, GenerationError> {
        self.requests.lock().await.push(request.clone());
        let step = self.script.lock().await.pop_front();
        match step {
            Some(Step::Reply(reply)) => reply,
            Some(Step::Hang) => std::future::pending().await,
            None => Err(GenerationError::unavailable("mock generator script exhausted")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> GenerationRequest {
        GenerationRequest {
            question: "orders today".into(),
            history: Vec::new(),
            schema_context: String::new(),
            repair: None,
        }
    }

    #[tokio::test]
    async fn replays_script_then_reports_exhaustion() {
        let generator = MockGenerator::with_statements(["SELECT 1"]);
        generator
            .push_error(GenerationError::Malformed("no JSON".into()))
            .await;

        assert_eq!(generator.generate(&request()).await.unwrap().statement, "SELECT 1");
        assert!(matches!(
            generator.generate(&request()).await,
            Err(GenerationError::Malformed(_))
        ));
        assert!(matches!(
            generator.generate(&request()).await,
            Err(GenerationError::Unavailable { .. })
        ));
        assert_eq!(generator.calls().await, 3);
    }
}
