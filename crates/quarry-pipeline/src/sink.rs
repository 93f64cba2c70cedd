// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Run-local event publisher.

use quarry_core::{
    AnswerEvent, DoneEvent, ErrorClassification, ErrorEvent, ExecutionChunk, Params,
    PipelineEvent, RowsEvent, RunStatus, SqlEvent, Stage, StepEvent, StepStatus,
};
use tokio::sync::mpsc;
use tracing::debug;

/// Publishes one run's events in order and remembers whether an answer has
/// gone out, so every terminal path sends exactly one.
pub(crate) struct EventSink {
    tx: mpsc::Sender<PipelineEvent>,
    run_id: String,
    attempt: u32,
    answered: bool,
    disconnected: bool,
}

impl EventSink {
    pub(crate) fn new(tx: mpsc::Sender<PipelineEvent>, run_id: String) -> Self {
        Self {
            tx,
            run_id,
            attempt: 0,
            answered: false,
            disconnected: false,
        }
    }

    pub(crate) fn attempt(&self) -> u32 {
        self.attempt
    }

    pub(crate) fn set_attempt(&mut self, attempt: u32) {
        self.attempt = attempt;
    }

    pub(crate) fn answered(&self) -> bool {
        self.answered
    }

    async fn emit(&mut self, event: PipelineEvent) {
        if self.disconnected {
            return;
        }
        if self.tx.send(event).await.is_err() {
            debug!(run_id = %self.run_id, "event consumer went away");
            self.disconnected = true;
        }
    }

    pub(crate) async fn step(&mut self, stage: Stage, message: impl Into<String>, status: Option<StepStatus>) {
        let event = StepEvent {
            stage,
            message: message.into(),
            status,
            attempt: self.attempt,
        };
        self.emit(PipelineEvent::Step(event)).await;
    }

    pub(crate) async fn sql(&mut self, statement: &str, params: &Params) {
        let event = SqlEvent {
            sql: statement.to_string(),
            params: params.clone(),
            attempt: self.attempt,
        };
        self.emit(PipelineEvent::Sql(event)).await;
    }

    pub(crate) async fn rows(&mut self, chunk: ExecutionChunk) {
        let event = RowsEvent {
            chunk,
            attempt: self.attempt,
        };
        self.emit(PipelineEvent::Rows(event)).await;
    }

    pub(crate) async fn error(&mut self, classification: &ErrorClassification) {
        let event = ErrorEvent::from_classification(classification, self.attempt);
        self.emit(PipelineEvent::Error(event)).await;
    }

    /// Sends the run's answer. Later answers are dropped.
    pub(crate) async fn answer(&mut self, markdown: impl Into<String>) {
        if self.answered {
            debug!(run_id = %self.run_id, "answer already sent, dropping another");
            return;
        }
        self.answered = true;
        self.emit(PipelineEvent::Answer(AnswerEvent {
            markdown: markdown.into(),
        }))
        .await;
    }

    pub(crate) async fn done(&mut self, status: RunStatus) {
        let event = DoneEvent {
            trace_id: self.run_id.clone(),
            status,
        };
        self.emit(PipelineEvent::Done(event)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn only_the_first_answer_is_sent() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut sink = EventSink::new(tx, "run-1".into());
        sink.answer("first").await;
        sink.answer("second").await;
        sink.done(RunStatus::Success).await;
        drop(sink);

        let mut events = Vec::new();
        while let Some(e) = rx.recv().await {
            events.push(e);
        }
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            PipelineEvent::Answer(AnswerEvent {
                markdown: "first".into()
            })
        );
        assert!(events[1].is_terminal());
    }

    #[tokio::test]
    async fn events_carry_the_current_attempt() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut sink = EventSink::new(tx, "run-1".into());
        sink.set_attempt(2);
        sink.step(Stage::TextToSql, "Revising SQL…", None).await;
        match rx.recv().await.unwrap() {
            PipelineEvent::Step(step) => assert_eq!(step.attempt, 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn a_closed_consumer_is_not_an_error() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let mut sink = EventSink::new(tx, "run-1".into());
        sink.step(Stage::DomainGuard, "Checking your question…", None).await;
        sink.done(RunStatus::Fail).await;
        assert!(sink.disconnected);
    }
}
