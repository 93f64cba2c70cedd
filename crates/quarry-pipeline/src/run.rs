// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Caller-side handle of one pipeline run.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use quarry_core::PipelineEvent;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// The event stream of one run. Ends after the `done` event.
///
/// Dropping the handle cancels the run: the orchestrator stops at its next
/// await point and the query runner stops fetching.
pub struct PipelineRun {
    run_id: String,
    rx: mpsc::Receiver<PipelineEvent>,
    cancel: CancellationToken,
}

impl PipelineRun {
    pub(crate) fn new(
        run_id: String,
        rx: mpsc::Receiver<PipelineEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self { run_id, rx, cancel }
    }

    /// Identifier reported as `trace_id` in the `done` event.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub async fn next_event(&mut self) -> Option<PipelineEvent> {
        self.rx.recv().await
    }

    /// Asks the run to stop. Events already produced are still delivered,
    /// followed by an answer and `done(fail)`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A token that cancels this run, for use from another task.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drains the run to completion.
    pub async fn collect_events(mut self) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next_event().await {
            events.push(event);
        }
        events
    }
}

impl Stream for PipelineRun {
    type Item = PipelineEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for PipelineRun {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
