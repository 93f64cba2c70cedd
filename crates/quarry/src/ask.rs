// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `quarry ask` command implementation.

use std::io::Write;
use std::process::ExitCode;

use quarry_core::{PipelineEvent, RunStatus};
use quarry_pipeline::{Pipeline, PipelineRun};
use tracing::debug;

use crate::render;

/// Prints a run's events as they arrive and returns its final status.
///
/// Ctrl+C while the run is in flight cancels it; the run still closes with
/// an answer and `done`.
pub async fn stream_run(run: PipelineRun, json: bool) -> RunStatus {
    stream_to(run, json, &mut std::io::stdout()).await
}

/// Writes a run's events to `out`. A failed write (for example a closed
/// pipe) abandons the run, which cancels it on drop.
async fn stream_to(mut run: PipelineRun, json: bool, out: &mut impl Write) -> RunStatus {
    let token = run.cancellation_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("interrupt received, cancelling run");
            token.cancel();
        }
    });

    let mut status = RunStatus::Fail;
    while let Some(event) = run.next_event().await {
        let written = if json {
            write!(out, "{}", event.to_sse())
        } else {
            writeln!(out, "{}", render::format_event(&event))
        };
        if let Err(e) = written.and_then(|()| out.flush()) {
            debug!(error = %e, "output closed, abandoning run");
            break;
        }
        if let PipelineEvent::Done(done) = &event {
            status = done.status;
        }
    }

    interrupt.abort();
    drop(run);
    status
}

pub async fn run_ask(
    pipeline: &Pipeline,
    question: &str,
    conversation: Option<&str>,
    json: bool,
) -> RunStatus {
    stream_run(pipeline.run(question, conversation), json).await
}

/// 0 for an answered question, 2 when clarification is needed, 1 otherwise.
pub fn exit_code(status: RunStatus) -> ExitCode {
    match status {
        RunStatus::Success => ExitCode::SUCCESS,
        RunStatus::NeedsInput => ExitCode::from(2),
        RunStatus::Fail => ExitCode::FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_test_utils::TestHarness;

    #[tokio::test]
    async fn streamed_status_matches_done() {
        let harness = TestHarness::builder()
            .with_statements(["SELECT COUNT(*) AS n FROM orders"])
            .build()
            .await
            .unwrap();

        let status = run_ask(&harness.pipeline, "How many orders this month?", None, true).await;
        assert_eq!(status, RunStatus::Success);

        let status = run_ask(&harness.pipeline, "latest orders", None, false).await;
        assert_eq!(status, RunStatus::NeedsInput);
    }

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn closed_output_cancels_the_run() {
        let harness = TestHarness::builder()
            .with_statements(["SELECT COUNT(*) AS n FROM orders"])
            .build()
            .await
            .unwrap();

        let run = harness.start("How many orders this month?", None);
        let token = run.cancellation_token();
        let status = stream_to(run, false, &mut ClosedPipe).await;

        assert_eq!(status, RunStatus::Fail);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn events_are_written_as_sse_frames() {
        let harness = TestHarness::builder()
            .with_statements(["SELECT COUNT(*) AS n FROM orders"])
            .build()
            .await
            .unwrap();

        let mut out = Vec::new();
        let run = harness.start("How many orders this month?", None);
        let status = stream_to(run, true, &mut out).await;

        assert_eq!(status, RunStatus::Success);
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("event: step\ndata: "));
        assert!(text.contains("event: answer\n"));
        assert!(text.trim_end().ends_with('}'));
    }
}
