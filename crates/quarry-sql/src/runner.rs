// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Streaming query runner.
//!
//! [`StreamingQueryRunner::run`] executes one statement on a blocking worker
//! and returns a [`ChunkStream`]. The worker hands chunks over a capacity-1
//! channel, so it never fetches more than one chunk ahead of the consumer.
//! It stops fetching when the row cap is reached, the source is exhausted,
//! the cancellation token fires, or the stream is dropped; in every case the
//! engine's execution context is released when the worker returns.
//!
//! Failures are passed through untouched; classifying them is the caller's
//! job. A worker that panics mid-statement ends the stream with an
//! [`ExecutionFailure`] starting with [`WORKER_PANIC_MESSAGE`], never with a
//! silent end of rows.

use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};
use std::time::{Duration, Instant};

use futures::Stream;
use quarry_core::{ExecutionChunk, ExecutionEngine, ExecutionFailure, Params, Row, SqlValue};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Prefix of the failure reported when the execution worker panics.
pub const WORKER_PANIC_MESSAGE: &str = "execution worker panicked";

/// Per-run execution limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunLimits {
    /// Rows per chunk. Must be greater than zero.
    pub chunk_size: usize,
    /// Rows streamed in total before the runner stops fetching.
    pub max_rows: usize,
    pub timeout: Duration,
}

impl RunLimits {
    pub fn new(chunk_size: usize, max_rows: usize, timeout: Duration) -> Self {
        Self {
            chunk_size,
            max_rows,
            timeout,
        }
    }
}

/// Runs statements against an [`ExecutionEngine`] with chunked streaming.
#[derive(Clone)]
pub struct StreamingQueryRunner {
    engine: Arc<dyn ExecutionEngine>,
}

impl StreamingQueryRunner {
    pub fn new(engine: Arc<dyn ExecutionEngine>) -> Self {
        Self { engine }
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    /// Starts executing `statement`. Must be called inside a Tokio runtime.
    ///
    /// The returned stream is finite and not restartable. It yields one item
    /// per fetch and ends after the first `Err`.
    pub fn run(
        &self,
        statement: impl Into<String>,
        params: Params,
        limits: RunLimits,
        cancel: &CancellationToken,
    ) -> ChunkStream {
        let statement = statement.into();
        let cancel = cancel.child_token();
        let (tx, rx) = mpsc::channel(1);
        let engine = Arc::clone(&self.engine);
        let worker_cancel = cancel.clone();

        let worker = tokio::task::spawn_blocking(move || {
            stream_rows(engine.as_ref(), &statement, &params, limits, &worker_cancel, &tx);
        });

        ChunkStream {
            rx,
            worker: Some(worker),
            cancel,
        }
    }
}

fn stream_rows(
    engine: &dyn ExecutionEngine,
    statement: &str,
    params: &Params,
    limits: RunLimits,
    cancel: &CancellationToken,
    tx: &mpsc::Sender<Result<ExecutionChunk, ExecutionFailure>>,
) {
    let started = Instant::now();
    let chunk_size = limits.chunk_size.max(1);
    let mut sent = 0usize;
    let mut chunk_index = 0usize;

    let result = engine.execute(statement, params, limits.timeout, &mut |source| {
        let columns = source.columns().to_vec();
        while sent < limits.max_rows {
            if cancel.is_cancelled() {
                debug!(chunk_index, sent, "runner cancelled between fetches");
                return Ok(());
            }
            let want = chunk_size.min(limits.max_rows - sent);
            let raw = source.fetch(want)?;
            if raw.is_empty() {
                break;
            }

            let rows: Vec<Row> = raw
                .into_iter()
                .map(|cells| to_row(&columns, cells))
                .collect();
            sent += rows.len();
            let chunk = ExecutionChunk {
                columns: columns.clone(),
                row_count: rows.len(),
                rows,
                chunk_index,
                rows_sent_total: sent,
                elapsed_ms: started.elapsed().as_millis() as u64,
            };
            if tx.blocking_send(Ok(chunk)).is_err() {
                debug!(chunk_index, "chunk consumer went away");
                return Ok(());
            }
            chunk_index += 1;
        }
        Ok(())
    });

    if let Err(failure) = result {
        warn!(error = %failure, sent, "statement failed");
        let _ = tx.blocking_send(Err(failure));
    }
}

/// Zips column names with JSON-safe cell values. A duplicated column name
/// keeps the last value.
fn to_row(columns: &[String], cells: Vec<SqlValue>) -> Row {
    columns
        .iter()
        .cloned()
        .zip(cells.into_iter().map(SqlValue::into_json))
        .collect()
}

fn worker_failure(err: JoinError) -> Option<ExecutionFailure> {
    if !err.is_panic() {
        return None;
    }
    let message = panic_text(err.into_panic().as_ref());
    warn!(panic = %message, "execution worker panicked");
    Some(ExecutionFailure::new(format!("{WORKER_PANIC_MESSAGE}: {message}")))
}

fn panic_text(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Chunks of one running statement.
///
/// Dropping the stream cancels the worker.
pub struct ChunkStream {
    rx: mpsc::Receiver<Result<ExecutionChunk, ExecutionFailure>>,
    worker: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl ChunkStream {
    /// Receives the next chunk, or `None` once the statement is done.
    pub async fn next_chunk(&mut self) -> Option<Result<ExecutionChunk, ExecutionFailure>> {
        std::future::poll_fn(|cx| self.poll_chunk(cx)).await
    }

    /// Once the channel closes, the worker is joined so a panic surfaces as
    /// a failure instead of an end of rows.
    fn poll_chunk(
        &mut self,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<ExecutionChunk, ExecutionFailure>>> {
        if let Some(item) = ready!(self.rx.poll_recv(cx)) {
            return Poll::Ready(Some(item));
        }
        let Some(worker) = self.worker.as_mut() else {
            return Poll::Ready(None);
        };
        let joined = ready!(Pin::new(worker).poll(cx));
        self.worker = None;
        Poll::Ready(joined.err().and_then(worker_failure).map(Err))
    }

    /// Stops the worker before its next fetch.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Stream for ChunkStream {
    type Item = Result<ExecutionChunk, ExecutionFailure>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.poll_chunk(cx)
    }
}

impl Drop for ChunkStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
