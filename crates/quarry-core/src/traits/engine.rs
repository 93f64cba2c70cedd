// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Synchronous execution engine seam.
//!
//! Drivers such as rusqlite hand out cursors that borrow their connection and
//! statement, so the engine does not return a cursor. Instead it opens one
//! execution context, issues the statement once, and lends the open cursor to
//! a visitor as a [`RowSource`]. The context is released when `execute`
//! returns, on every path.

use std::time::Duration;

use crate::error::ExecutionFailure;
use crate::types::Params;
use crate::value::SqlValue;

/// An open cursor over one statement's result set.
pub trait RowSource {
    /// Column names in result order.
    fn columns(&self) -> &[String];

    /// Fetches up to `max` further rows. An empty vector means exhausted.
    fn fetch(&mut self, max: usize) -> Result<Vec<Vec<SqlValue>>, ExecutionFailure>;
}

/// Connect/execute/fetch with a per-statement timeout.
pub trait ExecutionEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Runs `statement` with `params` bound by name. The timeout is applied
    /// before the statement is issued and covers execution and fetching.
    ///
    /// Errors returned by `visit` are propagated unchanged.
    fn execute(
        &self,
        statement: &str,
        params: &Params,
        timeout: Duration,
        visit: &mut dyn FnMut(&mut dyn RowSource) -> Result<(), ExecutionFailure>,
    ) -> Result<(), ExecutionFailure>;
}
