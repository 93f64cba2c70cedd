// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Execution engine that replays scripted outcomes, one per statement.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use quarry_core::{ExecutionEngine, ExecutionFailure, Params, RowSource, SqlValue};

/// Outcome of one scripted `execute` call.
#[derive(Debug, Clone)]
pub enum EngineStep {
    /// Streams the rows, then ends.
    Rows {
        columns: Vec<String>,
        rows: Vec<Vec<SqlValue>>,
    },
    /// Streams the rows, then fails on the next fetch.
    FailAfter {
        columns: Vec<String>,
        rows: Vec<Vec<SqlValue>>,
        message: String,
    },
    /// Streams the rows, then panics on the next fetch.
    PanicAfter {
        columns: Vec<String>,
        rows: Vec<Vec<SqlValue>>,
        message: String,
    },
    /// Fails before producing a cursor.
    Fail(String),
    /// Produces integer rows forever, sleeping before each fetch.
    Endless { column: String, delay: Duration },
}

impl EngineStep {
    /// One integer column named `column` holding `0..count`.
    pub fn counting(column: &str, count: i64) -> Self {
        EngineStep::Rows {
            columns: vec![column.to_string()],
            rows: (0..count).map(|i| vec![SqlValue::Int(i)]).collect(),
        }
    }
}

/// A synchronous [`ExecutionEngine`] driven by a script.
///
/// Calls beyond the script fail with an `ExecutionFailure`. Statements and
/// params are recorded for assertions.
#[derive(Default)]
pub struct ScriptedEngine {
    script: Mutex<VecDeque<EngineStep>>,
    executed: Mutex<Vec<(String, Params)>>,
}

impl ScriptedEngine {
    pub fn new(steps: impl IntoIterator<Item = EngineStep>) -> Self {
        Self {
            script: Mutex::new(steps.into_iter().collect()),
            executed: Mutex::new(Vec::new()),
        }
    }

    /// Statements executed so far, in call order.
    pub fn executed(&self) -> Vec<(String, Params)> {
        self.executed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl ExecutionEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    fn execute(
        &self,
        statement: &str,
        params: &Params,
        _timeout: Duration,
        visit: &mut dyn FnMut(&mut dyn RowSource) -> Result<(), ExecutionFailure>,
    ) -> Result<(), ExecutionFailure> {
        self.executed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((statement.to_string(), params.clone()));
        let step = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();

        let mut source = match step {
            None => return Err(ExecutionFailure::new("scripted engine has no more steps")),
            Some(EngineStep::Fail(message)) => return Err(ExecutionFailure::new(message)),
            Some(EngineStep::Rows { columns, rows }) => ScriptedRows {
                columns,
                rows: rows.into(),
                tail: Tail::End,
                next: 0,
            },
            Some(EngineStep::FailAfter {
                columns,
                rows,
                message,
            }) => ScriptedRows {
                columns,
                rows: rows.into(),
                tail: Tail::Fail(message),
                next: 0,
            },
            Some(EngineStep::PanicAfter {
                columns,
                rows,
                message,
            }) => ScriptedRows {
                columns,
                rows: rows.into(),
                tail: Tail::Panic(message),
                next: 0,
            },
            Some(EngineStep::Endless { column, delay }) => ScriptedRows {
                columns: vec![column],
                rows: VecDeque::new(),
                tail: Tail::Endless(delay),
                next: 0,
            },
        };
        visit(&mut source)
    }
}

enum Tail {
    End,
    Fail(String),
    Panic(String),
    Endless(Duration),
}

struct ScriptedRows {
    columns: Vec<String>,
    rows: VecDeque<Vec<SqlValue>>,
    tail: Tail,
    next: i64,
}

impl RowSource for ScriptedRows {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn fetch(&mut self, max: usize) -> Result<Vec<Vec<SqlValue>>, ExecutionFailure> {
        if !self.rows.is_empty() {
            let take = max.min(self.rows.len());
            return Ok(self.rows.drain(..take).collect());
        }
        match &self.tail {
            Tail::End => Ok(Vec::new()),
            Tail::Fail(message) => Err(ExecutionFailure::new(message.clone())),
            Tail::Panic(message) => panic!("{message}"),
            Tail::Endless(delay) => {
                std::thread::sleep(*delay);
                let start = self.next;
                self.next += max as i64;
                Ok((start..self.next).map(|i| vec![SqlValue::Int(i)]).collect())
            }
        }
    }
}
