// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read-only SQLite execution engine.
//!
//! Every `execute` call opens its own read-only connection, installs a
//! progress handler that interrupts the statement once the deadline passes,
//! binds named parameters, and lends the open cursor to the caller. The
//! connection is closed when `execute` returns.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use quarry_core::{ExecutionEngine, ExecutionFailure, Params, QuarryError, RowSource, SqlValue};
use rusqlite::types::{Value, ValueRef};
use rusqlite::{Connection, ErrorCode, OpenFlags};
use tracing::debug;

/// VM instructions between deadline checks.
const PROGRESS_CHECK_INTERVAL: i32 = 1_000;

/// Opens the target database read-only for each statement.
#[derive(Debug, Clone)]
pub struct SqliteEngine {
    path: PathBuf,
}

impl SqliteEngine {
    /// Verifies the database can be opened read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, QuarryError> {
        let path = path.as_ref().to_path_buf();
        open_read_only(&path).map_err(QuarryError::storage)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub(crate) fn open_read_only(path: &Path) -> Result<Connection, rusqlite::Error> {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
}

impl ExecutionEngine for SqliteEngine {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn execute(
        &self,
        statement: &str,
        params: &Params,
        timeout: Duration,
        visit: &mut dyn FnMut(&mut dyn RowSource) -> Result<(), ExecutionFailure>,
    ) -> Result<(), ExecutionFailure> {
        let conn = open_read_only(&self.path).map_err(ExecutionFailure::from_source)?;
        conn.busy_timeout(timeout)
            .map_err(ExecutionFailure::from_source)?;

        let deadline = Instant::now() + timeout;
        conn.progress_handler(
            PROGRESS_CHECK_INTERVAL,
            Some(move || Instant::now() >= deadline),
        );
        let describe = |e: rusqlite::Error| describe_error(e, timeout);

        let mut stmt = conn.prepare(statement).map_err(describe)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        bind_params(&mut stmt, params)?;
        debug!(columns = columns.len(), bound = params.len(), "sqlite statement prepared");

        let mut source = SqliteRows {
            rows: stmt.raw_query(),
            columns,
            timeout,
        };
        visit(&mut source)
    }
}

fn bind_params(stmt: &mut rusqlite::Statement<'_>, params: &Params) -> Result<(), ExecutionFailure> {
    let names: Vec<Option<String>> = (1..=stmt.parameter_count())
        .map(|idx| stmt.parameter_name(idx).map(str::to_string))
        .collect();

    for (offset, name) in names.into_iter().enumerate() {
        let idx = offset + 1;
        let key = match &name {
            Some(name) => name.trim_start_matches([':', '@', '$', '?']).to_string(),
            None => idx.to_string(),
        };
        let value = params.get(&key).ok_or_else(|| {
            ExecutionFailure::new(format!(
                "missing value for parameter {}",
                name.as_deref().unwrap_or(&key)
            ))
        })?;
        stmt.raw_bind_parameter(idx, json_to_sqlite(value))
            .map_err(ExecutionFailure::from_source)?;
    }
    Ok(())
}

fn json_to_sqlite(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Integer(i64::from(*b)),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Real(n.as_f64().unwrap_or_default()),
        },
        serde_json::Value::String(s) => Value::Text(s.clone()),
        other => Value::Text(other.to_string()),
    }
}

/// An interrupt raised by the progress handler is reported as a timeout so
/// the classifier treats it as one.
fn describe_error(e: rusqlite::Error, timeout: Duration) -> ExecutionFailure {
    if e.sqlite_error_code() == Some(ErrorCode::OperationInterrupted) {
        return ExecutionFailure {
            message: format!("statement timeout exceeded after {} ms", timeout.as_millis()),
            source: Some(Box::new(e)),
        };
    }
    ExecutionFailure::from_source(e)
}

struct SqliteRows<'stmt> {
    rows: rusqlite::Rows<'stmt>,
    columns: Vec<String>,
    timeout: Duration,
}

impl RowSource for SqliteRows<'_> {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn fetch(&mut self, max: usize) -> Result<Vec<Vec<SqlValue>>, ExecutionFailure> {
        let width = self.columns.len();
        let mut out = Vec::with_capacity(max);
        while out.len() < max {
            let next = self
                .rows
                .next()
                .map_err(|e| describe_error(e, self.timeout))?;
            let Some(row) = next else { break };
            let mut cells = Vec::with_capacity(width);
            for idx in 0..width {
                let cell = row.get_ref(idx).map_err(ExecutionFailure::from_source)?;
                cells.push(decode(cell));
            }
            out.push(cells);
        }
        Ok(out)
    }
}

fn decode(cell: ValueRef<'_>) -> SqlValue {
    match cell {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(i) => SqlValue::Int(i),
        ValueRef::Real(f) => SqlValue::Float(f),
        ValueRef::Text(bytes) => SqlValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => SqlValue::Bytes(bytes.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let conn = Connection::open(dir.path().join("t.db")).unwrap();
        conn.execute_batch(
            "CREATE TABLE orders (id INTEGER PRIMARY KEY, branch TEXT, total REAL, note BLOB);
             INSERT INTO orders VALUES (1, 'north', 10.5, x'6f6b');
             INSERT INTO orders VALUES (2, 'south', 20.0, NULL);
             INSERT INTO orders VALUES (3, 'north', 7.25, x'ff');",
        )
        .unwrap();
        dir
    }

    fn collect(
        engine: &SqliteEngine,
        sql: &str,
        params: &Params,
        timeout: Duration,
    ) -> Result<(Vec<String>, Vec<Vec<SqlValue>>), ExecutionFailure> {
        let mut columns = Vec::new();
        let mut rows = Vec::new();
        engine.execute(sql, params, timeout, &mut |source| {
            columns = source.columns().to_vec();
            loop {
                let batch = source.fetch(2)?;
                if batch.is_empty() {
                    return Ok(());
                }
                rows.extend(batch);
            }
        })?;
        Ok((columns, rows))
    }

    #[test]
    fn streams_all_rows_with_decoded_values() {
        let dir = fixture();
        let engine = SqliteEngine::open(dir.path().join("t.db")).unwrap();
        let (columns, rows) = collect(
            &engine,
            "SELECT id, branch, total, note FROM orders ORDER BY id;",
            &Params::new(),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(columns, vec!["id", "branch", "total", "note"]);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][0], SqlValue::Int(1));
        assert_eq!(rows[0][1], SqlValue::Text("north".into()));
        assert_eq!(rows[1][3], SqlValue::Null);
        assert_eq!(rows[2][3], SqlValue::Bytes(vec![0xff]));
    }

    #[test]
    fn binds_named_parameters() {
        let dir = fixture();
        let engine = SqliteEngine::open(dir.path().join("t.db")).unwrap();
        let mut params = Params::new();
        params.insert("branch".into(), serde_json::json!("north"));
        params.insert("min".into(), serde_json::json!(8));
        let (_, rows) = collect(
            &engine,
            "SELECT id FROM orders WHERE branch = :branch AND total > @min;",
            &params,
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(rows, vec![vec![SqlValue::Int(1)]]);
    }

    #[test]
    fn missing_parameter_is_a_failure() {
        let dir = fixture();
        let engine = SqliteEngine::open(dir.path().join("t.db")).unwrap();
        let err = collect(
            &engine,
            "SELECT id FROM orders WHERE branch = :branch;",
            &Params::new(),
            Duration::from_secs(5),
        )
        .unwrap_err();
        assert!(err.message.contains(":branch"));
    }

    #[test]
    fn unknown_column_surfaces_driver_text() {
        let dir = fixture();
        let engine = SqliteEngine::open(dir.path().join("t.db")).unwrap();
        let err = collect(
            &engine,
            "SELECT foo FROM orders;",
            &Params::new(),
            Duration::from_secs(5),
        )
        .unwrap_err();
        assert!(err.message.contains("no such column"), "{}", err.message);
    }

    #[test]
    fn writes_are_refused_by_the_connection() {
        let dir = fixture();
        let engine = SqliteEngine::open(dir.path().join("t.db")).unwrap();
        let err = collect(
            &engine,
            "DELETE FROM orders;",
            &Params::new(),
            Duration::from_secs(5),
        )
        .unwrap_err();
        assert!(err.message.to_lowercase().contains("readonly"), "{}", err.message);
    }

    #[test]
    fn long_statements_hit_the_timeout() {
        let dir = fixture();
        let engine = SqliteEngine::open(dir.path().join("t.db")).unwrap();
        let sql = "WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n) \
                   SELECT count(*) FROM n;";
        let err = collect(&engine, sql, &Params::new(), Duration::from_millis(50)).unwrap_err();
        assert!(err.message.starts_with("statement timeout exceeded"), "{}", err.message);
    }

    #[test]
    fn missing_database_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SqliteEngine::open(dir.path().join("absent.db")).is_err());
    }
}
