// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite schema context provider.
//!
//! Introspects tables, columns and foreign keys, ranks tables by token
//! overlap with the question, expands foreign-key neighbours, and renders
//! the result as prompt text.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::LazyLock;

use async_trait::async_trait;
use quarry_config::DatabaseConfig;
use quarry_core::{QuarryError, SchemaContextProvider};
use regex::Regex;
use rusqlite::OpenFlags;
use tracing::debug;

/// Score per question token found in a table name.
const TABLE_NAME_WEIGHT: usize = 8;
/// Score per question token found in a column name.
const COLUMN_NAME_WEIGHT: usize = 2;

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z0-9_]+").expect("token regex is valid"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
}

/// Tables and relationships of one database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaSnapshot {
    pub tables: Vec<TableInfo>,
    pub foreign_keys: Vec<ForeignKey>,
}

/// Ranking knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrievalOptions {
    pub top_k_tables: usize,
    pub fk_hops: usize,
    pub max_columns_per_table: usize,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            top_k_tables: 6,
            fk_hops: 1,
            max_columns_per_table: 40,
        }
    }
}

impl From<&DatabaseConfig> for RetrievalOptions {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            top_k_tables: config.top_k_tables,
            fk_hops: config.fk_hops,
            max_columns_per_table: config.max_columns_per_table,
        }
    }
}

fn tokenize(text: &str) -> HashSet<String> {
    let lowered = text.to_lowercase();
    TOKEN
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}

impl SchemaSnapshot {
    /// Picks the tables relevant to `question`.
    ///
    /// Tables are scored by shared tokens (table names weigh more than column
    /// names). When nothing scores, the first `top_k_tables` are used. The
    /// pick is then widened by `fk_hops` foreign-key hops, and only
    /// relationships between picked tables are kept.
    pub fn select(&self, question: &str, options: RetrievalOptions) -> SchemaSnapshot {
        let question_tokens = tokenize(question);

        let mut scored: Vec<(usize, &TableInfo)> = self
            .tables
            .iter()
            .map(|table| {
                let mut score =
                    TABLE_NAME_WEIGHT * tokenize(&table.name).intersection(&question_tokens).count();
                for column in &table.columns {
                    score += COLUMN_NAME_WEIGHT
                        * tokenize(&column.name).intersection(&question_tokens).count();
                }
                (score, table)
            })
            .collect();
        // stable: ties keep catalogue order
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        let mut picked: BTreeSet<&str> = scored
            .iter()
            .filter(|(score, _)| *score > 0)
            .take(options.top_k_tables)
            .map(|(_, t)| t.name.as_str())
            .collect();
        if picked.is_empty() {
            picked = scored
                .iter()
                .take(options.top_k_tables)
                .map(|(_, t)| t.name.as_str())
                .collect();
        }

        for _ in 0..options.fk_hops {
            let added: Vec<&str> = self
                .foreign_keys
                .iter()
                .filter_map(|fk| {
                    let from = picked.contains(fk.from_table.as_str());
                    let to = picked.contains(fk.to_table.as_str());
                    match (from, to) {
                        (true, false) => Some(fk.to_table.as_str()),
                        (false, true) => Some(fk.from_table.as_str()),
                        _ => None,
                    }
                })
                .collect();
            if added.is_empty() {
                break;
            }
            picked.extend(added);
        }

        SchemaSnapshot {
            tables: self
                .tables
                .iter()
                .filter(|t| picked.contains(t.name.as_str()))
                .map(|t| TableInfo {
                    name: t.name.clone(),
                    columns: t
                        .columns
                        .iter()
                        .take(options.max_columns_per_table)
                        .cloned()
                        .collect(),
                })
                .collect(),
            foreign_keys: self
                .foreign_keys
                .iter()
                .filter(|fk| {
                    picked.contains(fk.from_table.as_str()) && picked.contains(fk.to_table.as_str())
                })
                .cloned()
                .collect(),
        }
    }

    /// Renders the snapshot as generation context.
    pub fn render(&self) -> String {
        let mut lines = vec!["DATABASE SCHEMA (use ONLY these tables/columns):".to_string()];
        for table in &self.tables {
            let columns: Vec<String> = table
                .columns
                .iter()
                .map(|c| format!("{} ({})", c.name, c.data_type))
                .collect();
            lines.push(format!("- {}: {}", table.name, columns.join(", ")));
        }
        if !self.foreign_keys.is_empty() {
            lines.push("RELATIONSHIPS (FK):".to_string());
            for fk in &self.foreign_keys {
                lines.push(format!(
                    "- {}.{} -> {}.{}",
                    fk.from_table, fk.from_column, fk.to_table, fk.to_column
                ));
            }
        }
        lines.join("\n")
    }
}

fn storage_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> QuarryError {
    QuarryError::storage(e)
}

/// Schema context read from a SQLite database.
pub struct SqliteSchemaProvider {
    conn: tokio_rusqlite::Connection,
    options: RetrievalOptions,
}

impl SqliteSchemaProvider {
    /// Opens the database read-only.
    pub async fn open(path: impl AsRef<Path>, options: RetrievalOptions) -> Result<Self, QuarryError> {
        let conn = tokio_rusqlite::Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .await
        .map_err(QuarryError::storage)?;
        Ok(Self { conn, options })
    }

    /// Reads the full catalogue. User tables only, in name order.
    pub async fn snapshot(&self) -> Result<SchemaSnapshot, QuarryError> {
        self.conn
            .call(|conn| -> Result<SchemaSnapshot, rusqlite::Error> {
                let names: Vec<String> = conn
                    .prepare(
                        "SELECT name FROM sqlite_master \
                         WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
                    )?
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<_, _>>()?;

                let mut snapshot = SchemaSnapshot::default();
                let mut columns_stmt = conn.prepare(
                    "SELECT name, type, \"notnull\" FROM pragma_table_info(?1) ORDER BY cid",
                )?;
                let mut fk_stmt = conn.prepare(
                    "SELECT \"table\", \"from\", \"to\" FROM pragma_foreign_key_list(?1) \
                     ORDER BY id, seq",
                )?;

                for name in names {
                    let columns = columns_stmt
                        .query_map([&name], |row| {
                            let data_type: String = row.get(1)?;
                            let not_null: i64 = row.get(2)?;
                            Ok(ColumnInfo {
                                name: row.get(0)?,
                                data_type: if data_type.is_empty() {
                                    "ANY".to_string()
                                } else {
                                    data_type
                                },
                                nullable: not_null == 0,
                            })
                        })?
                        .collect::<Result<Vec<_>, _>>()?;

                    let fks = fk_stmt
                        .query_map([&name], |row| {
                            Ok(ForeignKey {
                                from_table: name.clone(),
                                from_column: row.get(1)?,
                                to_table: row.get(0)?,
                                to_column: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                            })
                        })?
                        .collect::<Result<Vec<_>, _>>()?;

                    snapshot.foreign_keys.extend(fks);
                    snapshot.tables.push(TableInfo { name, columns });
                }
                Ok(snapshot)
            })
            .await
            .map_err(storage_err)
    }
}

#[async_trait]
impl SchemaContextProvider for SqliteSchemaProvider {
    fn name(&self) -> &str {
        "sqlite-schema"
    }

    async fn retrieve(&self, question: &str) -> Result<String, QuarryError> {
        let selected = self.snapshot().await?.select(question, self.options);
        debug!(
            tables = selected.tables.len(),
            relationships = selected.foreign_keys.len(),
            "schema context selected"
        );
        Ok(selected.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(name: &str, columns: &[&str]) -> TableInfo {
        TableInfo {
            name: name.into(),
            columns: columns
                .iter()
                .map(|c| ColumnInfo {
                    name: (*c).into(),
                    data_type: "TEXT".into(),
                    nullable: true,
                })
                .collect(),
        }
    }

    fn catalogue() -> SchemaSnapshot {
        SchemaSnapshot {
            tables: vec![
                table("branches", &["id", "name", "region"]),
                table("customers", &["id", "name"]),
                table("orders", &["id", "branch_id", "total", "created_at"]),
                table("suppliers", &["id", "name"]),
            ],
            foreign_keys: vec![ForeignKey {
                from_table: "orders".into(),
                from_column: "branch_id".into(),
                to_table: "branches".into(),
                to_column: "id".into(),
            }],
        }
    }

    #[test]
    fn table_name_matches_rank_first_and_fk_neighbours_join() {
        let options = RetrievalOptions {
            top_k_tables: 1,
            ..RetrievalOptions::default()
        };
        let picked = catalogue().select("total of orders this month", options);
        let names: Vec<_> = picked.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["branches", "orders"]);
        assert_eq!(picked.foreign_keys.len(), 1);
    }

    #[test]
    fn no_hops_keeps_only_ranked_tables() {
        let options = RetrievalOptions {
            top_k_tables: 1,
            fk_hops: 0,
            ..RetrievalOptions::default()
        };
        let picked = catalogue().select("orders", options);
        assert_eq!(picked.tables.len(), 1);
        assert!(picked.foreign_keys.is_empty());
    }

    #[test]
    fn falls_back_to_first_tables_when_nothing_matches() {
        let options = RetrievalOptions {
            top_k_tables: 2,
            fk_hops: 0,
            ..RetrievalOptions::default()
        };
        let picked = catalogue().select("quelque chose", options);
        let names: Vec<_> = picked.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["branches", "customers"]);
    }

    #[test]
    fn columns_are_capped() {
        let options = RetrievalOptions {
            top_k_tables: 1,
            fk_hops: 0,
            max_columns_per_table: 2,
        };
        let picked = catalogue().select("orders", options);
        assert_eq!(picked.tables[0].columns.len(), 2);
    }

    #[test]
    fn renders_tables_and_relationships() {
        let text = catalogue().select("orders", RetrievalOptions::default()).render();
        assert!(text.starts_with("DATABASE SCHEMA (use ONLY these tables/columns):"));
        assert!(text.contains("- orders: id (TEXT), branch_id (TEXT)"));
        assert!(text.contains("RELATIONSHIPS (FK):\n- orders.branch_id -> branches.id"));
    }

    #[tokio::test]
    async fn introspects_sqlite_catalogue() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.db");
        {
            let conn = rusqlite::Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE branches (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
                 CREATE TABLE orders (
                     id INTEGER PRIMARY KEY,
                     branch_id INTEGER REFERENCES branches(id),
                     total NUMERIC
                 );",
            )
            .unwrap();
        }

        let provider = SqliteSchemaProvider::open(&path, RetrievalOptions::default())
            .await
            .unwrap();
        let snapshot = provider.snapshot().await.unwrap();
        assert_eq!(snapshot.tables.len(), 2);
        assert_eq!(snapshot.tables[0].name, "branches");
        assert!(!snapshot.tables[0].columns[1].nullable);
        assert_eq!(
            snapshot.foreign_keys,
            vec![ForeignKey {
                from_table: "orders".into(),
                from_column: "branch_id".into(),
                to_table: "branches".into(),
                to_column: "id".into(),
            }]
        );

        let context = provider.retrieve("total per branch").await.unwrap();
        assert!(context.contains("- orders: id (INTEGER), branch_id (INTEGER), total (NUMERIC)"));
        assert!(context.contains("- branches:"));
    }
}
