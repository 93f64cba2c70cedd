// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end pipeline testing.
//!
//! `TestHarness` assembles a complete pipeline over a seeded temp SQLite
//! database: the real validator, classifier, streaming runner, SQLite engine
//! and schema provider, with scripted stand-ins for the model-backed
//! generator and composer. `ask()` drives one run to completion.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use quarry_core::{DomainGuard, ExecutionEngine, QuarryError};
use quarry_memory::ConversationMemory;
use quarry_pipeline::{Pipeline, PipelineRun, PipelineSettings};
use quarry_sql::{RetrievalOptions, SqliteEngine, SqliteSchemaProvider};

use crate::events::EventLog;
use crate::mock_composer::MockComposer;
use crate::mock_generator::MockGenerator;

/// Three branches and six orders.
const SEED_SQL: &str = "
CREATE TABLE branches (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    city TEXT NOT NULL
);
CREATE TABLE orders (
    id INTEGER PRIMARY KEY,
    branch_id INTEGER NOT NULL REFERENCES branches(id),
    total REAL NOT NULL,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL
);
INSERT INTO branches (id, name, city) VALUES
    (1, 'Central', 'Bangkok'),
    (2, 'Riverside', 'Bangkok'),
    (3, 'Old Town', 'Chiang Mai');
INSERT INTO orders (id, branch_id, total, status, created_at) VALUES
    (1, 1, 120.0, 'paid', '2026-01-05'),
    (2, 1, 80.5, 'paid', '2026-01-06'),
    (3, 2, 200.0, 'paid', '2026-01-06'),
    (4, 2, 35.0, 'refunded', '2026-01-07'),
    (5, 3, 99.9, 'paid', '2026-01-07'),
    (6, 3, 15.0, 'cancelled', '2026-01-08');
";

/// Creates the sample `branches`/`orders` database at `path`.
pub fn seed_sample_database(path: &Path) -> Result<(), QuarryError> {
    let conn = rusqlite::Connection::open(path).map_err(QuarryError::storage)?;
    conn.execute_batch(SEED_SQL).map_err(QuarryError::storage)?;
    Ok(())
}

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    generator: MockGenerator,
    composer: MockComposer,
    engine: Option<Arc<dyn ExecutionEngine>>,
    guard: Option<Arc<dyn DomainGuard>>,
    settings: PipelineSettings,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            generator: MockGenerator::new(),
            composer: MockComposer::new(),
            engine: None,
            guard: None,
            settings: PipelineSettings::default(),
        }
    }

    /// Generator answers, one statement per attempt.
    pub fn with_statements<I, S>(mut self, statements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.generator = MockGenerator::with_statements(statements);
        self
    }

    pub fn with_generator(mut self, generator: MockGenerator) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_composer(mut self, composer: MockComposer) -> Self {
        self.composer = composer;
        self
    }

    /// Replaces the seeded SQLite engine.
    pub fn with_engine(mut self, engine: Arc<dyn ExecutionEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn with_guard(mut self, guard: Arc<dyn DomainGuard>) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.settings.max_retries = max_retries;
        self
    }

    /// Build the harness, creating and seeding the temp database.
    pub async fn build(self) -> Result<TestHarness, QuarryError> {
        let temp_dir = tempfile::TempDir::new().map_err(QuarryError::storage)?;
        let db_path = temp_dir.path().join("quarry-test.db");
        seed_sample_database(&db_path)?;

        let engine: Arc<dyn ExecutionEngine> = match self.engine {
            Some(engine) => engine,
            None => Arc::new(SqliteEngine::open(&db_path)?),
        };
        let schema = SqliteSchemaProvider::open(&db_path, RetrievalOptions::default()).await?;

        let generator = Arc::new(self.generator);
        let composer = Arc::new(self.composer);
        let memory = Arc::new(ConversationMemory::new(10, 1500)?);

        let mut builder = Pipeline::builder()
            .schema(Arc::new(schema))
            .generator(generator.clone())
            .composer(composer.clone())
            .engine(engine)
            .memory(memory.clone())
            .settings(self.settings);
        if let Some(guard) = self.guard {
            builder = builder.guard(guard);
        }

        Ok(TestHarness {
            pipeline: builder.build()?,
            generator,
            composer,
            memory,
            db_path,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete pipeline over a temp database, with access to the mocks for
/// assertions.
pub struct TestHarness {
    pub pipeline: Pipeline,
    pub generator: Arc<MockGenerator>,
    pub composer: Arc<MockComposer>,
    pub memory: Arc<ConversationMemory>,
    /// Path of the seeded database.
    pub db_path: PathBuf,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Starts a run without waiting for it.
    pub fn start(&self, question: &str, conversation_id: Option<&str>) -> PipelineRun {
        self.pipeline.run(question, conversation_id)
    }

    /// Runs `question` in a fresh conversation and collects every event.
    pub async fn ask(&self, question: &str) -> EventLog {
        self.start(question, None).collect_events().await.into()
    }

    /// Runs `question` in `conversation_id` and collects every event.
    pub async fn ask_in(&self, question: &str, conversation_id: &str) -> EventLog {
        self.start(question, Some(conversation_id))
            .collect_events()
            .await
            .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn harness_answers_from_the_seeded_database() {
        let harness = TestHarness::builder()
            .with_statements(["SELECT COUNT(*) AS n FROM orders"])
            .build()
            .await
            .unwrap();

        let log = harness.ask("How many orders are there in total this year?").await;
        log.assert_well_formed();
        let rows = log.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].chunk.rows[0]["n"], serde_json::json!(6));
    }
}
