// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The question-to-answer state machine.
//!
//! One run moves through these states:
//!
//! ```text
//! DomainCheck -> SchemaContext -> Generate -> Validate -> Execute -> Compose -> Done(success)
//!                                    ^                        |
//!                                    +---- retryable failure -+--> Done(fail)
//! ```
//!
//! plus `Done(needs_input)` when the domain gate asks for clarification.
//! Validation and execution failures share one attempt counter bounded by
//! `max_retries + 1`. Every terminal path sends exactly one `answer` before
//! `done`, including cancellation and panics inside the run.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use quarry_config::PipelineConfig;
use quarry_core::{
    AnswerComposer, CompositionMeta, CompositionRequest, DomainGuard, ErrorClassification,
    ExecutionEngine, GenerationError, GenerationRequest, GuardDecision, Message, Params,
    PipelineEvent, QuarryError, QueryGenerator, RepairContext, ResultSample, Role, Row,
    RunStatus, SchemaContextProvider, SqlCommand, Stage, StepStatus, codes,
};
use quarry_memory::ConversationMemory;
use quarry_sql::{ErrorClassifier, QueryValidator, RunLimits, StreamingQueryRunner, Validation};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::fallback;
use crate::guard::KeywordGuard;
use crate::run::PipelineRun;
use crate::sink::EventSink;

/// Limits applied to every run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Regenerations allowed after the first attempt.
    pub max_retries: u32,
    pub chunk_size: usize,
    pub max_rows: usize,
    pub statement_timeout: Duration,
    /// Events buffered between the run task and the caller.
    pub event_buffer: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for PipelineSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            chunk_size: config.chunk_size,
            max_rows: config.max_rows,
            statement_timeout: Duration::from_millis(config.statement_timeout_ms),
            event_buffer: config.event_buffer,
        }
    }
}

impl PipelineSettings {
    /// Upper bound on `Generate` entries per run.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    fn limits(&self) -> RunLimits {
        RunLimits::new(self.chunk_size, self.max_rows, self.statement_timeout)
    }

    fn validate(&self) -> Result<(), QuarryError> {
        let checks = [
            (self.chunk_size == 0, "chunk_size must be greater than 0"),
            (self.max_rows == 0, "max_rows must be greater than 0"),
            (self.statement_timeout.is_zero(), "statement timeout must be greater than 0"),
            (self.event_buffer == 0, "event_buffer must be greater than 0"),
        ];
        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, message)) => Err(QuarryError::Config(format!("pipeline {message}"))),
            None => Ok(()),
        }
    }
}

/// Rows and statement of a successful attempt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub statement: String,
    pub params: Params,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

/// Result of one generate, validate and execute cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Succeeded(QueryResult),
    Failed(ErrorClassification),
}

/// The run was cancelled by its caller.
#[derive(Debug)]
struct Cancelled;

async fn cancellable<F: Future>(cancel: &CancellationToken, fut: F) -> Result<F::Output, Cancelled> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Cancelled),
        out = fut => Ok(out),
    }
}

fn stage_for(code: &str) -> Stage {
    match code {
        codes::GENERATION_PARSE_FAILED | codes::TEXT_TO_SQL_FAILED => Stage::TextToSql,
        codes::SQL_VALIDATION_FAILED => Stage::SqlValidate,
        _ => Stage::SqlExecute,
    }
}

fn retry_message(code: &str) -> &'static str {
    match code {
        codes::GENERATION_PARSE_FAILED => "Generator output was unusable, revising…",
        codes::SQL_VALIDATION_FAILED => "SQL failed validation, revising…",
        _ => "Query failed, revising SQL…",
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

struct RunRequest {
    run_id: String,
    question: String,
    conversation: String,
    cancel: CancellationToken,
}

struct Inner {
    guard: Arc<dyn DomainGuard>,
    schema: Arc<dyn SchemaContextProvider>,
    generator: Arc<dyn QueryGenerator>,
    composer: Arc<dyn AnswerComposer>,
    runner: StreamingQueryRunner,
    validator: QueryValidator,
    classifier: ErrorClassifier,
    memory: Arc<ConversationMemory>,
    settings: PipelineSettings,
}

/// The retrying, streaming query pipeline. Cheap to clone; clones share
/// collaborators and memory.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<Inner>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn memory(&self) -> &Arc<ConversationMemory> {
        &self.inner.memory
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.inner.settings
    }

    /// Starts a run and returns its event stream. Must be called inside a
    /// Tokio runtime.
    ///
    /// Without a conversation id the run gets a fresh conversation keyed by
    /// its run id. A blank id maps to the memory's default conversation.
    pub fn run(&self, question: impl Into<String>, conversation_id: Option<&str>) -> PipelineRun {
        let run_id = Uuid::new_v4().to_string();
        let request = RunRequest {
            conversation: conversation_id.map_or_else(|| run_id.clone(), str::to_string),
            question: question.into(),
            run_id: run_id.clone(),
            cancel: CancellationToken::new(),
        };
        let cancel = request.cancel.clone();
        let (tx, rx) = mpsc::channel(self.inner.settings.event_buffer);

        let inner = Arc::clone(&self.inner);
        let span = info_span!("pipeline_run", run_id = %run_id);
        tokio::spawn(async move { inner.execute(request, tx).await }.instrument(span));

        PipelineRun::new(run_id, rx, cancel)
    }
}

impl Inner {
    /// Outermost run boundary: turns cancellation and panics into a closing
    /// answer and `done(fail)`.
    async fn execute(&self, request: RunRequest, tx: mpsc::Sender<PipelineEvent>) {
        let started = Instant::now();
        let mut sink = EventSink::new(tx, request.run_id.clone());
        info!(conversation = %request.conversation, "pipeline run started");

        let outcome = AssertUnwindSafe(self.drive(&request, &mut sink))
            .catch_unwind()
            .await;
        let status = match outcome {
            Ok(Ok(status)) => status,
            Ok(Err(Cancelled)) => {
                info!(attempt = sink.attempt(), "pipeline run cancelled");
                sink.answer(fallback::cancelled_answer(&request.run_id)).await;
                RunStatus::Fail
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(attempt = sink.attempt(), panic = %message, "pipeline run panicked");
                let failure = ErrorClassification::new(
                    codes::INTERNAL_ERROR,
                    format!("internal error: {message}"),
                    false,
                );
                sink.error(&failure).await;
                RunStatus::Fail
            }
        };

        if !sink.answered() {
            sink.answer(fallback::failure_answer(&request.run_id)).await;
        }
        sink.done(status).await;
        info!(
            %status,
            attempt = sink.attempt(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "pipeline run finished"
        );
    }

    async fn drive(&self, req: &RunRequest, sink: &mut EventSink) -> Result<RunStatus, Cancelled> {
        let history = self.memory.history(&req.conversation);

        sink.step(Stage::DomainGuard, "Checking your question…", None).await;
        match cancellable(&req.cancel, self.guard.check(&req.question)).await? {
            GuardDecision::Deny { message } => {
                info!(guard = self.guard.name(), stage = %Stage::DomainGuard, "question denied");
                let failure = ErrorClassification::new(
                    codes::OUT_OF_DOMAIN,
                    "Question is outside supported domain",
                    false,
                );
                sink.error(&failure).await;
                sink.answer(message).await;
                return Ok(RunStatus::Fail);
            }
            GuardDecision::Ask { message, questions } => {
                info!(guard = self.guard.name(), questions = questions.len(), "clarification requested");
                sink.answer(fallback::clarification_answer(&message, &questions)).await;
                return Ok(RunStatus::NeedsInput);
            }
            GuardDecision::Allow { matched } => {
                debug!(guard = self.guard.name(), ?matched, "question allowed");
                sink.step(Stage::DomainGuard, "Looks good. Generating SQL…", Some(StepStatus::Ok))
                    .await;
            }
        }

        sink.step(Stage::SchemaContext, "Looking up relevant tables…", None).await;
        let schema_context = match cancellable(&req.cancel, self.schema.retrieve(&req.question)).await? {
            Ok(context) => context,
            Err(e) => {
                warn!(provider = self.schema.name(), error = %e, "schema context retrieval failed");
                let failure =
                    ErrorClassification::new(codes::SCHEMA_CONTEXT_FAILED, e.to_string(), false);
                sink.error(&failure).await;
                sink.answer(fallback::failure_answer(&req.run_id)).await;
                return Ok(RunStatus::Fail);
            }
        };
        sink.step(Stage::SchemaContext, "Schema context ready.", Some(StepStatus::Ok)).await;

        let max_attempts = self.settings.max_attempts();
        let mut repair: Option<RepairContext> = None;
        let mut attempt = 0u32;

        let result = loop {
            sink.set_attempt(attempt);
            let generation = GenerationRequest {
                question: req.question.clone(),
                history: history.clone(),
                schema_context: schema_context.clone(),
                repair: repair.take(),
            };

            let (command, outcome) = match self.generate(req, sink, &generation).await? {
                Ok(command) => {
                    let outcome = self.validate_and_execute(req, sink, &command).await?;
                    (command, outcome)
                }
                Err(failure) => (SqlCommand::default(), AttemptOutcome::Failed(failure)),
            };

            let failure = match outcome {
                AttemptOutcome::Succeeded(result) => break result,
                AttemptOutcome::Failed(failure) => failure,
            };

            sink.error(&failure).await;
            let next = attempt + 1;
            if failure.retryable && next < max_attempts {
                info!(attempt, error_code = %failure.code, "attempt failed, retrying");
                sink.step(
                    stage_for(&failure.code),
                    format!(
                        "{} (next attempt {}/{})",
                        retry_message(&failure.code),
                        next + 1,
                        max_attempts
                    ),
                    Some(StepStatus::Retry),
                )
                .await;
                repair = Some(RepairContext {
                    previous_statement: command.statement,
                    previous_params: command.params,
                    failure,
                    attempt: next,
                });
                attempt = next;
                continue;
            }

            warn!(
                attempt,
                error_code = %failure.code,
                retryable = failure.retryable,
                "run failed"
            );
            sink.answer(fallback::failure_answer(&req.run_id)).await;
            return Ok(RunStatus::Fail);
        };

        self.compose(req, sink, history, result, attempt + 1).await
    }

    async fn generate(
        &self,
        req: &RunRequest,
        sink: &mut EventSink,
        generation: &GenerationRequest,
    ) -> Result<Result<SqlCommand, ErrorClassification>, Cancelled> {
        let attempt = sink.attempt();
        let message = if attempt == 0 {
            "Drafting SQL…".to_string()
        } else {
            format!(
                "Revising SQL… (attempt {}/{})",
                attempt + 1,
                self.settings.max_attempts()
            )
        };
        sink.step(Stage::TextToSql, message, None).await;

        match cancellable(&req.cancel, self.generator.generate(generation)).await? {
            Ok(command) => {
                debug!(
                    attempt,
                    generator = self.generator.name(),
                    params = command.params.len(),
                    "statement generated"
                );
                sink.sql(&command.statement, &command.params).await;
                Ok(Ok(command))
            }
            Err(GenerationError::Malformed(reason)) => Ok(Err(ErrorClassification::new(
                codes::GENERATION_PARSE_FAILED,
                reason,
                true,
            ))),
            Err(GenerationError::Unavailable { message, .. }) => Ok(Err(
                ErrorClassification::new(codes::TEXT_TO_SQL_FAILED, message, false),
            )),
        }
    }

    async fn validate_and_execute(
        &self,
        req: &RunRequest,
        sink: &mut EventSink,
        command: &SqlCommand,
    ) -> Result<AttemptOutcome, Cancelled> {
        sink.step(Stage::SqlValidate, "Validating SQL…", None).await;
        let statement = match self.validator.validate(&command.statement) {
            Validation::Accepted { statement } => statement,
            Validation::Rejected { reason } => {
                debug!(attempt = sink.attempt(), %reason, "statement rejected");
                return Ok(AttemptOutcome::Failed(ErrorClassification::new(
                    codes::SQL_VALIDATION_FAILED,
                    reason,
                    true,
                )));
            }
        };
        sink.step(Stage::SqlValidate, "SQL looks safe. Running query…", Some(StepStatus::Ok))
            .await;

        sink.step(Stage::SqlExecute, "Query running…", None).await;
        let mut stream = self.runner.run(
            statement.clone(),
            command.params.clone(),
            self.settings.limits(),
            &req.cancel,
        );

        // Rows of a failed attempt are dropped with this buffer.
        let mut columns: Vec<String> = Vec::new();
        let mut rows: Vec<Row> = Vec::new();
        while let Some(item) = stream.next_chunk().await {
            match item {
                Ok(chunk) => {
                    if columns.is_empty() {
                        columns = chunk.columns.clone();
                    }
                    rows.extend(chunk.rows.iter().cloned());
                    sink.rows(chunk).await;
                }
                Err(failure) => {
                    let classification = self.classifier.classify(&failure);
                    debug!(
                        attempt = sink.attempt(),
                        error_code = %classification.code,
                        rows = rows.len(),
                        "execution failed"
                    );
                    return Ok(AttemptOutcome::Failed(classification));
                }
            }
        }
        if req.cancel.is_cancelled() {
            return Err(Cancelled);
        }

        info!(attempt = sink.attempt(), rows = rows.len(), engine = self.runner.engine_name(), "query executed");
        sink.step(
            Stage::SqlExecute,
            format!("Got {} rows (sample). Composing answer…", rows.len()),
            Some(StepStatus::Ok),
        )
        .await;

        Ok(AttemptOutcome::Succeeded(QueryResult {
            statement,
            params: command.params.clone(),
            columns,
            rows,
        }))
    }

    async fn compose(
        &self,
        req: &RunRequest,
        sink: &mut EventSink,
        history: Vec<Message>,
        result: QueryResult,
        attempt_count: u32,
    ) -> Result<RunStatus, Cancelled> {
        sink.step(Stage::Compose, "Writing the answer…", None).await;

        let row_count = result.rows.len();
        let max_rows = self.settings.max_rows;
        let request = CompositionRequest {
            run_id: req.run_id.clone(),
            question: req.question.clone(),
            history,
            statement: result.statement,
            params: result.params,
            result: ResultSample {
                columns: result.columns,
                rows: result.rows,
                row_count,
            },
            meta: CompositionMeta {
                attempt_count,
                max_rows_limit: max_rows,
                is_sampled: row_count >= max_rows,
                timeout_ms: self.settings.statement_timeout.as_millis() as u64,
                confidence_hints: fallback::confidence_hints(row_count, max_rows, attempt_count),
            },
        };

        let markdown = match cancellable(&req.cancel, self.composer.compose(&request)).await? {
            Ok(markdown) if !markdown.trim().is_empty() => markdown,
            Ok(_) => {
                warn!(composer = self.composer.name(), "composer returned an empty answer");
                sink.step(Stage::Compose, "Showing the query result instead.", Some(StepStatus::Fallback))
                    .await;
                fallback::composer_failure_answer(&req.run_id, row_count)
            }
            Err(e) => {
                warn!(composer = self.composer.name(), error = %e, "composer failed");
                let failure = ErrorClassification::new(codes::COMPOSER_FAILED, e.to_string(), false);
                sink.error(&failure).await;
                sink.step(Stage::Compose, "Showing the query result instead.", Some(StepStatus::Fallback))
                    .await;
                fallback::composer_failure_answer(&req.run_id, row_count)
            }
        };

        self.memory.append(&req.conversation, Role::User, &req.question);
        self.memory.append(&req.conversation, Role::Assistant, &markdown);
        sink.answer(markdown).await;
        Ok(RunStatus::Success)
    }
}

/// Assembles a [`Pipeline`].
///
/// The schema provider, generator, composer and execution engine are
/// required. The keyword guard, the SQLite validator, the default classifier
/// and a default-sized memory are used when not set.
#[derive(Default)]
pub struct PipelineBuilder {
    guard: Option<Arc<dyn DomainGuard>>,
    schema: Option<Arc<dyn SchemaContextProvider>>,
    generator: Option<Arc<dyn QueryGenerator>>,
    composer: Option<Arc<dyn AnswerComposer>>,
    engine: Option<Arc<dyn ExecutionEngine>>,
    memory: Option<Arc<ConversationMemory>>,
    validator: Option<QueryValidator>,
    classifier: Option<ErrorClassifier>,
    settings: PipelineSettings,
}

impl PipelineBuilder {
    pub fn guard(mut self, guard: Arc<dyn DomainGuard>) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn schema(mut self, schema: Arc<dyn SchemaContextProvider>) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn generator(mut self, generator: Arc<dyn QueryGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn composer(mut self, composer: Arc<dyn AnswerComposer>) -> Self {
        self.composer = Some(composer);
        self
    }

    pub fn engine(mut self, engine: Arc<dyn ExecutionEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn memory(mut self, memory: Arc<ConversationMemory>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn validator(mut self, validator: QueryValidator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> Result<Pipeline, QuarryError> {
        self.settings.validate()?;
        let missing = |what: &str| QuarryError::Config(format!("pipeline needs {what}"));

        let memory = match self.memory {
            Some(memory) => memory,
            None => Arc::new(ConversationMemory::from_config(&Default::default())?),
        };
        let engine = self.engine.ok_or_else(|| missing("an execution engine"))?;

        Ok(Pipeline {
            inner: Arc::new(Inner {
                guard: self
                    .guard
                    .unwrap_or_else(|| Arc::new(KeywordGuard::default())),
                schema: self.schema.ok_or_else(|| missing("a schema context provider"))?,
                generator: self.generator.ok_or_else(|| missing("a query generator"))?,
                composer: self.composer.ok_or_else(|| missing("an answer composer"))?,
                runner: StreamingQueryRunner::new(engine),
                validator: self.validator.unwrap_or_default(),
                classifier: self.classifier.unwrap_or_default(),
                memory,
                settings: self.settings,
            }),
        })
    }
}
