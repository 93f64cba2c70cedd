// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Quarry query pipeline.

use thiserror::Error;

/// Boxed error source carried by several variants.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The primary error type used across collaborator traits and core operations.
#[derive(Debug, Error)]
pub enum QuarryError {
    /// Configuration errors (invalid values, violated construction preconditions).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database open, schema introspection).
    #[error("storage error: {source}")]
    Storage { source: BoxError },

    /// LLM provider errors (HTTP failure, unexpected response shape).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<BoxError>,
    },

    /// Query execution errors surfaced outside the streaming runner.
    #[error("execution error: {0}")]
    Execution(#[from] ExecutionFailure),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl QuarryError {
    /// Wraps any error as a storage error.
    pub fn storage(source: impl Into<BoxError>) -> Self {
        QuarryError::Storage {
            source: source.into(),
        }
    }

    /// Builds a provider error without an underlying source.
    pub fn provider(message: impl Into<String>) -> Self {
        QuarryError::Provider {
            message: message.into(),
            source: None,
        }
    }
}

/// A raw failure raised while opening, executing, or fetching a statement.
///
/// The runner never interprets these; the orchestrator hands the message to
/// the error classifier.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ExecutionFailure {
    pub message: String,
    #[source]
    pub source: Option<BoxError>,
}

impl ExecutionFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Wraps a driver error, keeping its display text as the message.
    pub fn from_source(source: impl Into<BoxError>) -> Self {
        let source = source.into();
        Self {
            message: source.to_string(),
            source: Some(source),
        }
    }
}

/// Failure modes of a query generator.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The generator answered, but its output could not be turned into a
    /// well-formed command (invalid JSON, missing statement).
    #[error("malformed generator output: {0}")]
    Malformed(String),

    /// The generator could not produce anything (transport failure, gave up).
    #[error("generator unavailable: {message}")]
    Unavailable {
        message: String,
        source: Option<BoxError>,
    },
}

impl GenerationError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        GenerationError::Unavailable {
            message: message.into(),
            source: None,
        }
    }
}

impl From<QuarryError> for GenerationError {
    fn from(err: QuarryError) -> Self {
        GenerationError::Unavailable {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}
