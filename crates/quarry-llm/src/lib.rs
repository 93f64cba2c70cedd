// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat-model collaborators for Quarry.
//!
//! Everything here talks to an OpenAI-compatible chat completions endpoint
//! through the [`ChatModel`] trait:
//! - [`LlmQueryGenerator`] turns questions (and repair feedback) into SQL commands
//! - [`LlmAnswerComposer`] turns result samples into markdown answers
//! - [`LlmDomainGuard`] decides whether a question is in scope

pub mod client;
pub mod composer;
pub mod generator;
pub mod guard;
pub mod prompt;
pub mod types;

pub use client::{API_KEY_ENV, ChatModel, OpenAiChatClient};
pub use composer::{LlmAnswerComposer, evidence_answer, evidence_table};
pub use generator::{LlmQueryGenerator, parse_command};
pub use guard::LlmDomainGuard;
pub use types::{ChatMessage, ChatRole};
