// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat-model backed domain gate.
//!
//! The model classifies a question as `ALLOW`, `ASK` or `DENY` with a
//! confidence. An unavailable model or an unusable answer defers to the
//! fallback guard. Low-confidence rejections become clarifying questions
//! instead of refusals.

use std::sync::Arc;

use async_trait::async_trait;
use quarry_core::{DomainGuard, GuardDecision};
use tracing::{debug, warn};

use crate::client::ChatModel;
use crate::prompt::extract_json_object;
use crate::types::ChatMessage;

/// Clarifying questions kept from one answer.
pub const MAX_QUESTIONS: usize = 2;

/// Scope used when none is configured.
pub const DEFAULT_SCOPE: &str = "This system answers questions by querying a sales database only: \
orders and order status, branches and stores, sales, revenue and related metrics, \
filtered by dates or time ranges. General chat, general knowledge, writing code, \
politics and translation are out of scope.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Allow,
    Ask,
    Deny,
}

impl Verdict {
    /// Anything unrecognized is treated as a denial.
    fn parse(value: Option<&serde_json::Value>) -> Self {
        match value.and_then(|v| v.as_str()).map(|s| s.trim().to_ascii_uppercase()) {
            Some(s) if s == "ALLOW" => Verdict::Allow,
            Some(s) if s == "ASK" => Verdict::Ask,
            _ => Verdict::Deny,
        }
    }
}

/// Domain gate that asks a [`ChatModel`] and falls back to another guard.
pub struct LlmDomainGuard {
    model: Arc<dyn ChatModel>,
    fallback: Arc<dyn DomainGuard>,
    ask_threshold: f64,
    scope: String,
}

impl LlmDomainGuard {
    pub fn new(model: Arc<dyn ChatModel>, fallback: Arc<dyn DomainGuard>, ask_threshold: f64) -> Self {
        Self {
            model,
            fallback,
            ask_threshold,
            scope: DEFAULT_SCOPE.to_string(),
        }
    }

    /// Replaces the scope description given to the model.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    fn system_prompt(&self) -> String {
        format!(
            "You are a strict domain guard for a Text-to-SQL system.\n\n\
             SCOPE:\n{}\n\n\
             TASK:\n\
             Given the user question, output ONLY valid JSON with:\n\
             - decision: \"ALLOW\" | \"ASK\" | \"DENY\"\n\
             - confidence: number 0.0..1.0\n\
             - reason: short sentence (why)\n\
             - questions: array of 0-2 clarifying questions (ONLY if decision=\"ASK\", else []).\n\n\
             RULES:\n\
             - ALLOW if the intent can reasonably be answered by querying the database within scope.\n\
             - ASK if in scope but missing essential constraints (time range, branch, metric).\n\
             - DENY if outside scope or general chat unrelated to the database.\n\
             - Do NOT generate SQL.\n\
             - Do NOT mention table names.\n\
             - Be brief.\n",
            self.scope
        )
    }

    fn decide(&self, answer: &serde_json::Map<String, serde_json::Value>) -> GuardDecision {
        let mut verdict = Verdict::parse(answer.get("decision"));
        let confidence = answer
            .get("confidence")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0)
            .clamp(0.0, 1.0);
        let reason = answer
            .get("reason")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .unwrap_or_default()
            .to_string();
        let questions: Vec<String> = answer
            .get("questions")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .take(MAX_QUESTIONS)
                    .filter_map(|q| q.as_str())
                    .map(str::trim)
                    .filter(|q| !q.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        if confidence < self.ask_threshold && verdict != Verdict::Allow {
            verdict = Verdict::Ask;
        }
        debug!(?verdict, confidence, "llm guard verdict");

        match verdict {
            Verdict::Allow => GuardDecision::Allow { matched: Vec::new() },
            Verdict::Ask => GuardDecision::Ask {
                message: if reason.is_empty() {
                    "The question is in scope but needs more detail to query accurately.".into()
                } else {
                    reason
                },
                questions: if questions.is_empty() {
                    default_questions()
                } else {
                    questions
                },
            },
            Verdict::Deny => GuardDecision::Deny {
                message: deny_message(if reason.is_empty() {
                    "This question is outside the scope of the database."
                } else {
                    &reason
                }),
            },
        }
    }
}

fn default_questions() -> Vec<String> {
    vec![
        "Which time range do you mean (e.g. today, this week, this month, or exact dates)?".into(),
        "Which branch or store, and which metric (orders, sales, revenue)?".into(),
    ]
}

fn deny_message(reason: &str) -> String {
    format!(
        "{reason}\n\nSupported questions are about **orders / branches / sales and revenue**, \
         for example:\n\
         - Total sales this month by branch\n\
         - Number of orders today per branch\n\
         - Top 5 branches by revenue over the last 30 days\n"
    )
}

#[async_trait]
impl DomainGuard for LlmDomainGuard {
    fn name(&self) -> &str {
        "llm"
    }

    async fn check(&self, question: &str) -> GuardDecision {
        let messages = [
            ChatMessage::system(self.system_prompt()),
            ChatMessage::user(format!("User question:\n{question}\n")),
        ];

        let raw = match self.model.complete(&messages).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, fallback = self.fallback.name(), "llm guard unavailable, using fallback");
                return self.fallback.check(question).await;
            }
        };

        match extract_json_object(&raw) {
            Some(answer) => self.decide(&answer),
            None => {
                warn!(fallback = self.fallback.name(), "llm guard answer was not JSON, using fallback");
                self.fallback.check(question).await
            }
        }
    }
}
