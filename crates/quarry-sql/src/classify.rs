// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Execution failure classification.
//!
//! A failure message is lower-cased and matched against an ordered table of
//! rules; the first rule with a matching marker decides the code and whether
//! a regenerated statement could fix it. New failure patterns are added as
//! rules, not as branches.

use quarry_core::{codes, ErrorClassification, ExecutionFailure};

use crate::runner::WORKER_PANIC_MESSAGE;

/// What to do with a failure that matches no rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnrecognizedFailurePolicy {
    /// Give the generator another attempt, bounded by the retry budget.
    Retry,
    /// Treat the failure as terminal.
    FailSafe,
}

/// Policy applied to failures no rule recognizes.
///
/// Retrying trades generation latency and cost for resilience: an unfamiliar
/// driver message is more often a fixable statement problem than an outage.
pub const UNRECOGNIZED_FAILURE_POLICY: UnrecognizedFailurePolicy =
    UnrecognizedFailurePolicy::Retry;

/// One row of the classification table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationRule {
    pub code: String,
    pub retryable: bool,
    /// Lower-case substrings; any one of them selects this rule.
    pub markers: Vec<String>,
}

impl ClassificationRule {
    pub fn new(code: impl Into<String>, retryable: bool, markers: &[&str]) -> Self {
        Self {
            code: code.into(),
            retryable,
            markers: markers.iter().map(|m| m.to_ascii_lowercase()).collect(),
        }
    }

    fn matches(&self, lowered: &str) -> bool {
        self.markers.iter().any(|m| lowered.contains(m.as_str()))
    }
}

/// Infrastructure failures a rewrite cannot fix.
const INFRASTRUCTURE_MARKERS: &[&str] = &[
    "access denied",
    "permission",
    "not authorized",
    "authentication",
    "auth failed",
    "can't connect",
    "cannot connect",
    "connection refused",
    "connection reset",
    "lost connection",
    "server has gone away",
    "too many connections",
    "ssl",
    "unable to open database",
    "readonly database",
];

/// Timeouts and lock contention; retrying against a slow backend could loop.
const TIMEOUT_MARKERS: &[&str] = &[
    "timeout",
    "timed out",
    "max_statement_time",
    "statement timeout",
    "lock wait timeout",
    "deadlock",
    "database is locked",
];

/// Statement mistakes a regenerated query can plausibly fix.
const STATEMENT_MARKERS: &[&str] = &[
    "unknown column",
    "unknown table",
    "doesn't exist",
    "does not exist",
    "no such table",
    "no such column",
    "no such function",
    "ambiguous",
    "syntax",
    "you have an error in your sql syntax",
    "invalid",
    "cannot resolve",
    "column not found",
    "table not found",
    "bad field",
];

/// The built-in table, in evaluation order.
pub fn default_rules() -> Vec<ClassificationRule> {
    vec![
        ClassificationRule::new(codes::INTERNAL_ERROR, false, &[WORKER_PANIC_MESSAGE]),
        ClassificationRule::new(codes::SQL_EXECUTION_FAILED, false, INFRASTRUCTURE_MARKERS),
        ClassificationRule::new(codes::SQL_TIMEOUT, false, TIMEOUT_MARKERS),
        ClassificationRule::new(codes::SQL_EXECUTION_FAILED_RETRYABLE, true, STATEMENT_MARKERS),
    ]
}

/// Maps raw execution failures to [`ErrorClassification`]s.
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    rules: Vec<ClassificationRule>,
    unrecognized: UnrecognizedFailurePolicy,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self {
            rules: default_rules(),
            unrecognized: UNRECOGNIZED_FAILURE_POLICY,
        }
    }
}

impl ErrorClassifier {
    pub fn new(rules: Vec<ClassificationRule>, unrecognized: UnrecognizedFailurePolicy) -> Self {
        Self {
            rules,
            unrecognized,
        }
    }

    /// Appends a rule, evaluated after the existing ones.
    pub fn with_rule(mut self, rule: ClassificationRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_unrecognized_policy(mut self, policy: UnrecognizedFailurePolicy) -> Self {
        self.unrecognized = policy;
        self
    }

    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    pub fn classify(&self, failure: &ExecutionFailure) -> ErrorClassification {
        self.classify_message(&failure.message)
    }

    /// Classifies a raw message. The original text is kept as the
    /// classification message so it can be fed back verbatim.
    pub fn classify_message(&self, message: &str) -> ErrorClassification {
        let message = if message.trim().is_empty() {
            "Unknown SQL error"
        } else {
            message
        };
        let lowered = message.to_lowercase();

        match self.rules.iter().find(|rule| rule.matches(&lowered)) {
            Some(rule) => ErrorClassification::new(rule.code.clone(), message, rule.retryable),
            None => ErrorClassification::new(
                codes::SQL_EXECUTION_FAILED,
                message,
                self.unrecognized == UnrecognizedFailurePolicy::Retry,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(msg: &str) -> ErrorClassification {
        ErrorClassifier::default().classify_message(msg)
    }

    #[test]
    fn unknown_column_is_retryable() {
        let c = classify("Unknown column `foo` in 'field list'");
        assert_eq!(c.code, codes::SQL_EXECUTION_FAILED_RETRYABLE);
        assert!(c.retryable);
        assert_eq!(c.message, "Unknown column `foo` in 'field list'");
    }

    #[test]
    fn sqlite_missing_column_is_retryable() {
        let c = classify("no such column: foo");
        assert!(c.retryable);
        assert_eq!(c.code, codes::SQL_EXECUTION_FAILED_RETRYABLE);
    }

    #[test]
    fn access_denied_is_terminal() {
        let c = classify("Access denied for user 'app'@'%'");
        assert_eq!(c.code, codes::SQL_EXECUTION_FAILED);
        assert!(!c.retryable);
    }

    #[test]
    fn timeouts_are_terminal() {
        for msg in [
            "statement timeout exceeded after 5000 ms",
            "Lock wait timeout exceeded; try restarting transaction",
            "Deadlock found when trying to get lock",
            "database is locked",
        ] {
            let c = classify(msg);
            assert_eq!(c.code, codes::SQL_TIMEOUT, "{msg}");
            assert!(!c.retryable);
        }
    }

    #[test]
    fn infrastructure_wins_over_statement_markers() {
        // "permission" is checked before "invalid"
        let c = classify("invalid permission for relation orders");
        assert!(!c.retryable);
        assert_eq!(c.code, codes::SQL_EXECUTION_FAILED);
    }

    #[test]
    fn unrecognized_failures_follow_the_policy() {
        let c = classify("something odd happened");
        assert_eq!(c.code, codes::SQL_EXECUTION_FAILED);
        assert_eq!(
            c.retryable,
            UNRECOGNIZED_FAILURE_POLICY == UnrecognizedFailurePolicy::Retry
        );

        let strict =
            ErrorClassifier::default().with_unrecognized_policy(UnrecognizedFailurePolicy::FailSafe);
        assert!(!strict.classify_message("something odd happened").retryable);
    }

    #[test]
    fn worker_panics_are_internal_and_terminal() {
        let c = classify("execution worker panicked: invalid cursor");
        assert_eq!(c.code, codes::INTERNAL_ERROR);
        assert!(!c.retryable);
    }

    #[test]
    fn empty_message_gets_a_placeholder() {
        assert_eq!(classify("").message, "Unknown SQL error");
    }

    #[test]
    fn custom_rules_are_additive() {
        let classifier = ErrorClassifier::default().with_rule(ClassificationRule::new(
            "SQL_QUOTA_EXCEEDED",
            false,
            &["Quota Exceeded"],
        ));
        let c = classifier.classify_message("query quota exceeded for project");
        assert_eq!(c.code, "SQL_QUOTA_EXCEEDED");
        assert!(!c.retryable);
        assert_eq!(classifier.rules().len(), 5);
    }

    #[test]
    fn classifies_execution_failures() {
        let failure = ExecutionFailure::new("no such table: ordrs");
        let c = ErrorClassifier::default().classify(&failure);
        assert!(c.retryable);
    }
}
