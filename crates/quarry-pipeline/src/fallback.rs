// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic answers for runs that end without a composed answer, and
//! the confidence hints handed to the composer.

use quarry_core::ConfidenceHints;

/// Confidence lost when the result hit the row cap.
pub const SAMPLE_PENALTY: f64 = 0.15;

/// Confidence lost per attempt beyond the first.
pub const RETRY_PENALTY_PER_ATTEMPT: f64 = 0.1;

/// Answer sent when no query could be produced or executed.
pub fn failure_answer(run_id: &str) -> String {
    format!(
        "### Answer\n\
         - Sorry, I couldn't produce a working query for this question. It may be ambiguous \
         or outside what the database covers.\n\n\
         ### Suggestions\n\
         - Name the data you need (for example orders, branches or sales).\n\
         - Give a clearer time range or filter.\n\n\
         **trace_id:** `{run_id}`\n"
    )
}

/// Answer sent when the query ran but the composer failed.
pub fn composer_failure_answer(run_id: &str, row_count: usize) -> String {
    format!(
        "### Answer\n\
         - The answer could not be written up. The {row_count} row(s) streamed above are the \
         query result.\n\n\
         **trace_id:** `{run_id}`\n"
    )
}

/// Answer sent when the caller cancelled the run.
pub fn cancelled_answer(run_id: &str) -> String {
    format!("### Answer\n- The run was cancelled before an answer was ready.\n\n**trace_id:** `{run_id}`\n")
}

/// Markdown for an in-scope but underspecified question.
pub fn clarification_answer(message: &str, questions: &[String]) -> String {
    if questions.is_empty() {
        return message.to_string();
    }
    let list = questions
        .iter()
        .map(|q| format!("- {q}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!("{message}\n\nCould you clarify:\n{list}")
}

/// Penalties for a result of `row_count` rows produced on attempt
/// `attempt_count` (1-based) under a `max_rows` cap.
pub fn confidence_hints(row_count: usize, max_rows: usize, attempt_count: u32) -> ConfidenceHints {
    ConfidenceHints {
        sample_penalty: if row_count >= max_rows { SAMPLE_PENALTY } else { 0.0 },
        retry_penalty: f64::from(attempt_count.saturating_sub(1)) * RETRY_PENALTY_PER_ATTEMPT,
        row_count,
    }
}
