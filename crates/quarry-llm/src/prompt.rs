// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prompt helpers shared by the chat collaborators.

use std::sync::LazyLock;

use quarry_core::{Message, Role};
use regex::Regex;
use serde::Serialize;

/// History items included in a prompt.
pub const HISTORY_ITEMS: usize = 10;

/// Per-item character cap for history included in a prompt.
pub const HISTORY_ITEM_CHARS: usize = 500;

static LEADING_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^```(?:json)?\s*").expect("leading fence regex must compile")
});

static TRAILING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*```$").expect("trailing fence regex must compile"));

static JSON_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[\s\S]*\}").expect("json object regex must compile"));

/// Pulls a JSON object out of a completion: the whole text, then the text
/// without markdown fences, then the outermost `{ ... }` span.
pub fn extract_json_object(text: &str) -> Option<serde_json::Map<String, serde_json::Value>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let unfenced = TRAILING_FENCE.replace(&LEADING_FENCE.replace(text, ""), "").into_owned();

    let parse = |candidate: &str| match serde_json::from_str::<serde_json::Value>(candidate) {
        Ok(serde_json::Value::Object(map)) => Some(map),
        _ => None,
    };

    parse(text)
        .or_else(|| parse(&unfenced))
        .or_else(|| JSON_OBJECT.find(&unfenced).and_then(|m| parse(m.as_str())))
}

/// Trims `text` and cuts it to `max_chars` characters, marking the cut with `…`.
pub fn clip(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}

/// A history item as it appears in a JSON payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryItem {
    pub role: Role,
    pub content: String,
}

/// The last [`HISTORY_ITEMS`] non-empty messages, clipped.
pub fn compact_history(history: &[Message]) -> Vec<HistoryItem> {
    let start = history.len().saturating_sub(HISTORY_ITEMS);
    history[start..]
        .iter()
        .filter(|m| !m.content.trim().is_empty())
        .map(|m| HistoryItem {
            role: m.role,
            content: clip(&m.content, HISTORY_ITEM_CHARS),
        })
        .collect()
}

/// History rendered as `- User: ...` lines, most recent last.
pub fn history_lines(history: &[Message]) -> String {
    compact_history(history)
        .into_iter()
        .map(|item| {
            let label = match item.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
                Role::System => "System",
            };
            format!("- {label}: {}", item.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
