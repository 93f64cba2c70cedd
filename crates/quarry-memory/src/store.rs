// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-conversation message ring buffers behind one lock.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use quarry_config::MemoryConfig;
use quarry_core::{Message, QuarryError, Role};
use tracing::debug;

/// Bounded, process-lifetime conversation memory.
///
/// Each conversation keeps at most `max_messages` messages; appending to a
/// full conversation evicts the oldest one. Message content is hard-cut to
/// `max_chars_per_message` characters before it is stored. Nothing is
/// persisted: a restart forgets every conversation.
///
/// One instance is meant to be shared across runs (wrap it in an `Arc`).
/// All operations take a single coarse lock around the key map; none of them
/// holds it across an `.await`.
#[derive(Debug)]
pub struct ConversationMemory {
    max_messages: usize,
    max_chars_per_message: usize,
    default_key: String,
    conversations: Mutex<HashMap<String, VecDeque<Message>>>,
}

impl ConversationMemory {
    /// Creates an empty memory. Both bounds must be greater than zero.
    pub fn new(max_messages: usize, max_chars_per_message: usize) -> Result<Self, QuarryError> {
        Self::with_default_key(max_messages, max_chars_per_message, "default")
    }

    /// Like [`ConversationMemory::new`], with a custom key for blank ids.
    pub fn with_default_key(
        max_messages: usize,
        max_chars_per_message: usize,
        default_key: impl Into<String>,
    ) -> Result<Self, QuarryError> {
        if max_messages == 0 {
            return Err(QuarryError::Config(
                "memory max_messages must be greater than 0".into(),
            ));
        }
        if max_chars_per_message == 0 {
            return Err(QuarryError::Config(
                "memory max_chars_per_message must be greater than 0".into(),
            ));
        }
        let default_key = default_key.into();
        if default_key.trim().is_empty() {
            return Err(QuarryError::Config(
                "memory default conversation id must not be empty".into(),
            ));
        }
        Ok(Self {
            max_messages,
            max_chars_per_message,
            default_key: default_key.trim().to_string(),
            conversations: Mutex::new(HashMap::new()),
        })
    }

    pub fn from_config(config: &MemoryConfig) -> Result<Self, QuarryError> {
        Self::with_default_key(
            config.max_messages,
            config.max_chars_per_message,
            config.default_conversation_id.clone(),
        )
    }

    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    pub fn max_chars_per_message(&self) -> usize {
        self.max_chars_per_message
    }

    /// Messages of one conversation, oldest first.
    pub fn history(&self, key: &str) -> Vec<Message> {
        let key = self.normalize(key);
        self.lock()
            .get(key)
            .map(|ring| ring.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The last `max_items` messages as `role: content` lines, most recent
    /// last. Blank messages are skipped and each line is trimmed.
    pub fn history_for_prompt(&self, key: &str, max_items: usize) -> String {
        let history = self.history(key);
        let start = history.len().saturating_sub(max_items);
        history[start..]
            .iter()
            .filter(|m| !m.content.trim().is_empty())
            .map(|m| format!("{}: {}", m.role, m.content.trim()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Appends a message, truncating its content and evicting the oldest
    /// message when the conversation is full.
    pub fn append(&self, key: &str, role: Role, content: &str) {
        let key = self.normalize(key);
        let message = Message::new(role, truncate_chars(content, self.max_chars_per_message));

        let mut conversations = self.lock();
        let ring = conversations
            .entry(key.to_string())
            .or_insert_with(|| VecDeque::with_capacity(self.max_messages));
        if ring.len() == self.max_messages {
            ring.pop_front();
        }
        ring.push_back(message);
        debug!(conversation = key, size = ring.len(), %role, "memory append");
    }

    /// Forgets one conversation.
    pub fn clear(&self, key: &str) {
        let key = self.normalize(key);
        self.lock().remove(key);
    }

    /// Messages currently held for one conversation.
    pub fn size(&self, key: &str) -> usize {
        let key = self.normalize(key);
        self.lock().get(key).map_or(0, VecDeque::len)
    }

    /// Number of conversations with at least one message.
    pub fn conversation_count(&self) -> usize {
        self.lock().len()
    }

    fn normalize<'a>(&'a self, key: &'a str) -> &'a str {
        let trimmed = key.trim();
        if trimmed.is_empty() {
            &self.default_key
        } else {
            trimmed
        }
    }

    // A panic while holding the lock cannot leave a ring half-updated, so a
    // poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, VecDeque<Message>>> {
        self.conversations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Hard cut at `max` characters, never splitting a UTF-8 sequence.
pub(crate) fn truncate_chars(content: &str, max: usize) -> &str {
    match content.char_indices().nth(max) {
        Some((idx, _)) => &content[..idx],
        None => content,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn zero_bounds_fail_fast() {
        assert!(matches!(
            ConversationMemory::new(0, 10),
            Err(QuarryError::Config(_))
        ));
        assert!(matches!(
            ConversationMemory::new(10, 0),
            Err(QuarryError::Config(_))
        ));
    }

    #[test]
    fn evicts_oldest_first() {
        let memory = ConversationMemory::new(3, 100).unwrap();
        for i in 0..5 {
            memory.append("c1", Role::User, &format!("m{i}"));
        }
        let contents: Vec<_> = memory
            .history("c1")
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
        assert_eq!(memory.size("c1"), 3);
    }

    #[test]
    fn history_for_prompt_keeps_recent_lines() {
        let memory = ConversationMemory::new(10, 100).unwrap();
        memory.append("c", Role::User, "first");
        memory.append("c", Role::Assistant, "  ");
        memory.append("c", Role::User, " sales today? ");
        memory.append("c", Role::Assistant, "42 orders");
        assert_eq!(
            memory.history_for_prompt("c", 3),
            "user: sales today?\nassistant: 42 orders"
        );
        assert_eq!(memory.history_for_prompt("other", 3), "");
    }

    #[test]
    fn content_is_hard_cut() {
        let memory = ConversationMemory::new(5, 4).unwrap();
        memory.append("c", Role::Assistant, "abcdefgh");
        assert_eq!(memory.history("c")[0].content, "abcd");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("สวัสดี", 3), "สวั");
        assert_eq!(truncate_chars("ab", 10), "ab");
    }

    #[test]
    fn blank_keys_share_the_default_conversation() {
        let memory = ConversationMemory::new(5, 100).unwrap();
        memory.append("", Role::User, "one");
        memory.append("   ", Role::User, "two");
        assert_eq!(memory.size("default"), 2);
        assert_eq!(memory.conversation_count(), 1);
    }

    #[test]
    fn keys_are_trimmed() {
        let memory = ConversationMemory::new(5, 100).unwrap();
        memory.append(" abc ", Role::User, "x");
        assert_eq!(memory.size("abc"), 1);
    }

    #[test]
    fn clear_forgets_only_that_conversation() {
        let memory = ConversationMemory::new(5, 100).unwrap();
        memory.append("a", Role::User, "x");
        memory.append("b", Role::User, "y");
        memory.clear("a");
        assert_eq!(memory.size("a"), 0);
        assert!(memory.history("a").is_empty());
        assert_eq!(memory.size("b"), 1);
    }

    #[test]
    fn concurrent_appends_respect_capacity() {
        let memory = std::sync::Arc::new(ConversationMemory::new(10, 100).unwrap());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let memory = memory.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        memory.append("shared", Role::User, &format!("{t}-{i}"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(memory.size("shared"), 10);
    }

    proptest! {
        #[test]
        fn size_never_exceeds_capacity(
            cap in 1usize..8,
            appends in proptest::collection::vec("[a-z]{0,20}", 0..40),
        ) {
            let memory = ConversationMemory::new(cap, 1000).unwrap();
            for (i, content) in appends.iter().enumerate() {
                memory.append("k", Role::User, content);
                prop_assert!(memory.size("k") <= cap);
                prop_assert_eq!(memory.size("k"), (i + 1).min(cap));
            }
            let expected: Vec<String> = appends
                .iter()
                .skip(appends.len().saturating_sub(cap))
                .cloned()
                .collect();
            let held: Vec<String> = memory.history("k").into_iter().map(|m| m.content).collect();
            prop_assert_eq!(held, expected);
        }

        #[test]
        fn stored_content_never_exceeds_char_cap(cap in 1usize..50, content in "\\PC{0,120}") {
            let memory = ConversationMemory::new(2, cap).unwrap();
            memory.append("k", Role::User, &content);
            let stored = &memory.history("k")[0].content;
            prop_assert!(stored.chars().count() <= cap);
            prop_assert!(content.starts_with(stored.as_str()));
        }
    }
}
