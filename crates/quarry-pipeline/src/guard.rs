// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Keyword domain gate.
//!
//! Zero-latency heuristic: a question is in scope when it mentions at least
//! one domain keyword. Short English words that are common outside the domain
//! only match as whole words; everything else (including Thai, which has no
//! word separators) matches as a substring.

use async_trait::async_trait;
use quarry_config::GuardConfig;
use quarry_core::{DomainGuard, GuardDecision};
use tracing::debug;

/// Default in-scope keyword groups.
pub const KEYWORD_GROUPS: &[&[&str]] = &[
    // orders
    &[
        "order", "orders", "purchase", "purchases", "cancel", "cancelled", "refund", "delivery",
        "shipping", "คำสั่งซื้อ", "ออเดอร์", "รายการสั่งซื้อ", "ยอดสั่งซื้อ", "คืนเงิน", "จัดส่ง",
    ],
    // branches
    &[
        "branch", "branches", "store", "stores", "location", "สาขา", "หน้าร้าน", "ร้าน",
    ],
    // sales and revenue
    &[
        "sale", "sales", "revenue", "income", "turnover", "gmv", "aov", "gross", "top",
        "best seller", "bestseller", "ยอดขาย", "รายได้", "รายรับ", "ยอดรวม", "กำไร", "อันดับ",
    ],
    // time filters
    &[
        "today", "yesterday", "this week", "last week", "this month", "last month", "this year",
        "last year", "date", "time", "range", "between", "วันนี้", "เมื่อวาน", "สัปดาห์นี้",
        "เดือนนี้", "ปีนี้", "ช่วง", "ระหว่าง", "วันที่",
    ],
];

/// Keywords that only match as whole words.
pub const STRICT_WORDS: &[&str] = &["top", "date", "time", "range", "gross"];

/// Topics that are clearly out of scope unless a domain keyword also matched.
/// A hit names the topic as unsupported in the redirect.
pub const OUT_OF_SCOPE_MARKERS: &[&str] = &[
    "write code", "python", "javascript", "react", "politics", "election", "news", "stock price",
    "bitcoin", "btc", "translate", "poem", "novel", "recipe", "travel", "weather",
    "เขียนโค้ด", "การเมือง", "ข่าว", "หุ้น", "แปลภาษา", "แต่งกลอน", "สูตรอาหาร", "ท่องเที่ยว",
];

/// Words that make an in-scope question too open-ended to query as asked.
pub const VAGUE_MARKERS: &[&str] = &[
    "latest", "recent", "everything", "all data", "summary", "overview", "report", "ล่าสุด",
    "ช่วงนี้", "ทั้งหมด", "สรุป",
];

/// Any of these counts as a time constraint.
pub const TIME_HINTS: &[&str] = &[
    "today", "yesterday", "week", "month", "year", "since", "between", "from", "until", "date",
    "วันนี้", "เมื่อวาน", "สัปดาห์", "เดือน", "ปี", "ตั้งแต่", "ถึง", "ระหว่าง",
];

/// Heuristic [`DomainGuard`] over static keyword tables.
#[derive(Debug, Clone)]
pub struct KeywordGuard {
    keywords: Vec<String>,
}

impl Default for KeywordGuard {
    fn default() -> Self {
        Self::new(Vec::<String>::new())
    }
}

impl KeywordGuard {
    /// Default keyword groups plus `extra` keywords.
    pub fn new(extra: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let mut keywords: Vec<String> = KEYWORD_GROUPS
            .iter()
            .flat_map(|group| group.iter().map(|kw| kw.to_string()))
            .collect();
        keywords.extend(
            extra
                .into_iter()
                .map(|kw| normalize(&kw.into()))
                .filter(|kw| !kw.is_empty()),
        );
        Self { keywords }
    }

    pub fn from_config(config: &GuardConfig) -> Self {
        Self::new(config.keywords.iter().cloned())
    }

    /// Domain keywords found in `question`, sorted and deduplicated.
    pub fn matched_keywords(&self, question: &str) -> Vec<String> {
        let q = normalize(question);
        let mut matched: Vec<String> = self
            .keywords
            .iter()
            .filter(|kw| matches_keyword(&q, kw))
            .cloned()
            .collect();
        matched.sort();
        matched.dedup();
        matched
    }

    /// The synchronous decision behind [`DomainGuard::check`].
    pub fn decide(&self, question: &str) -> GuardDecision {
        let q = normalize(question);
        let matched = self.matched_keywords(&q);

        if matched.is_empty() {
            let off_topic = OUT_OF_SCOPE_MARKERS.iter().find(|m| q.contains(*m)).copied();
            debug!(?off_topic, "no domain keyword matched");
            return GuardDecision::Deny {
                message: redirect_message(off_topic),
            };
        }

        let vague = VAGUE_MARKERS.iter().any(|m| q.contains(m));
        let has_time = TIME_HINTS.iter().any(|t| q.contains(t));
        if vague && !has_time {
            return GuardDecision::Ask {
                message: "The question is in scope but needs more detail to query accurately."
                    .into(),
                questions: vec![
                    "Which time range do you mean (e.g. today, this week, this month, or exact dates)?"
                        .into(),
                    "Which branch or store, and which metric (orders, sales, revenue)?".into(),
                ],
            };
        }

        GuardDecision::Allow { matched }
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn matches_keyword(q: &str, kw: &str) -> bool {
    if STRICT_WORDS.contains(&kw) {
        contains_word(q, kw)
    } else {
        q.contains(kw)
    }
}

/// True when `word` occurs in `text` with no alphanumeric neighbour.
fn contains_word(text: &str, word: &str) -> bool {
    text.match_indices(word).any(|(start, _)| {
        let before = text[..start].chars().next_back();
        let after = text[start + word.len()..].chars().next();
        !before.is_some_and(|c| c.is_alphanumeric() || c == '_')
            && !after.is_some_and(|c| c.is_alphanumeric() || c == '_')
    })
}

fn redirect_message(off_topic: Option<&str>) -> String {
    let lead = match off_topic {
        Some(topic) => {
            format!("Questions about **{topic}** are not something I can answer from this database.\n")
        }
        None => "I couldn't tell how that question relates to the data.\n".to_string(),
    };
    format!(
        "{lead}Only questions about **orders / branches / sales and revenue** are supported right now.\n\
         Try asking, for example:\n\
         - Total sales this month by branch\n\
         - Number of orders today per branch\n\
         - Top 5 branches by revenue over the last 30 days\n"
    )
}

#[async_trait]
impl DomainGuard for KeywordGuard {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn check(&self, question: &str) -> GuardDecision {
        self.decide(question)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_questions_are_allowed_with_matches() {
        let guard = KeywordGuard::default();
        match guard.decide("Total   SALES per branch this month") {
            GuardDecision::Allow { matched } => {
                assert!(matched.contains(&"sales".to_string()));
                assert!(matched.contains(&"branch".to_string()));
                assert!(matched.contains(&"this month".to_string()));
            }
            other => panic!("expected allow, got {other:?}"),
        }
    }

    #[test]
    fn strict_words_need_word_boundaries() {
        let guard = KeywordGuard::default();
        assert!(guard.matched_keywords("stop the timer").is_empty());
        assert_eq!(guard.matched_keywords("top sellers"), vec!["top"]);
        assert!(contains_word("date.", "date"));
        assert!(!contains_word("update", "date"));
    }

    #[test]
    fn thai_keywords_match_as_substrings() {
        let guard = KeywordGuard::default();
        assert!(matches!(
            guard.decide("ยอดขายรวมเดือนนี้แยกตามสาขา"),
            GuardDecision::Allow { .. }
        ));
    }

    #[test]
    fn off_topic_questions_are_denied() {
        let guard = KeywordGuard::default();
        for q in ["write code in python", "what's the weather", "hello there"] {
            match guard.decide(q) {
                GuardDecision::Deny { message } => assert!(message.contains("orders / branches")),
                other => panic!("{q}: expected deny, got {other:?}"),
            }
        }
    }

    #[test]
    fn off_topic_markers_name_the_topic() {
        let guard = KeywordGuard::default();
        let GuardDecision::Deny { message } = guard.decide("what's the weather tomorrow") else {
            panic!("expected deny");
        };
        assert!(message.starts_with("Questions about **weather**"));

        let GuardDecision::Deny { message } = guard.decide("hello there") else {
            panic!("expected deny");
        };
        assert!(message.starts_with("I couldn't tell"));
        assert!(!message.contains("**weather**"));
    }

    #[test]
    fn vague_questions_without_time_ask() {
        let guard = KeywordGuard::default();
        match guard.decide("latest orders") {
            GuardDecision::Ask { questions, .. } => assert_eq!(questions.len(), 2),
            other => panic!("expected ask, got {other:?}"),
        }
        assert!(matches!(
            guard.decide("summary of sales this month"),
            GuardDecision::Allow { .. }
        ));
    }

    #[test]
    fn configured_keywords_extend_the_defaults() {
        let guard = KeywordGuard::new(["  Inventory "]);
        assert_eq!(guard.matched_keywords("inventory levels"), vec!["inventory"]);
        let config = GuardConfig {
            keywords: vec!["warehouse".into()],
            ..GuardConfig::default()
        };
        assert!(matches!(
            KeywordGuard::from_config(&config).decide("warehouse stock counts"),
            GuardDecision::Allow { .. }
        ));
    }

    #[tokio::test]
    async fn check_matches_decide() {
        let guard = KeywordGuard::default();
        assert_eq!(
            guard.check("orders today").await,
            guard.decide("orders today")
        );
    }
}
