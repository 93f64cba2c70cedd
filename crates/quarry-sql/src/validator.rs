// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read-only statement validation.
//!
//! The checks run in a fixed order and are pure functions of the input text
//! and dialect:
//!
//! 1. reject blank input
//! 2. normalize: strip a code fence, drop everything before the first
//!    `SELECT`, keep exactly one `;`-terminated statement
//! 3. reject unless the normalized text starts with `SELECT`
//! 4. reject any data-modifying or schema-altering keyword, anywhere
//! 5. parse in the target dialect; a parse error is a rejection
//!
//! Step 4 is a blunt whole-word match that runs before and independently of
//! the parser.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use sqlparser::ast::Statement;
use sqlparser::dialect::{
    AnsiDialect, Dialect, GenericDialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect,
};
use sqlparser::parser::Parser;
use strum::{Display, EnumString};

/// The read-only query keyword every accepted statement starts with.
pub const READ_ONLY_KEYWORD: &str = "SELECT";

/// Keywords rejected anywhere in a statement.
pub const FORBIDDEN_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "TRUNCATE", "CREATE", "GRANT", "REVOKE",
];

/// Extra keywords rejected when the target is SQLite.
pub const SQLITE_FORBIDDEN_KEYWORDS: &[&str] =
    &["REPLACE", "MERGE", "ATTACH", "DETACH", "PRAGMA", "VACUUM"];

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)```(?:sql|json)?\s*([\s\S]*?)```").expect("code fence regex is valid")
});

static FORBIDDEN: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(r"(?i)\b({})\b", FORBIDDEN_KEYWORDS.join("|"));
    Regex::new(&pattern).expect("forbidden keyword regex is valid")
});

static SQLITE_FORBIDDEN: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(r"(?i)\b({})\b", SQLITE_FORBIDDEN_KEYWORDS.join("|"));
    Regex::new(&pattern).expect("sqlite keyword regex is valid")
});

/// SQL dialects the parser step understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SqlDialect {
    Sqlite,
    Mysql,
    Postgres,
    Generic,
    Ansi,
}

impl SqlDialect {
    fn parser_dialect(self) -> Box<dyn Dialect> {
        match self {
            SqlDialect::Sqlite => Box::new(SQLiteDialect {}),
            SqlDialect::Mysql => Box::new(MySqlDialect {}),
            SqlDialect::Postgres => Box::new(PostgreSqlDialect {}),
            SqlDialect::Generic => Box::new(GenericDialect {}),
            SqlDialect::Ansi => Box::new(AnsiDialect {}),
        }
    }
}

/// Outcome of [`QueryValidator::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    /// Safe to execute. `statement` is the normalized single statement.
    Accepted { statement: String },
    Rejected { reason: String },
}

impl Validation {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Validation::Accepted { .. })
    }

    /// The `(ok, reason)` view: `reason` is `"ok"` on acceptance.
    pub fn reason(&self) -> &str {
        match self {
            Validation::Accepted { .. } => "ok",
            Validation::Rejected { reason } => reason,
        }
    }

    fn reject(reason: impl Into<String>) -> Self {
        Validation::Rejected {
            reason: reason.into(),
        }
    }
}

/// Validator bound to one dialect.
#[derive(Debug, Clone, Copy)]
pub struct QueryValidator {
    dialect: SqlDialect,
}

impl QueryValidator {
    pub fn new(dialect: SqlDialect) -> Self {
        Self { dialect }
    }

    /// Builds a validator from a configured dialect name.
    pub fn for_dialect(name: &str) -> Option<Self> {
        SqlDialect::from_str(name.trim()).ok().map(Self::new)
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    /// Runs every check. Never panics on arbitrary input.
    pub fn validate(&self, statement: &str) -> Validation {
        if statement.trim().is_empty() {
            return Validation::reject("SQL is empty.");
        }

        let normalized = normalize(statement);
        if !starts_with_ignore_case(&normalized, READ_ONLY_KEYWORD) {
            return Validation::reject("SQL must start with SELECT.");
        }

        let found = FORBIDDEN.find(&normalized).or_else(|| match self.dialect {
            SqlDialect::Sqlite => SQLITE_FORBIDDEN.find(&normalized),
            _ => None,
        });
        if let Some(found) = found {
            return Validation::reject(format!(
                "Only SELECT is allowed (found `{}`).",
                found.as_str().to_ascii_uppercase()
            ));
        }

        let dialect = self.dialect.parser_dialect();
        match Parser::parse_sql(dialect.as_ref(), &normalized) {
            Ok(statements) => match statements.as_slice() {
                [Statement::Query(_)] => Validation::Accepted {
                    statement: normalized,
                },
                [_] => Validation::reject("SQL is not a read-only query."),
                [] => Validation::reject("SQL parse produced no statement."),
                _ => Validation::reject("SQL must contain exactly one statement."),
            },
            Err(e) => Validation::reject(format!("SQL parse error: {e}")),
        }
    }
}

impl Default for QueryValidator {
    fn default() -> Self {
        Self::new(SqlDialect::Sqlite)
    }
}

/// Reduces model output to one `;`-terminated statement.
///
/// Idempotent: normalizing an already-normalized statement returns it
/// unchanged.
pub fn normalize(statement: &str) -> String {
    let mut text = statement.trim();
    if let Some(inner) = CODE_FENCE.captures(text).and_then(|c| c.get(1)) {
        text = inner.as_str().trim();
    }

    if let Some(idx) = find_ignore_case(text, READ_ONLY_KEYWORD) {
        text = text[idx..].trim();
    }

    match text.split_once(';') {
        Some((first, _)) => format!("{};", first.trim()),
        None => format!("{};", text.trim_end()),
    }
}

fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    text.trim_start()
        .as_bytes()
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix.as_bytes()))
}

/// Byte index of the first ASCII-case-insensitive occurrence of `needle`.
fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    let needle = needle.as_bytes();
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sqlite() -> QueryValidator {
        QueryValidator::new(SqlDialect::Sqlite)
    }

    #[test]
    fn accepts_plain_select() {
        let v = sqlite().validate("SELECT id, total FROM orders WHERE total > 10");
        assert_eq!(
            v,
            Validation::Accepted {
                statement: "SELECT id, total FROM orders WHERE total > 10;".into()
            }
        );
        assert_eq!(v.reason(), "ok");
    }

    #[test]
    fn rejects_blank_input() {
        let v = sqlite().validate("   \n");
        assert!(!v.is_accepted());
        assert_eq!(v.reason(), "SQL is empty.");
    }

    #[test]
    fn sqlite_rejects_engine_commands() {
        let v = sqlite().validate("SELECT * FROM orders; PRAGMA writable_schema");
        assert!(v.is_accepted());

        let v = sqlite().validate("SELECT name FROM pragma_table_info('orders')");
        assert!(v.is_accepted());

        let v = sqlite().validate("SELECT 1 FROM orders WHERE EXISTS (SELECT 1) ATTACH");
        assert!(v.reason().contains("ATTACH"));

        let postgres = QueryValidator::new(SqlDialect::Postgres);
        let v = postgres.validate("SELECT replace(name, 'a', 'b') FROM branches");
        assert!(v.is_accepted());
        assert!(!sqlite().validate("SELECT replace(name, 'a', 'b') FROM branches").is_accepted());
    }

    #[test]
    fn strips_fence_and_preamble() {
        let raw = "Here you go:\n```sql\nselect count(*) from orders;\n```";
        assert_eq!(normalize(raw), "select count(*) from orders;");
        assert!(sqlite().validate(raw).is_accepted());
    }

    #[test]
    fn keeps_only_the_first_statement() {
        let v = sqlite().validate("SELECT 1; DROP TABLE orders;");
        assert_eq!(
            v,
            Validation::Accepted {
                statement: "SELECT 1;".into()
            }
        );
    }

    #[test]
    fn rejects_statements_without_select() {
        let v = sqlite().validate("DELETE FROM orders");
        assert_eq!(v.reason(), "SQL must start with SELECT.");
    }

    #[test]
    fn rejects_forbidden_keywords_anywhere() {
        let v = sqlite().validate("SELECT * FROM orders WHERE note = 'please delete me'");
        assert!(!v.is_accepted());
        assert!(v.reason().contains("DELETE"));
    }

    #[test]
    fn keyword_match_is_whole_word() {
        let v = sqlite().validate("SELECT created_at, updated_by FROM orders");
        assert!(v.is_accepted(), "{}", v.reason());
    }

    #[test]
    fn parse_errors_are_rejections() {
        let v = sqlite().validate("SELECT id FROM orders WHERE");
        assert!(v.reason().starts_with("SQL parse error"));
    }

    #[test]
    fn dialect_names_parse_case_insensitively() {
        assert_eq!(
            QueryValidator::for_dialect("MySQL").map(|v| v.dialect()),
            Some(SqlDialect::Mysql)
        );
        assert!(QueryValidator::for_dialect("oracle").is_none());
    }

    #[test]
    fn mysql_dialect_accepts_backticks() {
        let v = QueryValidator::new(SqlDialect::Mysql).validate("SELECT `total` FROM `orders`");
        assert!(v.is_accepted(), "{}", v.reason());
    }

    proptest! {
        #[test]
        fn validate_never_panics(input in "\\PC{0,200}") {
            let _ = sqlite().validate(&input);
        }

        #[test]
        fn normalize_is_idempotent(input in "\\PC{0,200}") {
            let once = normalize(&input);
            prop_assert_eq!(normalize(&once), once);
        }

        #[test]
        fn accepted_statements_are_single_and_terminated(
            cols in "[a-z]{1,8}(, [a-z]{1,8}){0,3}",
            table in "[a-z]{1,10}",
        ) {
            let sql = format!("SELECT {cols} FROM t_{table}");
            if let Validation::Accepted { statement } = sqlite().validate(&sql) {
                prop_assert!(statement.ends_with(';'));
                prop_assert_eq!(statement.matches(';').count(), 1);
                prop_assert!(statement.to_ascii_uppercase().starts_with("SELECT"));
            }
        }
    }
}
