// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading with Figment.
//!
//! Merge order, later wins: compiled defaults, `/etc/quarry/quarry.toml`,
//! `~/.config/quarry/quarry.toml`, `./quarry.toml`, then `QUARRY_*`
//! environment variables.

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::QuarryConfig;

/// Sections recognized in `QUARRY_<SECTION>_<KEY>` environment variables.
const ENV_SECTIONS: &[&str] = &["agent", "pipeline", "memory", "database", "llm", "guard"];

/// Loads configuration from the standard hierarchy with env var overrides.
pub fn load_config() -> Result<QuarryConfig, figment::Error> {
    build_figment().extract()
}

/// Loads configuration from an inline TOML string over the defaults.
/// No files or environment variables are consulted.
pub fn load_config_from_str(toml_content: &str) -> Result<QuarryConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(QuarryConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Loads configuration from one explicit file, then env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<QuarryConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(QuarryConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The full layered Figment, before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(QuarryConfig::default()))
        .merge(Toml::file("/etc/quarry/quarry.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("quarry/quarry.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("quarry.toml"))
        .merge(env_provider())
}

/// Maps `QUARRY_PIPELINE_MAX_ROWS` to `pipeline.max_rows`.
///
/// Only the first underscore after the section name is turned into a dot, so
/// keys that contain underscores survive intact.
fn env_provider() -> Env {
    Env::prefixed("QUARRY_").map(|key| env_key_to_path(key.as_str()).into())
}

pub(crate) fn env_key_to_path(key: &str) -> String {
    for section in ENV_SECTIONS {
        if let Some(rest) = key.strip_prefix(section).and_then(|r| r.strip_prefix('_')) {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn env_keys_map_to_sections() {
        assert_eq!(env_key_to_path("pipeline_max_rows"), "pipeline.max_rows");
        assert_eq!(
            env_key_to_path("memory_max_chars_per_message"),
            "memory.max_chars_per_message"
        );
        assert_eq!(env_key_to_path("llm_api_key"), "llm.api_key");
        assert_eq!(env_key_to_path("unknown_thing"), "unknown_thing");
    }

    #[test]
    fn inline_toml_overrides_defaults() {
        let config = load_config_from_str(
            r#"
            [pipeline]
            max_retries = 4

            [database]
            path = "/tmp/sales.db"
            "#,
        )
        .unwrap();
        assert_eq!(config.pipeline.max_retries, 4);
        assert_eq!(config.database.path, "/tmp/sales.db");
        assert_eq!(config.pipeline.chunk_size, 50);
    }

    #[test]
    fn explicit_file_is_loaded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[memory]\nmax_messages = 4").unwrap();
        let config = load_config_from_path(file.path()).unwrap();
        assert_eq!(config.memory.max_messages, 4);
    }

    #[test]
    fn misspelled_key_fails_extraction() {
        let err = load_config_from_str("[memory]\nmax_mesages = 4\n").unwrap_err();
        assert!(err.to_string().contains("max_mesages"));
    }
}
