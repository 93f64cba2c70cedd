// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for Quarry.
//!
//! TOML files in the XDG hierarchy plus `QUARRY_*` environment overrides,
//! strict key checking, post-load validation, and miette diagnostics with
//! typo suggestions.
//!
//! ```no_run
//! use quarry_config::load_and_validate;
//!
//! let config = load_and_validate().expect("config errors");
//! println!("max rows: {}", config.pipeline.max_rows);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

use std::path::Path;

pub use diagnostic::{render_errors, ConfigError};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::{
    AgentConfig, DatabaseConfig, GuardConfig, LlmConfig, MemoryConfig, PipelineConfig,
    QuarryConfig,
};

/// Loads configuration from the standard hierarchy and validates it.
pub fn load_and_validate() -> Result<QuarryConfig, Vec<ConfigError>> {
    match loader::load_config() {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => Err(diagnostic::figment_to_config_errors(
            err,
            &collect_toml_sources(),
        )),
    }
}

/// Loads one explicit file (plus env overrides) and validates it.
pub fn load_and_validate_path(path: &Path) -> Result<QuarryConfig, Vec<ConfigError>> {
    match loader::load_config_from_path(path) {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => {
            let sources = std::fs::read_to_string(path)
                .map(|content| vec![(path.display().to_string(), content)])
                .unwrap_or_default();
            Err(diagnostic::figment_to_config_errors(err, &sources))
        }
    }
}

/// Loads an inline TOML string and validates it.
pub fn load_and_validate_str(toml_content: &str) -> Result<QuarryConfig, Vec<ConfigError>> {
    match loader::load_config_from_str(toml_content) {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => {
            let sources = vec![("<inline>".to_string(), toml_content.to_string())];
            Err(diagnostic::figment_to_config_errors(err, &sources))
        }
    }
}

fn collect_toml_sources() -> Vec<(String, String)> {
    let mut candidates = vec![std::path::PathBuf::from("/etc/quarry/quarry.toml")];
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join("quarry/quarry.toml"));
    }
    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd.join("quarry.toml"));
    }

    candidates
        .into_iter()
        .filter_map(|path| {
            let content = std::fs::read_to_string(&path).ok()?;
            Some((path.display().to_string(), content))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_config_is_validated() {
        let errors = load_and_validate_str("[pipeline]\nmax_rows = 0\n").unwrap_err();
        assert!(matches!(&errors[0], ConfigError::Validation { message } if message.contains("max_rows")));
    }

    #[test]
    fn inline_config_with_typo_reports_unknown_key() {
        let errors = load_and_validate_str("[guard]\nmdoe = \"llm\"\n").unwrap_err();
        assert!(matches!(&errors[0], ConfigError::UnknownKey { key, .. } if key == "mdoe"));
    }

    #[test]
    fn valid_inline_config_loads() {
        let config = load_and_validate_str("[guard]\nmode = \"llm\"\n").unwrap();
        assert_eq!(config.guard.mode, "llm");
    }
}
