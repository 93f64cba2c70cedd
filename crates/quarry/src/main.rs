// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Quarry - ask questions about a SQL database in natural language.
//!
//! This is the binary entry point.

mod ask;
mod render;
mod shell;
mod wiring;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;
use quarry_config::QuarryConfig;

/// Quarry - ask questions about a SQL database in natural language.
#[derive(Parser, Debug)]
#[command(name = "quarry", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the default locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Answer one question and exit.
    Ask {
        question: String,
        /// Continue an existing conversation.
        #[arg(long)]
        conversation: Option<String>,
        /// Print events as Server-Sent Events frames.
        #[arg(long)]
        json: bool,
    },
    /// Launch an interactive REPL session.
    Shell,
    /// Print the effective configuration.
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => quarry_config::load_and_validate_path(path),
        None => quarry_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            quarry_config::render_errors(&errors);
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config.agent.log_level);

    if let Commands::Config = cli.command {
        return match effective_config_toml(&config) {
            Ok(text) => {
                print!("{text}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{}: {e}", "error".red());
                ExitCode::FAILURE
            }
        };
    }

    let pipeline = match wiring::build_pipeline(&config).await {
        Ok(pipeline) => pipeline,
        Err(e) => {
            eprintln!("{}: {e}", "error".red());
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Ask {
            question,
            conversation,
            json,
        } => {
            let status = ask::run_ask(&pipeline, &question, conversation.as_deref(), json).await;
            ask::exit_code(status)
        }
        Commands::Shell => match shell::run_shell(&pipeline).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("{}: {e}", "error".red());
                ExitCode::FAILURE
            }
        },
        Commands::Config => ExitCode::SUCCESS,
    }
}

/// The loaded configuration as TOML, with the API key redacted.
fn effective_config_toml(config: &QuarryConfig) -> Result<String, toml::ser::Error> {
    let mut shown = config.clone();
    if shown.llm.api_key.is_some() {
        shown.llm.api_key = Some("<redacted>".to_string());
    }
    toml::to_string_pretty(&shown)
}

/// Logs go to stderr so `ask --json` output stays machine-readable.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("quarry={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_loads_config_defaults() {
        let config = quarry_config::load_and_validate()
            .expect("default config should be valid");
        assert_eq!(config.agent.name, "quarry");
    }

    #[test]
    fn ask_parses_flags() {
        let cli = Cli::try_parse_from([
            "quarry",
            "ask",
            "orders today",
            "--conversation",
            "c1",
            "--json",
        ])
        .unwrap();
        match cli.command {
            Commands::Ask {
                question,
                conversation,
                json,
            } => {
                assert_eq!(question, "orders today");
                assert_eq!(conversation.as_deref(), Some("c1"));
                assert!(json);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn config_output_redacts_the_api_key() {
        let mut config = QuarryConfig::default();
        config.llm.api_key = Some("sk-secret".into());
        let text = effective_config_toml(&config).unwrap();
        assert!(!text.contains("sk-secret"));
        assert!(text.contains("<redacted>"));
        assert!(text.contains("[pipeline]"));
    }
}
