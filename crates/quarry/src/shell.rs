// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `quarry shell` command implementation.
//!
//! Interactive REPL with colored prompt, streaming output and readline
//! history. One conversation per invocation, so follow-up questions see the
//! earlier turns.

use colored::Colorize;
use quarry_core::QuarryError;
use quarry_pipeline::Pipeline;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::info;

use crate::ask::stream_run;

/// History lines shown by `/history`.
const HISTORY_LINES: usize = 10;

/// A parsed REPL line.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Quit,
    Clear,
    History,
    Help,
    Unknown(&'a str),
    Question(&'a str),
    Empty,
}

fn parse_input(line: &str) -> Input<'_> {
    let trimmed = line.trim();
    match trimmed {
        "" => Input::Empty,
        "/quit" | "/exit" => Input::Quit,
        "/clear" => Input::Clear,
        "/history" => Input::History,
        "/help" => Input::Help,
        cmd if cmd.starts_with('/') => Input::Unknown(cmd),
        question => Input::Question(question),
    }
}

/// Runs the `quarry shell` interactive REPL.
pub async fn run_shell(pipeline: &Pipeline) -> Result<(), QuarryError> {
    let conversation = uuid::Uuid::new_v4().to_string();
    info!(%conversation, "shell session started");

    let mut rl = DefaultEditor::new()
        .map_err(|e| QuarryError::Internal(format!("failed to initialize readline: {e}")))?;

    println!("{}", "quarry shell".bold().green());
    println!(
        "Ask about your data. {} resets the conversation, {} exits.\n",
        "/clear".yellow(),
        "/quit".yellow()
    );

    let prompt = format!("{}> ", "quarry".green());
    loop {
        match rl.readline(&prompt) {
            Ok(line) => match parse_input(&line) {
                Input::Empty => continue,
                Input::Quit => break,
                Input::Clear => {
                    pipeline.memory().clear(&conversation);
                    println!("{}", "conversation cleared".dimmed());
                }
                Input::History => {
                    let history = pipeline
                        .memory()
                        .history_for_prompt(&conversation, HISTORY_LINES);
                    if history.is_empty() {
                        println!("{}", "(no history yet)".dimmed());
                    } else {
                        println!("{history}");
                    }
                }
                Input::Help => {
                    println!("/clear    forget this conversation");
                    println!("/history  show recent turns");
                    println!("/quit     leave the shell");
                }
                Input::Unknown(cmd) => {
                    eprintln!("{}: unknown command {cmd} (try /help)", "error".red());
                }
                Input::Question(question) => {
                    let _ = rl.add_history_entry(question);
                    let run = pipeline.run(question, Some(&conversation));
                    stream_run(run, false).await;
                    println!();
                }
            },
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("{}: {e}", "error".red());
                break;
            }
        }
    }

    info!(%conversation, "shell session ended");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_are_recognized() {
        assert_eq!(parse_input("  /quit "), Input::Quit);
        assert_eq!(parse_input("/exit"), Input::Quit);
        assert_eq!(parse_input("/clear"), Input::Clear);
        assert_eq!(parse_input("/history"), Input::History);
        assert_eq!(parse_input("/tables"), Input::Unknown("/tables"));
        assert_eq!(parse_input("   "), Input::Empty);
        assert_eq!(
            parse_input(" orders today "),
            Input::Question("orders today")
        );
    }
}
