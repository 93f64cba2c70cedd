// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Terminal rendering of pipeline events.

use colored::Colorize;
use quarry_core::{PipelineEvent, RunStatus, StepStatus};

/// Rows previewed per chunk.
const PREVIEW_ROWS: usize = 5;

/// Human-readable rendering of one event, without a trailing newline.
pub fn format_event(event: &PipelineEvent) -> String {
    match event {
        PipelineEvent::Step(step) => {
            let label = format!("[{}]", step.stage);
            match step.status {
                Some(StepStatus::Ok) => format!("{} {}", label.green(), step.message),
                Some(StepStatus::Retry) | Some(StepStatus::Fallback) => {
                    format!("{} {}", label.yellow(), step.message.yellow())
                }
                None => format!("{} {}", label.dimmed(), step.message.dimmed()),
            }
        }
        PipelineEvent::Sql(sql) => {
            let mut out = format!("{} {}", "sql:".cyan(), sql.sql);
            if !sql.params.is_empty() {
                let params = serde_json::Value::Object(sql.params.clone());
                out.push_str(&format!("\n{} {params}", "params:".cyan()));
            }
            out
        }
        PipelineEvent::Rows(rows) => {
            let chunk = &rows.chunk;
            let mut out = format!(
                "{}",
                format!(
                    "rows: +{} (total {}, chunk {}, {} ms)",
                    chunk.row_count, chunk.rows_sent_total, chunk.chunk_index, chunk.elapsed_ms
                )
                .dimmed()
            );
            if chunk.chunk_index == 0 {
                for row in chunk.rows.iter().take(PREVIEW_ROWS) {
                    let cells: Vec<String> = chunk
                        .columns
                        .iter()
                        .map(|c| row.get(c).map_or_else(String::new, cell_text))
                        .collect();
                    out.push_str(&format!("\n  {}", cells.join(" | ")));
                }
            }
            out
        }
        PipelineEvent::Error(error) => {
            let suffix = if error.retryable { " (retrying)" } else { "" };
            format!(
                "{} [{}] {}{}",
                "error".red(),
                error.error_code,
                error.message,
                suffix
            )
        }
        PipelineEvent::Answer(answer) => format!("\n{}", answer.markdown.trim_end()),
        PipelineEvent::Done(done) => {
            let status = match done.status {
                RunStatus::Success => done.status.to_string().green(),
                RunStatus::NeedsInput => done.status.to_string().yellow(),
                RunStatus::Fail => done.status.to_string().red(),
            };
            format!("{} {} {}", "done:".dimmed(), status, done.trace_id.dimmed())
        }
    }
}

fn cell_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "NULL".to_string(),
        other => other.to_string(),
    }
}
