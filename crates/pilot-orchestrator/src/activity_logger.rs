//! Activity Logger - Human-readable command log in `.pilot/activity.md`
//!
//! Every command appends a section with:
//! - The command as typed and the goal it expanded to
//! - One entry per executed action with its outcome
//! - A closing summary with the terminal state and diagnostic

use crate::loop_engine::LoopReport;
use chrono::Utc;
use pilot_core::fail_open::fail_open;
use pilot_core::{ActionOutcome, Result};
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

/// Maximum character length for an action summary in the log
const ACTIVITY_LOG_PREVIEW_CHARS: usize = 300;

/// Append-only activity logger shared by all commands in a project
#[derive(Debug, Clone)]
pub struct ActivityLogger {
    output_path: PathBuf,
}

impl ActivityLogger {
    /// Log into `activity.md` inside `pilot_dir`
    pub fn new(pilot_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_path: pilot_dir.into().join("activity.md"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.output_path
    }

    /// Log the start of a command
    ///
    /// This operation is fail-open - logging failures won't affect the command
    pub async fn log_command_start(&self, run_id: &str, command: &str, goal: &str, max_steps: usize) {
        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");

        let mut content = format!(
            "## Command: {}\n**Run**: {}\n**Started**: {}\n**Max Steps**: {}\n",
            first_line(command),
            run_id,
            timestamp,
            max_steps
        );
        if goal != command {
            content.push_str(&format!("**Expands To**: {}\n", first_line(goal)));
        }
        content.push('\n');

        fail_open("activity_logger::log_command_start", self.append_internal(content)).await;
    }

    /// Log one executed action
    ///
    /// This operation is fail-open - logging failures won't affect the command
    pub async fn log_step(&self, outcome: &ActionOutcome) {
        let status = if outcome.succeeded { "✓" } else { "✗" };

        let mut content = format!(
            "### Step {} {}\n**Action**: {}\n",
            outcome.attempted_at,
            status,
            preview(&outcome.action.summary())
        );
        if let Some(error) = &outcome.error {
            content.push_str(&format!("**Error**: {}\n", preview(error)));
        }
        content.push('\n');

        fail_open("activity_logger::log_step", self.append_internal(content)).await;
    }

    /// Log the end of a command
    ///
    /// This operation is fail-open - logging failures won't affect the command
    pub async fn log_command_complete(&self, report: &LoopReport) {
        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
        let icon = if report.is_done() { "✓" } else { "✗" };

        let mut content = format!(
            "### Summary\n\
            **Finished**: {}\n\
            **State**: {} {}\n\
            **Stop Reason**: {}\n\
            **Steps**: {} ({} actions executed, {} failed)\n",
            timestamp,
            icon,
            report.state,
            report.stop_reason,
            report.steps,
            report.history.len(),
            report.history.failure_count()
        );
        if let Some(diagnostic) = &report.diagnostic {
            content.push_str(&format!("**Diagnostic**: {}\n", preview(diagnostic)));
        }
        content.push_str("\n---\n\n");

        fail_open("activity_logger::log_command_complete", self.append_internal(content)).await;
    }

    /// Append content to the activity log (internal, returns Result for fail_open)
    async fn append_internal(&self, content: String) -> Result<()> {
        if let Some(parent) = self.output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.output_path)
            .await?;

        file.write_all(content.as_bytes()).await?;
        file.flush().await?;

        Ok(())
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or(text)
}

fn preview(text: &str) -> String {
    if text.chars().count() > ACTIVITY_LOG_PREVIEW_CHARS {
        let truncated: String = text.chars().take(ACTIVITY_LOG_PREVIEW_CHARS).collect();
        format!("{truncated}...")
    } else {
        text.to_string()
    }
}
