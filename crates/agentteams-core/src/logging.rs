//! Append-only audit log of completed tasks.
//!
//! Each finished task becomes one line of `{base}/YYYY/MM/tasks.jsonl`.
//! Secrets that slipped into prompts or worker output are redacted first, and
//! the redaction classes are recorded in `audit.jsonl` next to it.

use std::collections::BTreeSet;
use std::fs::{self, OpenOptions, create_dir_all};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use chrono::{Datelike, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use tracing::warn;

use crate::events::HandoffRecord;

const LOG_DIR_ENV: &str = "AGENTTEAMS_LOG_DIR";
const RETENTION_ENV: &str = "AGENTTEAMS_LOG_RETENTION_DAYS";
const DEFAULT_LOG_DIR: &str = "data/logs";
const DEFAULT_RETENTION_DAYS: u64 = 90;

static REDACTION_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        (
            "api_key",
            Regex::new(r"(?i)(api[_-]?key\s*[:=]\s*)([A-Za-z0-9\-_.+/]+)")
                .expect("invalid api_key regex"),
        ),
        (
            "secret",
            Regex::new(r"(?i)(secret\s*[:=]\s*)([A-Za-z0-9\-_.+/]+)")
                .expect("invalid secret regex"),
        ),
        (
            "bearer",
            Regex::new(r"(?i)(bearer\s+)([A-Za-z0-9\-_.+=/]+)").expect("invalid bearer regex"),
        ),
        (
            "sk_token",
            Regex::new(r"(sk-[A-Za-z0-9_\-]{16,})").expect("invalid sk_token regex"),
        ),
        (
            "tavily_token",
            Regex::new(r"(tvly-[A-Za-z0-9_\-]{16,})").expect("invalid tavily_token regex"),
        ),
    ]
});

/// What gets written for one finished task.
#[derive(Debug, Clone)]
pub struct TaskLogInput {
    pub task_id: String,
    pub prompt: String,
    pub handoffs: Vec<HandoffRecord>,
    /// `ok` or the error kind.
    pub status: String,
    pub result: Option<String>,
}

#[derive(Serialize)]
struct TaskLogRecord {
    timestamp: String,
    task_id: String,
    prompt: String,
    handoffs: Vec<HandoffRecord>,
    status: String,
    result: Option<String>,
    redactions: Vec<String>,
}

#[derive(Serialize)]
struct AuditLogRecord {
    timestamp: String,
    task_id: String,
    redactions: Vec<String>,
}

/// Location and retention of the task log.
#[derive(Debug, Clone)]
pub struct TaskLog {
    base_dir: PathBuf,
    retention_days: u64,
}

impl TaskLog {
    pub fn new(base_dir: impl Into<PathBuf>, retention_days: u64) -> Self {
        Self {
            base_dir: base_dir.into(),
            retention_days,
        }
    }

    /// `AGENTTEAMS_LOG_DIR` and `AGENTTEAMS_LOG_RETENTION_DAYS`, with defaults.
    pub fn from_env() -> Self {
        let base_dir = std::env::var(LOG_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_LOG_DIR));
        let retention_days = std::env::var(RETENTION_ENV)
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(DEFAULT_RETENTION_DAYS);
        Self::new(base_dir, retention_days)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Append the task record and prune expired files. Returns the log path.
    pub fn record(&self, input: TaskLogInput) -> Result<PathBuf> {
        let timestamp = Utc::now();
        let mut redactions = BTreeSet::new();

        let prompt = sanitize_text(&input.prompt, &mut redactions);
        let handoffs = input
            .handoffs
            .into_iter()
            .map(|record| HandoffRecord {
                messages: sanitize_text(&record.messages, &mut redactions),
                ..record
            })
            .collect();
        let result = input
            .result
            .as_deref()
            .map(|value| sanitize_text(value, &mut redactions));

        let record = TaskLogRecord {
            timestamp: timestamp.to_rfc3339(),
            task_id: input.task_id.clone(),
            prompt,
            handoffs,
            status: input.status,
            result,
            redactions: redactions.into_iter().collect(),
        };

        let month_dir = self
            .base_dir
            .join(format!("{:04}", timestamp.year()))
            .join(format!("{:02}", timestamp.month()));
        let task_log_path = month_dir.join("tasks.jsonl");
        append_json_line(&task_log_path, &record)?;

        if !record.redactions.is_empty() {
            let audit = AuditLogRecord {
                timestamp: record.timestamp.clone(),
                task_id: input.task_id.clone(),
                redactions: record.redactions.clone(),
            };
            append_json_line(&month_dir.join("audit.jsonl"), &audit)?;
            warn!(
                task_id = %input.task_id,
                fields = ?record.redactions,
                "redacted potential secrets from task log"
            );
        }

        self.enforce_retention()?;
        Ok(task_log_path)
    }

    fn enforce_retention(&self) -> Result<()> {
        if self.retention_days == 0 || !self.base_dir.exists() {
            return Ok(());
        }
        let cutoff = SystemTime::now()
            .checked_sub(Duration::from_secs(self.retention_days.saturating_mul(86_400)))
            .unwrap_or(SystemTime::UNIX_EPOCH);
        prune_directory(&self.base_dir, cutoff)
    }
}

fn append_json_line<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)
            .with_context(|| format!("failed to create log directory {}", parent.display()))?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    let line = serde_json::to_string(value)?;
    writeln!(writer, "{line}")
        .with_context(|| format!("failed to append log entry to {}", path.display()))?;
    writer.flush()?;
    Ok(())
}

fn sanitize_text(input: &str, redactions: &mut BTreeSet<String>) -> String {
    let mut output = input.to_string();
    for (name, regex) in REDACTION_PATTERNS.iter() {
        let mut matched = false;
        output = regex
            .replace_all(&output, |caps: &Captures| {
                matched = true;
                if caps.len() > 2 {
                    format!("{}[REDACTED]", &caps[1])
                } else {
                    "[REDACTED]".to_string()
                }
            })
            .to_string();
        if matched {
            redactions.insert((*name).to_string());
        }
    }
    output
}

fn prune_directory(dir: &Path, cutoff: SystemTime) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let metadata = entry.metadata()?;
        if metadata.is_dir() {
            prune_directory(&path, cutoff)?;
            if path.read_dir()?.next().is_none() {
                fs::remove_dir(&path).ok();
            }
        } else if metadata.is_file()
            && metadata
                .modified()
                .map(|time| time < cutoff)
                .unwrap_or(false)
        {
            fs::remove_file(&path).ok();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn input(prompt: &str) -> TaskLogInput {
        TaskLogInput {
            task_id: "task-1".into(),
            prompt: prompt.into(),
            handoffs: vec![HandoffRecord::reported(
                "research_team",
                "used Bearer abc.def.ghi to fetch",
            )],
            status: "ok".into(),
            result: Some("done".into()),
        }
    }

    #[test]
    fn sanitize_keeps_prefix_and_masks_value() {
        let mut redactions = BTreeSet::new();
        let text = sanitize_text("api_key=abc123 and sk-ABCDEFGHIJKLMNOPQRST", &mut redactions);
        assert_eq!(text, "api_key=[REDACTED] and [REDACTED]");
        assert!(redactions.contains("api_key"));
        assert!(redactions.contains("sk_token"));
    }

    #[test]
    fn record_writes_task_and_audit_lines() {
        let dir = tempdir().unwrap();
        let log = TaskLog::new(dir.path(), 90);

        let path = log.record(input("write a report, api_key: hunter2")).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        let line: serde_json::Value = serde_json::from_str(content.trim()).unwrap();

        assert_eq!(line["task_id"], "task-1");
        assert_eq!(line["prompt"], "write a report, api_key: [REDACTED]");
        assert_eq!(
            line["handoffs"][0]["messages"],
            "used Bearer [REDACTED] to fetch"
        );
        assert_eq!(line["handoffs"][0]["currentAgent"], "research_team");

        let audit = fs::read_to_string(path.with_file_name("audit.jsonl")).unwrap();
        assert!(audit.contains("bearer"));
        assert!(audit.contains("api_key"));
    }

    #[test]
    fn clean_records_skip_the_audit_file() {
        let dir = tempdir().unwrap();
        let log = TaskLog::new(dir.path(), 0);
        let mut clean = input("plain prompt");
        clean.handoffs.clear();

        let path = log.record(clean).unwrap();
        assert!(path.exists());
        assert!(!path.with_file_name("audit.jsonl").exists());
    }
}
