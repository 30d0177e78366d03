use std::fmt::Write as _;
use std::fs::{File, create_dir_all};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::events::HandoffRecord;

/// A hand-off with the time it was observed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    #[serde(flatten)]
    pub handoff: HandoffRecord,
    pub timestamp_ms: u64,
}

impl TraceEvent {
    pub fn new(handoff: HandoffRecord) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self {
            handoff,
            timestamp_ms,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceCollector {
    events: Vec<TraceEvent>,
}

impl TraceCollector {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn record(&mut self, handoff: HandoffRecord) {
        self.events.push(TraceEvent::new(handoff));
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn summary(&self) -> TraceSummary {
        TraceSummary::from_events(&self.events)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceStep {
    pub index: usize,
    pub from: String,
    pub to: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceSummary {
    pub steps: Vec<TraceStep>,
}

impl TraceSummary {
    pub fn from_events(events: &[TraceEvent]) -> Self {
        let steps = events
            .iter()
            .enumerate()
            .map(|(idx, event)| TraceStep {
                index: idx + 1,
                from: event.handoff.current_agent.clone(),
                to: event.handoff.next_agent.clone(),
                message: event.handoff.messages.clone(),
            })
            .collect();
        Self { steps }
    }

    pub fn render_markdown(&self) -> String {
        if self.steps.is_empty() {
            return "No hand-offs recorded.".to_string();
        }
        let mut output = String::from("### Hand-off Trace\n");
        for step in &self.steps {
            let _ = writeln!(
                output,
                "{}. **{}** → **{}**: {}",
                step.index,
                step.from,
                step.to,
                truncate(&step.message, 160)
            );
        }
        output
    }

    /// Sequence of hand-offs as a Mermaid sequence diagram.
    pub fn render_mermaid(&self) -> String {
        if self.steps.is_empty() {
            return "sequenceDiagram\n  %% no hand-offs captured\n".to_string();
        }

        let mut output = String::from("sequenceDiagram\n");
        for step in &self.steps {
            let label = sanitize_mermaid(&truncate(&step.message, 80));
            let _ = writeln!(output, "  {}->>{}: {}", step.from, step.to, label);
        }
        output
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    let single_line = text.replace('\n', " ");
    if single_line.chars().count() <= max_chars {
        return single_line;
    }
    let mut cut: String = single_line.chars().take(max_chars).collect();
    cut.push('…');
    cut
}

fn sanitize_mermaid(text: &str) -> String {
    text.replace(';', ",")
        .replace('#', "")
        .replace('\n', "<br/>")
}

/// Write the trace of one task to `{dir}/{task_id}.json`.
pub fn persist_trace<P: AsRef<Path>>(
    dir: P,
    task_id: &str,
    events: &[TraceEvent],
) -> Result<PathBuf> {
    let dir = dir.as_ref();
    create_dir_all(dir)
        .with_context(|| format!("failed to create trace directory {}", dir.display()))?;
    let path = dir.join(format!("{task_id}.json"));
    let payload = serde_json::to_vec_pretty(events)?;
    let mut file = File::create(&path)
        .with_context(|| format!("failed to create trace file {}", path.display()))?;
    file.write_all(&payload)
        .with_context(|| format!("failed to write trace file {}", path.display()))?;
    Ok(path)
}
