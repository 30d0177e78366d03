//! Hand-off records emitted while a graph executes.
//!
//! The top-level graph pushes one [`HandoffRecord`] per node execution into a
//! [`HandoffSink`]; the task service drains the receiving end and forwards
//! records to the caller as they arrive.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{ErrorKind, TeamsError};
use crate::supervisor::{RoutingDecision, SUPERVISOR};

/// One transition of the top-level graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffRecord {
    pub current_agent: String,
    pub next_agent: String,
    pub messages: String,
}

impl HandoffRecord {
    /// The supervisor chose its next node.
    pub fn routed(decision: &RoutingDecision) -> Self {
        Self {
            current_agent: SUPERVISOR.to_string(),
            next_agent: decision.label().to_string(),
            messages: format!("Routing to next node: {}", decision.label()),
        }
    }

    /// A worker finished and handed control back.
    pub fn reported(worker: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            current_agent: worker.into(),
            next_agent: SUPERVISOR.to_string(),
            messages: content.into(),
        }
    }
}

/// Failure payload of the final stream line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&TeamsError> for TaskFailure {
    fn from(error: &TeamsError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Item of a task stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskEvent {
    Handoff(HandoffRecord),
    Failed { error: TaskFailure },
}

impl TaskEvent {
    pub fn as_handoff(&self) -> Option<&HandoffRecord> {
        match self {
            TaskEvent::Handoff(record) => Some(record),
            TaskEvent::Failed { .. } => None,
        }
    }

    /// One NDJSON line, newline included.
    pub fn to_ndjson(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Where a graph reports its transitions.
///
/// A detached sink discards records; nested teams run detached so only
/// top-level hand-offs reach the caller.
#[derive(Debug, Clone)]
pub struct HandoffSink {
    sender: Option<mpsc::UnboundedSender<TaskEvent>>,
    history: Arc<Mutex<Vec<HandoffRecord>>>,
    scope: String,
}

impl HandoffSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TaskEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender: Some(sender),
                history: Arc::default(),
                scope: "task".to_string(),
            },
            receiver,
        )
    }

    pub fn detached(scope: impl Into<String>) -> Self {
        Self {
            sender: None,
            history: Arc::default(),
            scope: scope.into(),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn emit(&self, record: HandoffRecord) {
        match &self.sender {
            Some(sender) => {
                self.history
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .push(record.clone());
                if let Err(e) = sender.send(TaskEvent::Handoff(record)) {
                    tracing::warn!(scope = %self.scope, error = %e, "Failed to emit hand-off");
                }
            }
            None => {
                tracing::debug!(
                    scope = %self.scope,
                    current = %record.current_agent,
                    next = %record.next_agent,
                    "nested hand-off"
                );
            }
        }
    }

    pub fn fail(&self, error: &TeamsError) {
        if let Some(sender) = &self.sender {
            let event = TaskEvent::Failed {
                error: TaskFailure::from(error),
            };
            if let Err(e) = sender.send(event) {
                tracing::warn!(scope = %self.scope, error = %e, "Failed to emit task failure");
            }
        }
    }

    /// Every record emitted through a channel sink so far.
    pub fn history(&self) -> Vec<HandoffRecord> {
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// True once the receiving side has been dropped.
    pub fn is_closed(&self) -> bool {
        self.sender
            .as_ref()
            .map(|sender| sender.is_closed())
            .unwrap_or(false)
    }
}
