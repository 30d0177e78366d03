//! Task submission on top of a built hierarchy.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::events::{HandoffRecord, HandoffSink, TaskEvent};
use crate::graph::TeamGraph;
use crate::logging::{TaskLog, TaskLogInput};
use crate::message::{Message, Transcript};
use crate::metrics;
use crate::TeamsError;

/// Supervisor decisions a task may take when neither the caller nor the
/// configuration says otherwise.
pub const DEFAULT_MAX_DEPTH: usize = 150;

/// A request to run the hierarchy.
///
/// A missing `max_depth` falls back to the service's configured default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentTask {
    #[serde(default)]
    pub messages: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<usize>,
    #[serde(default)]
    pub stream: bool,
}

impl AgentTask {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![prompt.into()],
            max_depth: None,
            stream: false,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    pub fn streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// The latest message as the prompt for the top supervisor.
    pub fn validate(&self) -> Result<Message, TeamsError> {
        match self.messages.last() {
            Some(prompt) if !prompt.trim().is_empty() => Ok(Message::user(prompt.clone())),
            _ => Err(TeamsError::EmptyTask),
        }
    }
}

/// Result of a buffered task run.
#[derive(Debug, Clone, Serialize)]
pub struct TaskOutcome {
    pub task_id: String,
    pub handoffs: Vec<HandoffRecord>,
    pub result: Option<Message>,
}

/// Hand-offs of a running task, in execution order.
///
/// Dropping the stream stops the graph at its next node boundary.
pub struct TaskStream {
    pub task_id: String,
    pub events: UnboundedReceiverStream<TaskEvent>,
}

/// Runs tasks against one shared, immutable hierarchy.
#[derive(Clone)]
pub struct TaskService {
    graph: Arc<TeamGraph>,
    task_log: Option<TaskLog>,
    default_max_depth: usize,
}

impl TaskService {
    pub fn new(graph: Arc<TeamGraph>) -> Self {
        Self {
            graph,
            task_log: None,
            default_max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Depth used for tasks that do not set `max_depth`, usually `teams.max_depth`.
    pub fn with_default_max_depth(mut self, max_depth: usize) -> Self {
        self.default_max_depth = max_depth;
        self
    }

    pub fn default_max_depth(&self) -> usize {
        self.default_max_depth
    }

    fn depth_for(&self, task: &AgentTask) -> usize {
        task.max_depth.unwrap_or(self.default_max_depth)
    }

    /// Append every finished task to `log`.
    pub fn with_task_log(mut self, log: TaskLog) -> Self {
        self.task_log = Some(log);
        self
    }

    pub fn graph(&self) -> &Arc<TeamGraph> {
        &self.graph
    }

    /// Validate `task` and start it on its own tokio task.
    ///
    /// Validation failures are returned before anything runs; later failures
    /// arrive as a final [`TaskEvent::Failed`].
    pub fn submit(&self, task: AgentTask) -> Result<TaskStream, TeamsError> {
        let prompt = task.validate()?;
        let max_depth = self.depth_for(&task);
        let task_id = Uuid::new_v4().to_string();
        let (sink, receiver) = HandoffSink::channel();

        let service = self.clone();
        let span = info_span!("agent_task", task_id = %task_id, max_depth);
        let id = task_id.clone();
        tokio::spawn(
            async move {
                let result = service.execute(&id, prompt, max_depth, &sink).await;
                if let Err(err) = &result {
                    match err {
                        TeamsError::Cancelled(_) => debug!("stream consumer went away"),
                        _ => sink.fail(err),
                    }
                }
            }
            .instrument(span),
        );

        Ok(TaskStream {
            task_id,
            events: UnboundedReceiverStream::new(receiver),
        })
    }

    /// Run `task` to completion and return every hand-off at once.
    pub async fn run(&self, task: AgentTask) -> Result<TaskOutcome, TeamsError> {
        let prompt = task.validate()?;
        let max_depth = self.depth_for(&task);
        let task_id = Uuid::new_v4().to_string();
        let (sink, _receiver) = HandoffSink::channel();

        let transcript = self
            .execute(&task_id, prompt, max_depth, &sink)
            .instrument(info_span!("agent_task", task_id = %task_id, max_depth))
            .await?
            .into_messages();

        Ok(TaskOutcome {
            task_id,
            handoffs: sink.history(),
            result: transcript.into_iter().last(),
        })
    }

    async fn execute(
        &self,
        task_id: &str,
        prompt: Message,
        max_depth: usize,
        sink: &HandoffSink,
    ) -> Result<Transcript, TeamsError> {
        info!(prompt_chars = prompt.content.len(), "task started");
        let result = self
            .graph
            .execute(vec![prompt.clone()], max_depth, sink)
            .await;

        let status = match &result {
            Ok(_) => "ok",
            Err(err) => err.kind().as_str(),
        };
        metrics::record_task(status);
        match &result {
            Ok(transcript) => info!(messages = transcript.len(), "task finished"),
            Err(err) => warn!(error = %err, status, "task failed"),
        }

        if let Some(log) = self.task_log.clone() {
            let input = TaskLogInput {
                task_id: task_id.to_string(),
                prompt: prompt.content,
                handoffs: sink.history(),
                status: status.to_string(),
                result: match &result {
                    Ok(transcript) => transcript.last().map(|message| message.content.clone()),
                    Err(err) => Some(err.to_string()),
                },
            };
            match tokio::task::spawn_blocking(move || log.record(input)).await {
                Ok(Ok(path)) => debug!(path = %path.display(), "task logged"),
                Ok(Err(err)) => warn!(error = %err, "failed to write task log"),
                Err(err) => warn!(error = %err, "task log writer stopped"),
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_fields_are_missing() {
        let task: AgentTask = serde_json::from_str(r#"{"messages": ["hi"]}"#).unwrap();
        assert_eq!(task.max_depth, None);
        assert!(!task.stream);

        let empty: AgentTask = serde_json::from_str("{}").unwrap();
        assert!(empty.messages.is_empty());
    }

    #[test]
    fn validate_uses_latest_message() {
        let task = AgentTask {
            messages: vec!["old".into(), "new".into()],
            ..AgentTask::new("")
        };
        assert_eq!(task.validate().unwrap(), Message::user("new"));
    }

    #[test]
    fn empty_or_blank_tasks_are_rejected() {
        let empty = AgentTask {
            messages: Vec::new(),
            ..AgentTask::new("")
        };
        assert!(matches!(empty.validate(), Err(TeamsError::EmptyTask)));
        assert!(matches!(
            AgentTask::new("   ").validate(),
            Err(TeamsError::EmptyTask)
        ));
    }
}
