//! Agent Teams core abstractions.
//!
//! Hierarchical supervisor/worker graphs over a chat-completion model: a
//! [`Supervisor`] routes between the workers of a [`TeamGraph`], a team graph
//! is itself an [`Agent`] so teams nest, and [`TaskService`] runs the top
//! graph for one task while streaming its hand-offs.

mod agent;
mod config;
mod error;
mod events;
mod graph;
pub mod llm;
mod logging;
mod message;
mod metrics;
mod security;
mod supervisor;
mod telemetry;
mod trace;
mod workflow;

pub use agent::Agent;
pub use config::{Config, ConfigLoader, LlmConfig, LoggingConfig, TeamsConfig, ToolsConfig};
pub use error::{ErrorKind, TeamsError};
pub use events::{HandoffRecord, HandoffSink, TaskEvent, TaskFailure};
pub use graph::{DEFAULT_TEAM_MAX_TURNS, TeamGraph, TeamGraphBuilder};
pub use logging::{TaskLog, TaskLogInput};
pub use message::{Message, Role, Transcript};
pub use metrics::{
    init_metrics_from_env, record_decision, record_task, record_tool_call,
    record_worker_run,
};
pub use security::{SecretValue, require_env};
pub use supervisor::{FINISH, Roster, RoutingDecision, SUPERVISOR, Supervisor, WorkerId};
pub use telemetry::{TelemetryOptions, init_telemetry};
pub use trace::{TraceCollector, TraceEvent, TraceStep, TraceSummary, persist_trace};
pub use workflow::{AgentTask, DEFAULT_MAX_DEPTH, TaskOutcome, TaskService, TaskStream};
