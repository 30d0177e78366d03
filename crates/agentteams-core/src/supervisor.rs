//! Model-driven routing between the workers of one team.

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::TeamsError;
use crate::llm::{ChatMessage, ChatModel, ChatRequest};
use crate::message::{Message, Role};

/// Routing label that ends a graph.
pub const FINISH: &str = "FINISH";
/// Node name every supervisor reports under.
pub const SUPERVISOR: &str = "supervisor";

/// Name of a roster member.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(String);

impl WorkerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of one supervisor turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingDecision {
    Dispatch(WorkerId),
    Finish,
}

impl RoutingDecision {
    pub fn label(&self) -> &str {
        match self {
            RoutingDecision::Dispatch(worker) => worker.as_str(),
            RoutingDecision::Finish => FINISH,
        }
    }
}

/// Fixed set of workers a supervisor may route to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roster {
    members: Vec<WorkerId>,
}

impl Roster {
    pub fn new<I, S>(names: I) -> Result<Self, TeamsError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut members: Vec<WorkerId> = Vec::new();
        for name in names {
            let name = name.into();
            if name.trim().is_empty() {
                return Err(TeamsError::InvalidTeam("worker names must not be empty".into()));
            }
            if name == FINISH || name == SUPERVISOR {
                return Err(TeamsError::InvalidTeam(format!(
                    "`{name}` is reserved and cannot name a worker"
                )));
            }
            if members.iter().any(|member| member.0 == name) {
                return Err(TeamsError::InvalidTeam(format!(
                    "worker `{name}` appears twice in the roster"
                )));
            }
            members.push(WorkerId(name));
        }

        if members.is_empty() {
            return Err(TeamsError::InvalidTeam(
                "a roster needs at least one worker".into(),
            ));
        }

        Ok(Self { members })
    }

    pub fn members(&self) -> &[WorkerId] {
        &self.members
    }

    pub fn contains(&self, name: &str) -> bool {
        self.members.iter().any(|member| member.0 == name)
    }

    /// Map a model-produced label onto the roster; anything else is `None`.
    pub fn resolve(&self, label: &str) -> Option<RoutingDecision> {
        let label = label.trim();
        if label == FINISH {
            return Some(RoutingDecision::Finish);
        }
        self.members
            .iter()
            .find(|member| member.0 == label)
            .cloned()
            .map(RoutingDecision::Dispatch)
    }

    /// Every label the supervisor may answer with, workers first.
    pub fn options(&self) -> Vec<String> {
        self.members
            .iter()
            .map(|member| member.0.clone())
            .chain(std::iter::once(FINISH.to_string()))
            .collect()
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "next": { "type": "string", "enum": self.options() }
            },
            "required": ["next"],
            "additionalProperties": false
        })
    }
}

#[derive(Debug, Deserialize)]
struct RouteReply {
    next: String,
}

/// Asks the model which roster member acts next.
pub struct Supervisor {
    graph: String,
    roster: Roster,
    model: Arc<dyn ChatModel>,
    system_prompt: String,
}

impl Supervisor {
    pub fn new(graph: impl Into<String>, roster: Roster, model: Arc<dyn ChatModel>) -> Self {
        let system_prompt = default_prompt(&roster);
        Self {
            graph: graph.into(),
            roster,
            model,
            system_prompt,
        }
    }

    /// Append extra guidance after the routing instructions.
    pub fn with_instructions(mut self, instructions: &str) -> Self {
        if !instructions.trim().is_empty() {
            self.system_prompt.push_str("\n\n");
            self.system_prompt.push_str(instructions.trim());
        }
        self
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub async fn decide(&self, history: &[Message]) -> Result<RoutingDecision, TeamsError> {
        let messages = std::iter::once(ChatMessage::new(Role::System, self.system_prompt.clone()))
            .chain(history.iter().map(ChatMessage::from))
            .collect();
        let request = ChatRequest::new(messages).with_response_schema("router", self.roster.schema());

        let response = self.model.complete(request).await?;
        let raw = response.content.unwrap_or_default();
        debug!(graph = %self.graph, reply = %raw, "supervisor reply");

        let choice = parse_route(&raw).unwrap_or_else(|| raw.trim().to_string());
        self.roster
            .resolve(&choice)
            .ok_or_else(|| TeamsError::InvalidRoute {
                graph: self.graph.clone(),
                choice,
                options: self.roster.options().join(", "),
            })
    }
}

fn default_prompt(roster: &Roster) -> String {
    let members = roster
        .members()
        .iter()
        .map(WorkerId::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "You are a supervisor tasked with managing a conversation between the following \
         workers: {members}. Given the following user request, respond with the worker to act \
         next. Each worker will perform a task and respond with their results and status. When \
         finished, respond with {FINISH}."
    )
}

/// Extract `next` from a JSON reply, tolerating prose around the object.
fn parse_route(raw: &str) -> Option<String> {
    if let Ok(reply) = serde_json::from_str::<RouteReply>(raw.trim()) {
        return Some(reply.next);
    }
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<RouteReply>(&raw[start..=end])
        .ok()
        .map(|reply| reply.next)
}
