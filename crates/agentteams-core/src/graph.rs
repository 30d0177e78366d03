//! Supervisor/worker state machine.
//!
//! A [`TeamGraph`] owns one [`Supervisor`] and a roster of [`Agent`]s. It
//! alternates between asking the supervisor for a decision and running the
//! chosen worker until the supervisor answers FINISH. Because a graph is
//! itself an [`Agent`], teams nest inside other teams.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{Instrument, info, info_span, instrument, warn};

use crate::agent::Agent;
use crate::events::{HandoffRecord, HandoffSink};
use crate::llm::ChatModel;
use crate::message::{Message, Transcript};
use crate::metrics;
use crate::supervisor::{Roster, RoutingDecision, Supervisor, WorkerId};
use crate::TeamsError;

/// Supervisor turns a nested team may take before it fails.
pub const DEFAULT_TEAM_MAX_TURNS: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Decide,
    Dispatch(WorkerId),
    Terminate,
}

pub struct TeamGraph {
    name: String,
    supervisor: Supervisor,
    workers: HashMap<WorkerId, Arc<dyn Agent>>,
    max_turns: usize,
}

impl TeamGraph {
    pub fn builder(name: impl Into<String>) -> TeamGraphBuilder {
        TeamGraphBuilder {
            name: name.into(),
            instructions: String::new(),
            workers: Vec::new(),
            max_turns: DEFAULT_TEAM_MAX_TURNS,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn roster(&self) -> &Roster {
        self.supervisor.roster()
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// Run the graph over `input` until FINISH.
    ///
    /// `limit` bounds the number of supervisor decisions. Every decision and
    /// every worker report is pushed to `sink` before the next node starts.
    #[instrument(name = "team_graph", skip_all, fields(graph = %self.name, limit = limit))]
    pub async fn execute(
        &self,
        input: Vec<Message>,
        limit: usize,
        sink: &HandoffSink,
    ) -> Result<Transcript, TeamsError> {
        let mut transcript = Transcript::from(input);
        let mut decisions = 0usize;
        let mut step = Step::Decide;

        loop {
            if step == Step::Terminate {
                info!(decisions, messages = transcript.len(), "graph finished");
                return Ok(transcript);
            }
            if sink.is_closed() {
                warn!(decisions, "consumer went away, stopping graph");
                return Err(TeamsError::Cancelled(format!(
                    "{} stopped after {decisions} decisions",
                    self.name
                )));
            }

            step = match step {
                Step::Decide => {
                    if decisions >= limit {
                        warn!(decisions, "turn limit reached without FINISH");
                        return Err(TeamsError::depth_exceeded(self.name.clone(), limit));
                    }
                    decisions += 1;

                    let decision = self.supervisor.decide(transcript.messages()).await?;
                    metrics::record_decision(&self.name, decision.label());
                    info!(turn = decisions, next = %decision.label(), "supervisor routed");
                    sink.emit(HandoffRecord::routed(&decision));

                    match decision {
                        RoutingDecision::Dispatch(worker) => Step::Dispatch(worker),
                        RoutingDecision::Finish => Step::Terminate,
                    }
                }
                Step::Dispatch(worker) => {
                    let report = self.dispatch(&worker, transcript.messages()).await?;
                    sink.emit(HandoffRecord::reported(worker.as_str(), &report.content));
                    transcript.push(report);
                    Step::Decide
                }
                Step::Terminate => Step::Terminate,
            };
        }
    }

    async fn dispatch(&self, worker: &WorkerId, history: &[Message]) -> Result<Message, TeamsError> {
        let agent = self.workers.get(worker).ok_or_else(|| {
            TeamsError::InvalidTeam(format!("{} has no node for `{worker}`", self.name))
        })?;

        let started = Instant::now();
        let result = agent
            .run(history)
            .instrument(info_span!("worker", worker = %worker))
            .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(reply) => {
                metrics::record_worker_run(worker.as_str(), "ok", elapsed_ms);
                info!(worker = %worker, elapsed_ms, "worker reported");
                Ok(Message::named(worker.as_str(), reply.content))
            }
            Err(err) => {
                metrics::record_worker_run(worker.as_str(), "error", elapsed_ms);
                warn!(worker = %worker, error = %err, "worker failed");
                Err(err)
            }
        }
    }

    /// Mermaid flowchart of the graph, nested teams drawn as subgraphs.
    pub fn render_mermaid(&self) -> String {
        let mut output = String::from("flowchart TD\n");
        let _ = writeln!(output, "  start((start))");
        let root = self.write_mermaid(&mut output, "", 1);
        let _ = writeln!(output, "  start --> {root}");
        output
    }

    fn write_mermaid(&self, output: &mut String, prefix: &str, depth: usize) -> String {
        let pad = "  ".repeat(depth);
        let supervisor = format!("{prefix}supervisor");
        let _ = writeln!(output, "{pad}{supervisor}{{\"supervisor\"}}");

        for worker in self.roster().members() {
            let node = format!("{prefix}{worker}");
            match self.workers.get(worker).and_then(|agent| agent.as_team()) {
                Some(team) => {
                    let _ = writeln!(output, "{pad}subgraph {node}[\"{worker}\"]");
                    team.write_mermaid(output, &format!("{node}_"), depth + 1);
                    let _ = writeln!(output, "{pad}end");
                }
                None => {
                    let _ = writeln!(output, "{pad}{node}[\"{worker}\"]");
                }
            }
            let _ = writeln!(output, "{pad}{supervisor} -.-> {node}");
            let _ = writeln!(output, "{pad}{node} --> {supervisor}");
        }

        let finish = format!("{prefix}finish");
        let _ = writeln!(output, "{pad}{finish}([FINISH])");
        let _ = writeln!(output, "{pad}{supervisor} -.-> {finish}");
        supervisor
    }
}

#[async_trait]
impl Agent for TeamGraph {
    fn name(&self) -> &str {
        &self.name
    }

    /// Runs the team on the latest message of the parent's history and
    /// reports the team's last message under the team's name.
    async fn run(&self, history: &[Message]) -> Result<Message, TeamsError> {
        let brief = history
            .last()
            .map(|message| Message::user(message.content.clone()))
            .ok_or(TeamsError::EmptyTask)?;

        let sink = HandoffSink::detached(self.name.clone());
        let transcript = self.execute(vec![brief], self.max_turns, &sink).await?;
        let content = transcript
            .last()
            .map(|message| message.content.clone())
            .unwrap_or_default();
        Ok(Message::named(self.name.clone(), content))
    }

    fn as_team(&self) -> Option<&TeamGraph> {
        Some(self)
    }
}

pub struct TeamGraphBuilder {
    name: String,
    instructions: String,
    workers: Vec<Arc<dyn Agent>>,
    max_turns: usize,
}

impl TeamGraphBuilder {
    pub fn add_worker(mut self, worker: Arc<dyn Agent>) -> Self {
        self.workers.push(worker);
        self
    }

    /// Extra supervisor guidance appended to the routing prompt.
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    /// Decision budget when this graph runs as a nested team.
    pub fn max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn build(self, model: Arc<dyn ChatModel>) -> Result<TeamGraph, TeamsError> {
        if self.name.trim().is_empty() {
            return Err(TeamsError::InvalidTeam("graph name must not be empty".into()));
        }
        if self.max_turns == 0 {
            return Err(TeamsError::InvalidTeam(format!(
                "{} needs a turn limit above zero",
                self.name
            )));
        }

        let roster = Roster::new(self.workers.iter().map(|worker| worker.name().to_string()))?;
        let workers = roster
            .members()
            .iter()
            .cloned()
            .zip(self.workers)
            .collect::<HashMap<_, _>>();
        let supervisor =
            Supervisor::new(self.name.clone(), roster, model).with_instructions(&self.instructions);

        Ok(TeamGraph {
            name: self.name,
            supervisor,
            workers,
            max_turns: self.max_turns,
        })
    }
}
