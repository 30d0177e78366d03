//! The research team, the writing team and the graph above them.

use std::sync::Arc;
use std::time::Duration;

use agentteams_core::llm::ChatModel;
use agentteams_core::{Config, TeamGraph, TeamsConfig, TeamsError, ToolsConfig};
use tracing::info;

use crate::sandbox::{ProcessSandboxConfig, ProcessSandboxRunner};
use crate::tools::{
    CreateOutline, DocumentStore, EditDocument, PythonRepl, ReadDocument, ScrapeWebpages,
    TavilySearch, Tool, ToolError, WriteDocument,
};
use crate::worker::ToolAgent;

pub const SEARCH: &str = "search";
pub const WEB_SCRAPER: &str = "web_scraper";
pub const DOC_WRITER: &str = "doc_writer";
pub const NOTE_TAKER: &str = "note_taker";
pub const CHART_GENERATOR: &str = "chart_generator";
pub const RESEARCH_TEAM: &str = "research_team";
pub const WRITING_TEAM: &str = "writing_team";
/// Name of the top-level graph in logs, metrics and errors.
pub const TOP_LEVEL: &str = "agent_teams";

const DOC_WRITER_PROMPT: &str = "You can read, write and edit documents based on note-taker's \
                                 outlines. Don't ask follow-up questions.";
const NOTE_TAKER_PROMPT: &str = "You can read documents and create outlines for the document \
                                 writer. Don't ask follow-up questions.";

/// Every tool the hierarchy binds, built once and shared between workers.
#[derive(Clone)]
pub struct Toolbox {
    pub documents: DocumentStore,
    pub search: Arc<dyn Tool>,
    pub scrape: Arc<dyn Tool>,
    pub create_outline: Arc<dyn Tool>,
    pub read_document: Arc<dyn Tool>,
    pub write_document: Arc<dyn Tool>,
    pub edit_document: Arc<dyn Tool>,
    pub python_repl: Arc<dyn Tool>,
}

impl Toolbox {
    pub fn from_config(config: &Config) -> Result<Self, TeamsError> {
        Self::build(&config.tools, config.search_api_key()).map_err(|err| {
            TeamsError::InvalidConfiguration(format!("failed to set up tools: {err}"))
        })
    }

    fn build(
        settings: &ToolsConfig,
        search_key: Option<agentteams_core::SecretValue>,
    ) -> Result<Self, ToolError> {
        let documents = DocumentStore::open(&settings.working_dir)?;
        let fetch_timeout = Duration::from_secs(settings.fetch_timeout_secs);
        let runner = ProcessSandboxRunner::new(ProcessSandboxConfig {
            python_binary: settings.python_binary.clone(),
            working_dir: settings.working_dir.clone(),
            ..ProcessSandboxConfig::default()
        })
        .map_err(|err| ToolError::Sandbox(format!("{err:#}")))?;

        Ok(Self {
            search: Arc::new(TavilySearch::new(
                search_key,
                settings.search_max_results,
                fetch_timeout,
            )?),
            scrape: Arc::new(ScrapeWebpages::new(fetch_timeout)?),
            create_outline: Arc::new(CreateOutline::new(documents.clone())),
            read_document: Arc::new(ReadDocument::new(documents.clone())),
            write_document: Arc::new(WriteDocument::new(documents.clone())),
            edit_document: Arc::new(EditDocument::new(documents.clone())),
            python_repl: Arc::new(PythonRepl::new(
                Arc::new(runner),
                Duration::from_secs(settings.code_timeout_secs),
            )),
            documents,
        })
    }
}

pub fn research_team(
    model: Arc<dyn ChatModel>,
    toolbox: &Toolbox,
    limits: &TeamsConfig,
) -> Result<TeamGraph, TeamsError> {
    let worker = |name: &str, tools: Vec<Arc<dyn Tool>>| {
        Arc::new(
            ToolAgent::new(name, model.clone(), tools).with_max_rounds(limits.worker_max_tool_rounds),
        )
    };

    TeamGraph::builder(RESEARCH_TEAM)
        .add_worker(worker(SEARCH, vec![toolbox.search.clone()]))
        .add_worker(worker(WEB_SCRAPER, vec![toolbox.scrape.clone()]))
        .max_turns(limits.team_max_turns)
        .build(model.clone())
}

pub fn writing_team(
    model: Arc<dyn ChatModel>,
    toolbox: &Toolbox,
    limits: &TeamsConfig,
) -> Result<TeamGraph, TeamsError> {
    let worker = |name: &str, tools: Vec<Arc<dyn Tool>>| {
        ToolAgent::new(name, model.clone(), tools)
            .with_max_rounds(limits.worker_max_tool_rounds)
            .with_workspace_listing(toolbox.documents.clone())
    };

    let doc_writer = worker(
        DOC_WRITER,
        vec![
            toolbox.write_document.clone(),
            toolbox.edit_document.clone(),
            toolbox.read_document.clone(),
        ],
    )
    .with_instructions(DOC_WRITER_PROMPT);
    let note_taker = worker(
        NOTE_TAKER,
        vec![toolbox.create_outline.clone(), toolbox.read_document.clone()],
    )
    .with_instructions(NOTE_TAKER_PROMPT);
    let chart_generator = worker(
        CHART_GENERATOR,
        vec![toolbox.read_document.clone(), toolbox.python_repl.clone()],
    );

    TeamGraph::builder(WRITING_TEAM)
        .add_worker(Arc::new(doc_writer))
        .add_worker(Arc::new(note_taker))
        .add_worker(Arc::new(chart_generator))
        .max_turns(limits.team_max_turns)
        .build(model.clone())
}

/// The top-level graph routing between the two teams.
pub fn build_hierarchy_with(
    model: Arc<dyn ChatModel>,
    toolbox: &Toolbox,
    limits: &TeamsConfig,
) -> Result<TeamGraph, TeamsError> {
    let research = research_team(model.clone(), toolbox, limits)?;
    let writing = writing_team(model.clone(), toolbox, limits)?;

    let graph = TeamGraph::builder(TOP_LEVEL)
        .add_worker(Arc::new(research))
        .add_worker(Arc::new(writing))
        .build(model)?;
    info!(
        teams = ?graph.roster().options(),
        working_dir = %toolbox.documents.root().display(),
        "agent hierarchy ready"
    );
    Ok(graph)
}

/// Build tools from `config` and assemble the hierarchy over `model`.
pub fn build_hierarchy(model: Arc<dyn ChatModel>, config: &Config) -> Result<TeamGraph, TeamsError> {
    let toolbox = Toolbox::from_config(config)?;
    build_hierarchy_with(model, &toolbox, &config.teams)
}
