//! Workers, tools and the team hierarchy.

mod sandbox;
mod teams;
pub mod tools;
mod worker;

pub use sandbox::{
    ProcessSandboxConfig, ProcessSandboxRunner, SandboxExecutor, SandboxRequest, SandboxResult,
};
pub use teams::{
    CHART_GENERATOR, DOC_WRITER, NOTE_TAKER, RESEARCH_TEAM, SEARCH, TOP_LEVEL, Toolbox,
    WEB_SCRAPER, WRITING_TEAM, build_hierarchy, build_hierarchy_with, research_team,
    writing_team,
};
pub use worker::{DEFAULT_MAX_TOOL_ROUNDS, ToolAgent};
