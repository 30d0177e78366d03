use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm::LlmError;

/// Core error type for agent team execution.
#[derive(Debug, Error)]
pub enum TeamsError {
    #[error("task contains no messages")]
    EmptyTask,
    #[error("{graph} exceeded its limit of {limit} turns without finishing")]
    DepthExceeded { graph: String, limit: usize },
    #[error("supervisor of {graph} chose `{choice}`, expected one of: {options}")]
    InvalidRoute {
        graph: String,
        choice: String,
        options: String,
    },
    #[error("model call failed: {0}")]
    Model(#[from] LlmError),
    #[error("task cancelled: {0}")]
    Cancelled(String),
    #[error("invalid team definition: {0}")]
    InvalidTeam(String),
    #[error("configuration error: {0}")]
    InvalidConfiguration(String),
    #[error("missing environment variable: {0}")]
    MissingSecret(String),
    #[error("I/O error while reading {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TeamsError {
    pub fn config_io(path: PathBuf, source: std::io::Error) -> Self {
        Self::ConfigIo { path, source }
    }

    pub fn depth_exceeded(graph: impl Into<String>, limit: usize) -> Self {
        Self::DepthExceeded {
            graph: graph.into(),
            limit,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            TeamsError::EmptyTask => ErrorKind::EmptyTask,
            TeamsError::DepthExceeded { .. } => ErrorKind::DepthExceeded,
            TeamsError::InvalidRoute { .. } | TeamsError::Model(_) => ErrorKind::ModelFailure,
            TeamsError::Cancelled(_) => ErrorKind::Cancelled,
            TeamsError::InvalidTeam(_)
            | TeamsError::InvalidConfiguration(_)
            | TeamsError::MissingSecret(_)
            | TeamsError::ConfigIo { .. } => ErrorKind::Configuration,
            TeamsError::Other(_) => ErrorKind::Internal,
        }
    }
}

/// Failure classes reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    EmptyTask,
    DepthExceeded,
    ModelFailure,
    Cancelled,
    Configuration,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::EmptyTask => "empty_task",
            ErrorKind::DepthExceeded => "depth_exceeded",
            ErrorKind::ModelFailure => "model_failure",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Internal => "internal",
        }
    }
}
