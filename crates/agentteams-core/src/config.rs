use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::{SecretValue, TeamsError, require_env};

const DEFAULT_CONFIG_PATH: &str = "config.toml";
const CONFIG_PATH_ENV: &str = "AGENTTEAMS_CONFIG";

/// Top-level configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub teams: TeamsConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Resolve the configured model API key (from environment only).
    pub fn llm_api_key(&self) -> Result<SecretValue, TeamsError> {
        require_env(&self.llm.api_key_env)
    }

    /// Resolve the search API key; absent keys leave the search tool reporting errors.
    pub fn search_api_key(&self) -> Option<SecretValue> {
        require_env(&self.tools.search_api_key_env).ok()
    }
}

/// Helper to load configuration with guard rails.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a provided path or discoverable defaults.
    ///
    /// Resolution order:
    /// 1. Explicit `path` argument.
    /// 2. `AGENTTEAMS_CONFIG` environment variable.
    /// 3. `config.toml` in the current working directory.
    ///
    /// Only the implicit `config.toml` may be absent, in which case defaults apply.
    pub fn load(path: Option<PathBuf>) -> Result<Config, TeamsError> {
        let (candidate, explicit) = resolve_path(path);
        if !explicit && !candidate.exists() {
            let config = Config::default();
            Self::validate(&config)?;
            return Ok(config);
        }

        let raw = fs::read_to_string(&candidate)
            .map_err(|err| TeamsError::config_io(candidate.clone(), err))?;
        let config = Self::parse(&raw)?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Parse configuration text without touching the environment.
    pub fn parse(raw: &str) -> Result<Config, TeamsError> {
        toml::from_str(raw).map_err(|err| TeamsError::InvalidConfiguration(err.to_string()))
    }

    fn validate(config: &Config) -> Result<(), TeamsError> {
        if config.llm.api_key_env.trim().is_empty() {
            return Err(TeamsError::InvalidConfiguration(
                "llm.api_key_env must reference an environment variable".into(),
            ));
        }
        if !config
            .llm
            .provider
            .eq_ignore_ascii_case(LlmConfig::OPENAI_COMPATIBLE)
        {
            return Err(TeamsError::InvalidConfiguration(format!(
                "unsupported llm.provider `{}`; only `{}` (any OpenAI-compatible base_url) is available",
                config.llm.provider,
                LlmConfig::OPENAI_COMPATIBLE
            )));
        }
        if config.teams.max_depth == 0
            || config.teams.team_max_turns == 0
            || config.teams.worker_max_tool_rounds == 0
        {
            return Err(TeamsError::InvalidConfiguration(
                "teams.max_depth, teams.team_max_turns and teams.worker_max_tool_rounds must be positive"
                    .into(),
            ));
        }
        Ok(())
    }
}

fn resolve_path(path: Option<PathBuf>) -> (PathBuf, bool) {
    if let Some(path) = path {
        return (path, true);
    }

    if let Ok(from_env) = env::var(CONFIG_PATH_ENV) {
        if !from_env.trim().is_empty() {
            return (PathBuf::from(from_env), true);
        }
    }

    (Path::new(DEFAULT_CONFIG_PATH).to_path_buf(), false)
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "LlmConfig::default_provider")]
    pub provider: String,
    #[serde(default = "LlmConfig::default_model")]
    pub model: String,
    #[serde(default = "LlmConfig::default_base_url")]
    pub base_url: String,
    #[serde(default = "LlmConfig::default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default = "LlmConfig::default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "LlmConfig::default_timeout_secs")]
    pub timeout_secs: u64,
}

impl LlmConfig {
    pub const OPENAI_COMPATIBLE: &'static str = "openai";

    fn default_provider() -> String {
        Self::OPENAI_COMPATIBLE.to_string()
    }

    fn default_model() -> String {
        "gpt-4o".to_string()
    }

    fn default_base_url() -> String {
        "https://api.openai.com/v1".to_string()
    }

    fn default_api_key_env() -> String {
        "OPENAI_API_KEY".to_string()
    }

    const fn default_max_retries() -> u32 {
        2
    }

    const fn default_timeout_secs() -> u64 {
        120
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: Self::default_provider(),
            model: Self::default_model(),
            base_url: Self::default_base_url(),
            api_key_env: Self::default_api_key_env(),
            temperature: None,
            max_retries: Self::default_max_retries(),
            timeout_secs: Self::default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TeamsConfig {
    /// Supervisor decisions allowed at the top level when a task does not say otherwise.
    #[serde(default = "TeamsConfig::default_max_depth")]
    pub max_depth: usize,
    /// Supervisor decisions allowed inside a nested team.
    #[serde(default = "TeamsConfig::default_team_max_turns")]
    pub team_max_turns: usize,
    #[serde(default = "TeamsConfig::default_worker_max_tool_rounds")]
    pub worker_max_tool_rounds: usize,
}

impl TeamsConfig {
    const fn default_max_depth() -> usize {
        crate::DEFAULT_MAX_DEPTH
    }

    const fn default_team_max_turns() -> usize {
        12
    }

    const fn default_worker_max_tool_rounds() -> usize {
        12
    }
}

impl Default for TeamsConfig {
    fn default() -> Self {
        Self {
            max_depth: Self::default_max_depth(),
            team_max_turns: Self::default_team_max_turns(),
            worker_max_tool_rounds: Self::default_worker_max_tool_rounds(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "ToolsConfig::default_working_dir")]
    pub working_dir: PathBuf,
    #[serde(default = "ToolsConfig::default_search_api_key_env")]
    pub search_api_key_env: String,
    #[serde(default = "ToolsConfig::default_search_max_results")]
    pub search_max_results: usize,
    #[serde(default = "ToolsConfig::default_python_binary")]
    pub python_binary: String,
    #[serde(default = "ToolsConfig::default_code_timeout_secs")]
    pub code_timeout_secs: u64,
    #[serde(default = "ToolsConfig::default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

impl ToolsConfig {
    fn default_working_dir() -> PathBuf {
        PathBuf::from("data/workspace")
    }

    fn default_search_api_key_env() -> String {
        "TAVILY_API_KEY".to_string()
    }

    const fn default_search_max_results() -> usize {
        5
    }

    fn default_python_binary() -> String {
        "python3".to_string()
    }

    const fn default_code_timeout_secs() -> u64 {
        30
    }

    const fn default_fetch_timeout_secs() -> u64 {
        30
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            working_dir: Self::default_working_dir(),
            search_api_key_env: Self::default_search_api_key_env(),
            search_max_results: Self::default_search_max_results(),
            python_binary: Self::default_python_binary(),
            code_timeout_secs: Self::default_code_timeout_secs(),
            fetch_timeout_secs: Self::default_fetch_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}
