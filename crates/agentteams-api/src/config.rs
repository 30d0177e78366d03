use anyhow::{Context, Result};
use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub listen_addr: String,
    pub max_concurrent_tasks: usize,
    pub task_log_enabled: bool,
}

impl AppConfig {
    const DEFAULT_LISTEN_ADDR: &'static str = "0.0.0.0:8000";
    const DEFAULT_MAX_CONCURRENT_TASKS: usize = 5;

    pub fn from_env() -> Result<Self> {
        let listen_addr = env::var("AGENTTEAMS_LISTEN_ADDR")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| Self::DEFAULT_LISTEN_ADDR.to_string());

        let max_concurrent_tasks = match env::var("AGENTTEAMS_MAX_CONCURRENT_TASKS") {
            Ok(value) => value
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|value| *value > 0)
                .with_context(|| "AGENTTEAMS_MAX_CONCURRENT_TASKS must be a positive integer")?,
            Err(_) => Self::DEFAULT_MAX_CONCURRENT_TASKS,
        };

        let task_log_enabled = match env::var("AGENTTEAMS_TASK_LOG") {
            Ok(value) => {
                parse_bool(&value).with_context(|| "AGENTTEAMS_TASK_LOG must be true or false")?
            }
            Err(_) => true,
        };

        Ok(Self {
            listen_addr,
            max_concurrent_tasks,
            task_log_enabled,
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: Self::DEFAULT_LISTEN_ADDR.to_string(),
            max_concurrent_tasks: Self::DEFAULT_MAX_CONCURRENT_TASKS,
            task_log_enabled: true,
        }
    }
}

fn parse_bool(input: &str) -> Option<bool> {
    match input.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert_eq!(parse_bool(" Yes "), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.listen_addr, "0.0.0.0:8000");
        assert_eq!(config.max_concurrent_tasks, 5);
        assert!(config.task_log_enabled);
    }
}
