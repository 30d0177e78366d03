use std::time::Duration;

use agentteams_core::SecretValue;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use super::{Tool, ToolError, parse_args};

const TAVILY_ENDPOINT: &str = "https://api.tavily.com/search";

/// Web search through the Tavily API.
pub struct TavilySearch {
    client: Client,
    endpoint: String,
    api_key: Option<SecretValue>,
    max_results: usize,
}

impl TavilySearch {
    pub fn new(
        api_key: Option<SecretValue>,
        max_results: usize,
        timeout: Duration,
    ) -> Result<Self, ToolError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: TAVILY_ENDPOINT.to_string(),
            api_key,
            max_results,
        })
    }

    /// Point the client at another endpoint, e.g. a proxy.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
}

#[derive(Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
}

#[derive(Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize, Serialize, PartialEq)]
struct TavilyResult {
    url: String,
    content: String,
}

fn format_results(body: &str) -> Result<String, ToolError> {
    let parsed: TavilyResponse = serde_json::from_str(body)
        .map_err(|err| ToolError::Http(format!("unexpected search response: {err}")))?;
    serde_json::to_string(&parsed.results)
        .map_err(|err| ToolError::Http(format!("failed to encode search results: {err}")))
}

#[async_trait]
impl Tool for TavilySearch {
    fn name(&self) -> &str {
        "tavily_search"
    }

    fn description(&self) -> &str {
        "A search engine optimized for comprehensive, accurate, and trusted results. \
         Useful for when you need to answer questions about current events. Input should be a search query."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "search query to look up"}
            },
            "required": ["query"]
        })
    }

    async fn call(&self, arguments: Value) -> Result<String, ToolError> {
        let args: SearchArgs = parse_args(arguments)?;
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| ToolError::MissingCredential("search API key is not configured".into()))?;

        let response = self
            .client
            .post(&self.endpoint)
            .json(&TavilyRequest {
                api_key: api_key.expose(),
                query: &args.query,
                max_results: self.max_results,
            })
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ToolError::Http(format!("search returned {status}: {body}")));
        }

        debug!(query = %args.query, "search completed");
        format_results(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_keep_url_and_content_only() {
        let body = r#"{
            "query": "rust",
            "results": [
                {"title": "Rust", "url": "https://www.rust-lang.org", "content": "A language", "score": 0.9}
            ]
        }"#;
        let formatted: Value = serde_json::from_str(&format_results(body).unwrap()).unwrap();
        assert_eq!(
            formatted,
            json!([{"url": "https://www.rust-lang.org", "content": "A language"}])
        );
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let tool = TavilySearch::new(None, 5, Duration::from_secs(1)).unwrap();
        let err = tool.call(json!({"query": "rust"})).await.unwrap_err();
        assert!(matches!(err, ToolError::MissingCredential(_)));
    }
}
