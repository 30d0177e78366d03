use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::{Tool, ToolError, parse_args};

static TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("invalid title regex"));
static NON_CONTENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style|noscript|head)\b[^>]*>.*?</(script|style|noscript|head)>")
        .expect("invalid non-content regex")
});
static COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").expect("invalid comment regex"));
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]+>").expect("invalid tag regex"));
static BLANK_RUNS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n{3,}").expect("invalid blank-run regex"));

/// Fetches pages and returns their readable text.
pub struct ScrapeWebpages {
    client: Client,
}

impl ScrapeWebpages {
    pub fn new(timeout: Duration) -> Result<Self, ToolError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("agentteams/0.1")
            .build()?;
        Ok(Self { client })
    }

    async fn fetch(&self, url: &str) -> Result<String, ToolError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Http(format!("{url} returned {status}")));
        }
        Ok(response.text().await?)
    }
}

#[derive(Deserialize)]
struct ScrapeArgs {
    urls: Vec<String>,
}

/// Title and visible text of an HTML page.
pub fn html_to_text(html: &str) -> (String, String) {
    let title = TITLE
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| decode_entities(m.as_str().trim()))
        .unwrap_or_default();

    let body = NON_CONTENT.replace_all(html, "");
    let body = COMMENT.replace_all(&body, "");
    let body = TAG.replace_all(&body, "\n");
    let text = decode_entities(&body)
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n");
    let text = BLANK_RUNS.replace_all(text.trim(), "\n\n").into_owned();
    (title, text)
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

#[async_trait]
impl Tool for ScrapeWebpages {
    fn name(&self) -> &str {
        "scrape_webpages"
    }

    fn description(&self) -> &str {
        "Use requests and bs4 to scrape the provided web pages for detailed information."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "urls": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["urls"]
        })
    }

    async fn call(&self, arguments: Value) -> Result<String, ToolError> {
        let args: ScrapeArgs = parse_args(arguments)?;
        if args.urls.is_empty() {
            return Err(ToolError::InvalidArguments("urls must not be empty".into()));
        }

        let mut documents = Vec::with_capacity(args.urls.len());
        for url in &args.urls {
            let html = self.fetch(url).await?;
            let (title, text) = html_to_text(&html);
            debug!(url = %url, chars = text.len(), "page scraped");
            documents.push(format!("<Document name=\"{title}\">\n{text}\n</Document>"));
        }
        Ok(documents.join("\n\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markup_scripts_and_styles() {
        let html = r#"<html><head><title>Rust &amp; You</title><style>p{}</style></head>
            <body><script>alert(1)</script><h1>Hello</h1><!-- hidden --><p>Fast &lt;and&gt; safe</p></body></html>"#;
        let (title, text) = html_to_text(html);
        assert_eq!(title, "Rust & You");
        assert!(text.contains("Hello"));
        assert!(text.contains("Fast <and> safe"));
        assert!(!text.contains("alert"));
        assert!(!text.contains("hidden"));
        assert!(!text.contains("p{}"));
    }

    #[tokio::test]
    async fn empty_url_list_is_rejected() {
        let tool = ScrapeWebpages::new(Duration::from_secs(1)).unwrap();
        let err = tool.call(json!({"urls": []})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
