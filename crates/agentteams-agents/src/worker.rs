//! Tool-using worker driven by the model's tool calls.

use std::sync::Arc;

use agentteams_core::llm::{ChatMessage, ChatModel, ChatRequest, ToolCall, ToolDefinition};
use agentteams_core::{Agent, Message, Role, TeamsError, record_tool_call};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::tools::{DocumentStore, Tool, ToolError};

/// Tool rounds a worker may take before it must answer.
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 12;

pub struct ToolAgent {
    name: String,
    instructions: Option<String>,
    tools: Vec<Arc<dyn Tool>>,
    model: Arc<dyn ChatModel>,
    max_rounds: usize,
    workspace: Option<DocumentStore>,
}

impl ToolAgent {
    pub fn new(name: impl Into<String>, model: Arc<dyn ChatModel>, tools: Vec<Arc<dyn Tool>>) -> Self {
        Self {
            name: name.into(),
            instructions: None,
            tools,
            model,
            max_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            workspace: None,
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// List the files of `store` in the system prompt of every run.
    pub fn with_workspace_listing(mut self, store: DocumentStore) -> Self {
        self.workspace = Some(store);
        self
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|tool| tool.name()).collect()
    }

    async fn system_prompt(&self) -> Option<String> {
        let listing = match &self.workspace {
            Some(store) => {
                let files = match store.list().await {
                    Ok(files) if !files.is_empty() => files.join("\n"),
                    Ok(_) => "No files written.".to_string(),
                    Err(err) => {
                        warn!(error = %err, "failed to list working directory");
                        "No files written.".to_string()
                    }
                };
                Some(format!("Below are files currently in your directory:\n{files}"))
            }
            None => None,
        };

        match (&self.instructions, listing) {
            (Some(instructions), Some(listing)) => Some(format!("{instructions}\n{listing}")),
            (Some(instructions), None) => Some(instructions.clone()),
            (None, listing) => listing,
        }
    }

    async fn invoke(&self, call: &ToolCall) -> String {
        let name = call.function.name.as_str();
        let result = match self.tools.iter().find(|tool| tool.name() == name) {
            Some(tool) => match parse_arguments(&call.function.arguments) {
                Ok(arguments) => tool.call(arguments).await,
                Err(err) => Err(err),
            },
            None => Err(ToolError::UnknownTool(name.to_string())),
        };

        match result {
            Ok(output) => {
                record_tool_call(name, "ok");
                debug!(worker = %self.name, tool = name, chars = output.len(), "tool succeeded");
                output
            }
            Err(err) => {
                record_tool_call(name, "error");
                warn!(worker = %self.name, tool = name, error = %err, "tool failed");
                format!("Error: {err}")
            }
        }
    }
}

fn parse_arguments(raw: &str) -> Result<Value, ToolError> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(raw).map_err(|err| ToolError::InvalidArguments(err.to_string()))
}

#[async_trait]
impl Agent for ToolAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, history: &[Message]) -> Result<Message, TeamsError> {
        let mut messages: Vec<ChatMessage> = Vec::with_capacity(history.len() + 1);
        if let Some(prompt) = self.system_prompt().await {
            messages.push(ChatMessage::new(Role::System, prompt));
        }
        messages.extend(history.iter().map(ChatMessage::from));
        let definitions: Vec<ToolDefinition> =
            self.tools.iter().map(|tool| tool.definition()).collect();

        let mut rounds = 0usize;
        loop {
            let request = ChatRequest::new(messages.clone()).with_tools(definitions.clone());
            let response = self.model.complete(request).await?;

            if response.tool_calls.is_empty() {
                info!(worker = %self.name, rounds, "worker answered");
                return Ok(Message::named(
                    self.name.clone(),
                    response.content.unwrap_or_default(),
                ));
            }
            if rounds >= self.max_rounds {
                warn!(worker = %self.name, rounds, "tool round limit reached");
                return Err(TeamsError::depth_exceeded(self.name.clone(), self.max_rounds));
            }
            rounds += 1;

            let calls = response.tool_calls;
            messages.push(ChatMessage::tool_request(response.content, calls.clone()));
            for call in &calls {
                let output = self.invoke(call).await;
                messages.push(ChatMessage::tool_result(call.id.clone(), output));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentteams_core::llm::{ChatResponse, ScriptedModel};
    use serde_json::json;

    struct Upper;

    #[async_trait]
    impl Tool for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        fn description(&self) -> &str {
            "Uppercase text."
        }

        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }

        async fn call(&self, arguments: Value) -> Result<String, ToolError> {
            arguments["text"]
                .as_str()
                .map(str::to_uppercase)
                .ok_or_else(|| ToolError::InvalidArguments("text is required".into()))
        }
    }

    fn call(id: &str, name: &str, arguments: Value) -> ToolCall {
        ToolCall::new(id, name, &arguments)
    }

    #[tokio::test]
    async fn answers_directly_without_tools() {
        let model = Arc::new(ScriptedModel::new([ChatResponse::text("done")]));
        let agent = ToolAgent::new("search", model.clone(), vec![Arc::new(Upper)]);
        assert_eq!(agent.tool_names(), vec!["upper"]);

        let reply = agent.run(&[Message::user("hi")]).await.unwrap();
        assert_eq!(reply, Message::named("search", "done"));
        let request = &model.requests()[0];
        assert_eq!(request.tools.len(), 1);
        assert_eq!(request.tools[0].function.name, "upper");
    }

    #[tokio::test]
    async fn tool_results_are_fed_back_in_order() {
        let model = Arc::new(ScriptedModel::new([
            ChatResponse::with_tool_calls(vec![
                call("c1", "upper", json!({"text": "a"})),
                call("c2", "missing", json!({})),
                call("c3", "upper", json!({})),
            ]),
            ChatResponse::text("final"),
        ]));
        let agent = ToolAgent::new("worker", model.clone(), vec![Arc::new(Upper)])
            .with_instructions("Be brief.");

        let reply = agent.run(&[Message::user("go")]).await.unwrap();
        assert_eq!(reply.content, "final");

        let second = &model.requests()[1];
        // system, user, assistant tool request, three results
        assert_eq!(second.messages.len(), 6);
        assert_eq!(second.messages[0].text(), Some("Be brief."));
        assert_eq!(second.messages[2].tool_calls.len(), 3);
        assert_eq!(second.messages[3].text(), Some("A"));
        assert_eq!(second.messages[3].tool_call_id.as_deref(), Some("c1"));
        assert_eq!(second.messages[4].text(), Some("Error: unknown tool `missing`"));
        assert!(second.messages[5].text().unwrap().starts_with("Error: invalid arguments"));
    }

    #[tokio::test]
    async fn round_limit_is_a_depth_failure() {
        let looping = || ChatResponse::with_tool_calls(vec![call("c", "upper", json!({"text": "x"}))]);
        let model = Arc::new(ScriptedModel::new([looping(), looping(), looping()]));
        let agent = ToolAgent::new("worker", model.clone(), vec![Arc::new(Upper)]).with_max_rounds(2);

        let err = agent.run(&[Message::user("go")]).await.unwrap_err();
        assert!(matches!(err, TeamsError::DepthExceeded { limit: 2, .. }));
        assert_eq!(model.call_count(), 3);
    }

    #[tokio::test]
    async fn workspace_listing_is_added_to_the_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::open(dir.path()).unwrap();
        std::fs::write(dir.path().join("outline.txt"), "1. Intro\n").unwrap();

        let model = Arc::new(ScriptedModel::new([ChatResponse::text("ok")]));
        let agent = ToolAgent::new("note_taker", model.clone(), Vec::new())
            .with_instructions("Take notes.")
            .with_workspace_listing(store);
        agent.run(&[Message::user("go")]).await.unwrap();

        let prompt = model.requests()[0].messages[0].text().unwrap().to_string();
        assert_eq!(
            prompt,
            "Take notes.\nBelow are files currently in your directory:\noutline.txt"
        );
    }

    #[tokio::test]
    async fn model_failure_propagates() {
        let model = Arc::new(ScriptedModel::new(Vec::<ChatResponse>::new()));
        let agent = ToolAgent::new("worker", model, Vec::new());
        let err = agent.run(&[Message::user("go")]).await.unwrap_err();
        assert!(matches!(err, TeamsError::Model(_)));
    }
}
