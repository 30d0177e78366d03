use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::json;

use super::{ChatModel, ChatRequest, ChatResponse, LlmError};

/// Replays canned responses in order and records every request.
///
/// Used to drive graphs deterministically in tests and dry runs.
pub struct ScriptedModel {
    name: String,
    script: Mutex<VecDeque<Result<ChatResponse, LlmError>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedModel {
    pub fn new(responses: impl IntoIterator<Item = ChatResponse>) -> Self {
        Self {
            name: "scripted".to_string(),
            script: Mutex::new(responses.into_iter().map(Ok).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Supervisor-style replies: one `{"next": ...}` document per entry.
    pub fn routes<'a>(choices: impl IntoIterator<Item = &'a str>) -> Self {
        Self::new(
            choices
                .into_iter()
                .map(|choice| ChatResponse::text(json!({ "next": choice }).to_string())),
        )
    }

    pub fn push(&self, response: ChatResponse) {
        lock(&self.script).push_back(Ok(response));
    }

    pub fn push_error(&self, error: LlmError) {
        lock(&self.script).push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        lock(&self.requests).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }

    pub fn remaining(&self) -> usize {
        lock(&self.script).len()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn model_name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        lock(&self.requests).push(request);
        lock(&self.script)
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::parse_error("script exhausted".to_string())))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
