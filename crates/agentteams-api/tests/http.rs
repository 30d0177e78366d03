use std::sync::Arc;

use agentteams_api::config::AppConfig;
use agentteams_api::routes::build_router;
use agentteams_api::state::AppState;
use agentteams_core::llm::{ChatResponse, LlmError, ScriptedModel};
use agentteams_core::{Agent, Message, TaskLog, TaskService, TeamGraph, TeamsError};
use async_trait::async_trait;
use axum_test::TestServer;
use serde_json::{Value, json};

struct Canned {
    name: &'static str,
    reply: &'static str,
}

#[async_trait]
impl Agent for Canned {
    fn name(&self) -> &str {
        self.name
    }

    async fn run(&self, _history: &[Message]) -> Result<Message, TeamsError> {
        Ok(Message::assistant(self.reply))
    }
}

fn base_config(max_tasks: usize) -> AppConfig {
    AppConfig {
        listen_addr: "127.0.0.1:0".into(),
        max_concurrent_tasks: max_tasks,
        task_log_enabled: false,
    }
}

fn state_with(script: &[&str], max_tasks: usize) -> (AppState, Arc<ScriptedModel>) {
    let model = Arc::new(ScriptedModel::routes(script.iter().copied()));
    let graph = TeamGraph::builder("agent_teams")
        .add_worker(Arc::new(Canned {
            name: "research_team",
            reply: "found three sources",
        }))
        .add_worker(Arc::new(Canned {
            name: "writing_team",
            reply: "Document saved to report.md",
        }))
        .build(model.clone())
        .unwrap();
    let service = TaskService::new(Arc::new(graph));
    (AppState::new(service, &base_config(max_tasks)), model)
}

fn ndjson(text: &str) -> Vec<Value> {
    text.lines()
        .map(|line| serde_json::from_str(line).expect("each line is JSON"))
        .collect()
}

#[tokio::test]
async fn health_reports_capacity() {
    let (state, _) = state_with(&[], 3);
    let server = TestServer::new(build_router(state)).unwrap();

    let response = server.get("/health/live").await;
    assert_eq!(response.status_code(), 200);
    let body = response.json::<Value>();
    assert_eq!(body["status"], "ok");
    assert_eq!(
        body["capacity"],
        json!({"max_tasks": 3, "available_permits": 3, "running_tasks": 0})
    );

    let response = server.get("/health/ready").await;
    assert_eq!(response.status_code(), 200);
}

#[tokio::test]
async fn buffered_task_returns_handoff_array() {
    let (state, model) = state_with(&["research_team", "writing_team", "FINISH"], 2);
    let server = TestServer::new(build_router(state)).unwrap();

    let response = server
        .post("/agentTask")
        .json(&json!({ "messages": ["Write a report on Rust"] }))
        .await;
    assert_eq!(response.status_code(), 200);
    assert!(response.headers().contains_key("x-task-id"));

    let body = response.json::<Value>();
    assert_eq!(
        body,
        json!([
            {"currentAgent": "supervisor", "nextAgent": "research_team", "messages": "Routing to next node: research_team"},
            {"currentAgent": "research_team", "nextAgent": "supervisor", "messages": "found three sources"},
            {"currentAgent": "supervisor", "nextAgent": "writing_team", "messages": "Routing to next node: writing_team"},
            {"currentAgent": "writing_team", "nextAgent": "supervisor", "messages": "Document saved to report.md"},
            {"currentAgent": "supervisor", "nextAgent": "FINISH", "messages": "Routing to next node: FINISH"}
        ])
    );
    assert_eq!(model.remaining(), 0);
}

#[tokio::test]
async fn streamed_task_emits_ndjson_lines() {
    let (state, _) = state_with(&["writing_team", "FINISH"], 2);
    let server = TestServer::new(build_router(state)).unwrap();

    let response = server
        .post("/agentTask")
        .json(&json!({ "messages": ["Draft an outline"], "stream": true }))
        .await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.headers()["content-type"], "text/event-stream");

    let lines = ndjson(&response.text());
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["nextAgent"], "writing_team");
    assert_eq!(lines[1]["currentAgent"], "writing_team");
    assert_eq!(lines[1]["messages"], "Document saved to report.md");
    assert_eq!(lines[2]["nextAgent"], "FINISH");
}

#[tokio::test]
async fn stream_failure_arrives_as_final_error_line() {
    let (state, _) = state_with(&["research_team", "research_team"], 2);
    let server = TestServer::new(build_router(state)).unwrap();

    let response = server
        .post("/agentTask")
        .json(&json!({ "messages": ["loop forever"], "stream": true, "max_depth": 1 }))
        .await;
    assert_eq!(response.status_code(), 200);

    let lines = ndjson(&response.text());
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[1]["currentAgent"], "research_team");
    assert_eq!(lines[2]["error"]["kind"], "depth_exceeded");
    assert!(lines[2]["error"]["message"].as_str().unwrap().contains("agent_teams"));
}

#[tokio::test]
async fn empty_task_is_rejected_before_any_model_call() {
    let (state, model) = state_with(&["research_team"], 2);
    let server = TestServer::new(build_router(state)).unwrap();

    for body in [json!({ "messages": [] }), json!({ "messages": ["   "], "stream": true })] {
        let response = server.post("/agentTask").json(&body).await;
        assert_eq!(response.status_code(), 400);
        let payload = response.json::<Value>();
        assert_eq!(payload["error"]["kind"], "empty_task");
    }
    assert_eq!(model.call_count(), 0);
}

#[tokio::test]
async fn failures_map_to_statuses() {
    let (state, _) = state_with(&["nobody"], 2);
    let server = TestServer::new(build_router(state)).unwrap();
    let response = server
        .post("/agentTask")
        .json(&json!({ "messages": ["hi"] }))
        .await;
    assert_eq!(response.status_code(), 502);
    assert_eq!(response.json::<Value>()["error"]["kind"], "model_failure");

    let (state, _) = state_with(&["research_team", "research_team"], 2);
    let server = TestServer::new(build_router(state)).unwrap();
    let response = server
        .post("/agentTask")
        .json(&json!({ "messages": ["hi"], "max_depth": 1 }))
        .await;
    assert_eq!(response.status_code(), 422);
    assert_eq!(response.json::<Value>()["error"]["kind"], "depth_exceeded");
}

#[tokio::test]
async fn malformed_bodies_get_json_errors() {
    let (state, model) = state_with(&["FINISH"], 2);
    let server = TestServer::new(build_router(state)).unwrap();

    let response = server
        .post("/agentTask")
        .json(&json!({ "messages": "not-a-list" }))
        .await;
    assert_eq!(response.status_code(), 422);
    let payload = response.json::<Value>();
    assert_eq!(payload["error"]["kind"], "invalid_request");
    assert!(payload["error"]["message"].as_str().unwrap().contains("messages"));

    let response = server
        .post("/agentTask")
        .text(r#"{"messages": ["hi"]}"#)
        .await;
    assert_eq!(response.status_code(), 415);
    assert_eq!(response.json::<Value>()["error"]["kind"], "invalid_request");
    assert_eq!(model.call_count(), 0);
}

#[tokio::test]
async fn model_error_mid_task_streams_model_failure_line() {
    let (state, model) = state_with(&[], 2);
    model.push(ChatResponse::text(r#"{"next": "research_team"}"#));
    model.push_error(LlmError::server_error(503, "overloaded".into()));
    let server = TestServer::new(build_router(state)).unwrap();

    let response = server
        .post("/agentTask")
        .json(&json!({ "messages": ["hi"], "stream": true }))
        .await;
    assert_eq!(response.status_code(), 200);

    let lines = ndjson(&response.text());
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["nextAgent"], "research_team");
    assert_eq!(lines[1]["messages"], "found three sources");
    assert_eq!(lines[2]["error"]["kind"], "model_failure");
    assert!(lines[2]["error"]["message"].as_str().unwrap().contains("overloaded"));
    assert_eq!(model.remaining(), 0);
}

#[tokio::test]
async fn requests_over_capacity_get_429() {
    let (state, model) = state_with(&["FINISH"], 1);
    let held = state.try_acquire().unwrap();
    let server = TestServer::new(build_router(state.clone())).unwrap();

    let response = server
        .post("/agentTask")
        .json(&json!({ "messages": ["hi"] }))
        .await;
    assert_eq!(response.status_code(), 429);
    assert_eq!(response.json::<Value>()["error"]["kind"], "at_capacity");
    assert_eq!(server.get("/health/ready").await.status_code(), 503);
    assert_eq!(model.call_count(), 0);

    drop(held);
    let response = server
        .post("/agentTask")
        .json(&json!({ "messages": ["hi"] }))
        .await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(state.capacity().available_permits, 1);
}

#[tokio::test]
async fn finished_tasks_are_written_to_the_task_log() {
    let dir = tempfile::tempdir().unwrap();
    let model = Arc::new(ScriptedModel::routes(["FINISH"]));
    let graph = TeamGraph::builder("agent_teams")
        .add_worker(Arc::new(Canned {
            name: "research_team",
            reply: "unused",
        }))
        .build(model)
        .unwrap();
    let service =
        TaskService::new(Arc::new(graph)).with_task_log(TaskLog::new(dir.path(), 0));
    let server = TestServer::new(build_router(AppState::new(service, &base_config(1)))).unwrap();

    let response = server
        .post("/agentTask")
        .json(&json!({ "messages": ["hi"] }))
        .await;
    assert_eq!(response.status_code(), 200);

    let logged = std::fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(logged, 1, "year directory expected");
}
