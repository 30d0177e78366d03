use std::sync::Arc;

use agentteams_core::llm::{ChatResponse, LlmError, ScriptedModel};
use agentteams_core::{
    Agent, AgentTask, ErrorKind, Message, TaskEvent, TaskLog, TaskService, TeamGraph, TeamsError,
};
use async_trait::async_trait;
use tokio_stream::StreamExt;

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

/// Top graph over two nested teams; all supervisors share one script.
fn hierarchy(script: &[&str]) -> (Arc<TeamGraph>, Arc<ScriptedModel>) {
    let model = Arc::new(ScriptedModel::routes(script.iter().copied()));
    let research = TeamGraph::builder("research_team")
        .add_worker(Arc::new(Canned {
            name: "search",
            reply: "three sources",
        }))
        .build(model.clone())
        .unwrap();
    let writing = TeamGraph::builder("writing_team")
        .add_worker(Arc::new(Canned {
            name: "doc_writer",
            reply: "Document saved to report.md",
        }))
        .build(model.clone())
        .unwrap();
    let top = TeamGraph::builder("supervisor_graph")
        .add_worker(Arc::new(research))
        .add_worker(Arc::new(writing))
        .build(model.clone())
        .unwrap();
    (Arc::new(top), model)
}

#[tokio::test]
async fn stream_reports_only_top_level_handoffs_in_order() {
    // top -> research(search, FINISH) -> top -> writing(doc_writer, FINISH) -> top FINISH
    let (graph, _) = hierarchy(&[
        "research_team",
        "search",
        "FINISH",
        "writing_team",
        "doc_writer",
        "FINISH",
        "FINISH",
    ]);
    let service = TaskService::new(graph);
    let stream = service.submit(AgentTask::new("write a report").streaming(true)).unwrap();
    let events: Vec<TaskEvent> = stream.events.collect().await;

    let pairs: Vec<(String, String)> = events
        .iter()
        .map(|event| {
            let record = event.as_handoff().expect("no failure expected");
            (record.current_agent.clone(), record.next_agent.clone())
        })
        .collect();
    let expected = [
        ("supervisor", "research_team"),
        ("research_team", "supervisor"),
        ("supervisor", "writing_team"),
        ("writing_team", "supervisor"),
        ("supervisor", "FINISH"),
    ];
    assert_eq!(
        pairs,
        expected
            .iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect::<Vec<_>>()
    );
    assert_eq!(
        events[1].as_handoff().unwrap().messages,
        "three sources",
        "team output is the last message of its transcript"
    );
    assert_eq!(
        events[0].as_handoff().unwrap().messages,
        "Routing to next node: research_team"
    );
}

#[tokio::test]
async fn run_buffers_records_and_returns_final_message() {
    let (graph, _) = hierarchy(&["writing_team", "doc_writer", "FINISH", "FINISH"]);
    let outcome = TaskService::new(graph)
        .run(AgentTask::new("draft"))
        .await
        .unwrap();

    assert_eq!(outcome.handoffs.len(), 3);
    let result = outcome.result.unwrap();
    assert_eq!(result.author(), Some("writing_team"));
    assert_eq!(result.content, "Document saved to report.md");
}

#[tokio::test]
async fn empty_task_fails_before_any_model_call() {
    let (graph, model) = hierarchy(&["research_team"]);
    let service = TaskService::new(graph);

    let err = service
        .submit(AgentTask {
            messages: Vec::new(),
            ..AgentTask::new("")
        })
        .err()
        .unwrap();
    assert!(matches!(err, TeamsError::EmptyTask));
    assert_eq!(model.call_count(), 0);
}

#[tokio::test]
async fn depth_exhaustion_ends_stream_with_error_frame() {
    let (graph, _) = hierarchy(&[
        "research_team",
        "FINISH",
        "research_team",
        "FINISH",
        "research_team",
    ]);
    let stream = TaskService::new(graph)
        .submit(AgentTask::new("loop forever").with_max_depth(2))
        .unwrap();
    let events: Vec<TaskEvent> = stream.events.collect().await;

    // two decisions and two team runs, then the failure
    assert_eq!(events.len(), 5);
    match events.last().unwrap() {
        TaskEvent::Failed { error } => assert_eq!(error.kind, ErrorKind::DepthExceeded),
        other => panic!("expected failure frame, got {other:?}"),
    }
}

#[tokio::test]
async fn off_roster_answer_is_a_model_failure() {
    let (graph, _) = hierarchy(&["marketing_team"]);
    let err = TaskService::new(graph)
        .run(AgentTask::new("task"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ModelFailure);
}

#[tokio::test]
async fn finished_tasks_are_appended_to_the_task_log() {
    let dir = tempfile::tempdir().unwrap();
    let (graph, _) = hierarchy(&["FINISH"]);
    let service = TaskService::new(graph).with_task_log(TaskLog::new(dir.path(), 0));

    service.run(AgentTask::new("nothing to do")).await.unwrap();

    let mut logs = Vec::new();
    for year in std::fs::read_dir(dir.path()).unwrap() {
        for month in std::fs::read_dir(year.unwrap().path()).unwrap() {
            logs.push(month.unwrap().path().join("tasks.jsonl"));
        }
    }
    assert_eq!(logs.len(), 1);
    let line: serde_json::Value =
        serde_json::from_str(std::fs::read_to_string(&logs[0]).unwrap().trim()).unwrap();
    assert_eq!(line["status"], "ok");
    assert_eq!(line["prompt"], "nothing to do");
    assert_eq!(line["handoffs"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn configured_default_depth_applies_when_task_omits_it() {
    let (graph, _) = hierarchy(&["research_team", "FINISH", "research_team"]);
    let service = TaskService::new(graph).with_default_max_depth(1);
    assert_eq!(service.default_max_depth(), 1);

    let err = service.run(AgentTask::new("loop")).await.unwrap_err();
    assert!(matches!(err, TeamsError::DepthExceeded { limit: 1, .. }));

    let (graph, _) = hierarchy(&["research_team", "FINISH", "FINISH"]);
    let outcome = TaskService::new(graph)
        .with_default_max_depth(1)
        .run(AgentTask::new("once").with_max_depth(2))
        .await
        .unwrap();
    assert_eq!(outcome.handoffs.len(), 3);
}

#[tokio::test]
async fn model_error_inside_a_team_ends_stream_with_model_failure() {
    let (graph, model) = hierarchy(&["research_team"]);
    model.push(ChatResponse::text(r#"{"next": "search"}"#));
    model.push_error(LlmError::server_error(503, "overloaded".into()));

    let stream = TaskService::new(graph)
        .submit(AgentTask::new("research").streaming(true))
        .unwrap();
    let events: Vec<TaskEvent> = stream.events.collect().await;

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].as_handoff().unwrap().next_agent, "research_team");
    match &events[1] {
        TaskEvent::Failed { error } => {
            assert_eq!(error.kind, ErrorKind::ModelFailure);
            assert!(error.message.contains("overloaded"));
        }
        other => panic!("expected failure frame, got {other:?}"),
    }
    assert_eq!(model.remaining(), 0);
}
