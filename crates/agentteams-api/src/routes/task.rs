use agentteams_core::{AgentTask, HandoffRecord};
use axum::{
    Json, Router,
    body::Body,
    extract::{State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use futures::StreamExt;
use tracing::{info, instrument};

use crate::error::AppError;
use crate::state::AppState;

const TASK_ID_HEADER: &str = "x-task-id";

pub fn task_router() -> Router<AppState> {
    Router::new().route("/agentTask", post(agent_task))
}

#[instrument(name = "agent_task_request", skip_all)]
async fn agent_task(
    State(state): State<AppState>,
    payload: Result<Json<AgentTask>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(task) = payload.map_err(AppError::from)?;
    let permit = state.try_acquire()?;
    info!(stream = task.stream, max_depth = ?task.max_depth, "task received");

    if task.stream {
        let submitted = state.service().submit(task)?;
        info!(task_id = %submitted.task_id, "streaming task accepted");

        // the slot stays taken until the client stops reading
        let lines = submitted.events.map(move |event| {
            let _slot = &permit;
            event.to_ndjson()
        });
        return Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache")
            .header(TASK_ID_HEADER, submitted.task_id)
            .body(Body::from_stream(lines))
            .map_err(AppError::internal);
    }

    let outcome = state.service().run(task).await?;
    drop(permit);
    info!(task_id = %outcome.task_id, handoffs = outcome.handoffs.len(), "task completed");
    let handoffs: Vec<HandoffRecord> = outcome.handoffs;
    Ok(([(TASK_ID_HEADER, outcome.task_id)], Json(handoffs)).into_response())
}
