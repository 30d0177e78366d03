use agentteams_core::{ErrorKind, TeamsError};
use axum::{Json, extract::rejection::JsonRejection, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::fmt;

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl AppError {
    pub fn new(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
        }
    }

    pub fn internal(error: impl ToString) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Internal.as_str(),
            error.to_string(),
        )
    }

    pub fn at_capacity(max_tasks: usize) -> Self {
        Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            "at_capacity",
            format!("all {max_tasks} task slots are busy, retry later"),
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

/// HTTP status for each failure class.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::EmptyTask => StatusCode::BAD_REQUEST,
        ErrorKind::DepthExceeded => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::ModelFailure => StatusCode::BAD_GATEWAY,
        ErrorKind::Cancelled | ErrorKind::Configuration | ErrorKind::Internal => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl From<TeamsError> for AppError {
    fn from(error: TeamsError) -> Self {
        let kind = error.kind();
        Self::new(status_for(kind), kind.as_str(), error.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(rejection.status(), "invalid_request", rejection.body_text())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::internal(error)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    kind: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let payload = ErrorResponse {
            error: ErrorBody {
                kind: self.kind,
                message: self.message,
            },
        };
        (self.status, Json(payload)).into_response()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for AppError {}
