use axum::http::StatusCode;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::models::SessionStatus;
use crate::services::oracle::OracleError;

/// Why a call was refused before reaching the learning API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "status", rename_all = "snake_case")]
pub enum Rejection {
    BlankAnswer,
    BlankDescription,
    SessionClosed(SessionStatus),
    AlreadyReported,
    CaseCompleted,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::BlankAnswer => write!(f, "answer must not be blank"),
            Rejection::BlankDescription => write!(f, "report description must not be blank"),
            Rejection::SessionClosed(status) => {
                write!(f, "session no longer accepts answers ({})", status.as_str())
            }
            Rejection::AlreadyReported => write!(f, "a problem report was already filed"),
            Rejection::CaseCompleted => write!(f, "case is already completed"),
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(Rejection),

    #[error("another operation is already in flight for this session")]
    Busy,

    #[error("learning API unavailable: {0}")]
    Transient(String),

    #[error("learning API error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("session was discarded before the response arrived")]
    Stale,

    #[error("{0} not found")]
    NotFound(String),
}

impl EngineError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            EngineError::Busy => StatusCode::CONFLICT,
            EngineError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::Server { .. } => StatusCode::BAD_GATEWAY,
            EngineError::Stale => StatusCode::GONE,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    /// Label used for the rejection metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation",
            EngineError::Busy => "busy",
            EngineError::Transient(_) => "transient",
            EngineError::Server { .. } => "server",
            EngineError::Stale => "stale",
            EngineError::NotFound(_) => "not_found",
        }
    }
}

impl From<Rejection> for EngineError {
    fn from(rejection: Rejection) -> Self {
        EngineError::Validation(rejection)
    }
}

impl From<OracleError> for EngineError {
    fn from(err: OracleError) -> Self {
        match err {
            OracleError::Transient(message) => EngineError::Transient(message),
            OracleError::Rejected { status, message } => EngineError::Server { status, message },
            OracleError::Malformed(message) => EngineError::Server {
                status: StatusCode::BAD_GATEWAY.as_u16(),
                message,
            },
        }
    }
}
