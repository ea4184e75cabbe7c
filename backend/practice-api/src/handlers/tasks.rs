use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use super::{bearer_token, reject, validate};
use crate::{
    models::{
        answer::{SubmitAnswerRequest, SubmitAnswerResponse},
        report::{FileReportRequest, FileReportResponse},
        task::{OpenTaskRequest, OpenTaskResponse},
        InteractionSession,
    },
    services::{
        attempt_ledger::AttemptLedger,
        disclosure_gate::DisclosureGate,
        registry::TaskEntry,
        report_lock::ReportLock,
        session_cell::SessionCell,
        AppState,
    },
};

/// POST /api/v1/tasks
pub async fn open_task(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<OpenTaskRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    validate(&req)?;
    tracing::info!(
        "Opening learning-mode task: grade={}, topic={}, lesson={}, difficulty={:?}",
        req.grade_id,
        req.topic_id,
        req.lesson_id,
        req.difficulty
    );

    let oracle = state.oracle_for(bearer_token(&headers));
    let unit = oracle
        .open_task(&req)
        .await
        .map_err(|e| reject(e.into()))?;

    let cell = Arc::new(SessionCell::new(InteractionSession::new(unit)));
    let session = cell.snapshot();
    let session_id = state.registry.insert_task(TaskEntry { cell, oracle });

    tracing::info!("Task session {} opened for {}", session_id, session.handle);

    Ok((
        StatusCode::CREATED,
        Json(OpenTaskResponse {
            session_id,
            session,
        }),
    ))
}

/// GET /api/v1/tasks/{id}
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let entry = state.registry.task(session_id).map_err(reject)?;
    Ok(Json(entry.cell.snapshot()))
}

/// DELETE /api/v1/tasks/{id}
pub async fn discard_task(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state.registry.remove_task(session_id).map_err(reject)?;
    tracing::info!("Task session {} discarded", session_id);
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/tasks/{id}/attempts
pub async fn submit_attempt(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<SubmitAnswerRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    validate(&req)?;
    let entry = state.registry.task(session_id).map_err(reject)?;

    let outcome = AttemptLedger::new(entry.oracle.clone())
        .submit_attempt(&entry.cell, &req.answer)
        .await
        .map_err(reject)?;

    Ok(Json(SubmitAnswerResponse {
        feedback: outcome.feedback(),
        outcome,
        session: entry.cell.snapshot(),
    }))
}

/// POST /api/v1/tasks/{id}/hint
pub async fn reveal_hint(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let entry = state.registry.task(session_id).map_err(reject)?;

    let disclosed = DisclosureGate::new(entry.oracle.clone())
        .reveal_hint(&entry.cell)
        .await
        .map_err(reject)?;

    Ok(Json(json!({
        "hint_disclosed": disclosed,
        "session": entry.cell.snapshot(),
    })))
}

/// POST /api/v1/tasks/{id}/solution
pub async fn reveal_solution(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let entry = state.registry.task(session_id).map_err(reject)?;

    let disclosed = DisclosureGate::new(entry.oracle.clone())
        .reveal_solution(&entry.cell)
        .await
        .map_err(reject)?;

    Ok(Json(json!({
        "solution_disclosed": disclosed,
        "session": entry.cell.snapshot(),
    })))
}

/// POST /api/v1/tasks/{id}/report
pub async fn file_report(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<FileReportRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    validate(&req)?;
    let entry = state.registry.task(session_id).map_err(reject)?;

    let receipt = ReportLock::new(entry.oracle.clone())
        .file_report(&entry.cell, &req.description)
        .await
        .map_err(reject)?;

    Ok((
        StatusCode::CREATED,
        Json(FileReportResponse {
            report_id: receipt.report_id,
            session: entry.cell.snapshot(),
        }),
    ))
}
