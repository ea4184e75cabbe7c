use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;

use super::{bearer_token, reject, validate};
use crate::{
    models::{
        answer::SubmitAnswerRequest,
        case::CaseStepResponse,
        report::{CaseReportResponse, FileReportRequest},
    },
    services::{episode_sequencer::CaseProgress, registry::CaseKey, AppState},
};

/// Runs are looked up per student, so every case route reads the token.
pub(crate) fn case_key(headers: &HeaderMap, case_id: i64) -> CaseKey {
    CaseKey::new(bearer_token(headers), case_id)
}

/// POST /api/v1/cases/{case_id}
///
/// Starts a run at the episode the learning API reports as current. The same
/// student's earlier run of the case in this gateway is discarded.
pub async fn open_case(
    State(state): State<Arc<AppState>>,
    Path(case_id): Path<i64>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    tracing::info!("Opening case {}", case_id);

    let key = case_key(&headers, case_id);
    let oracle = state.oracle_for(bearer_token(&headers));
    let case = CaseProgress::open(oracle, case_id, state.retry_config())
        .await
        .map_err(reject)?;
    let snapshot = case.snapshot();
    state.registry.insert_case(key, case);

    Ok((StatusCode::CREATED, Json(snapshot)))
}

/// GET /api/v1/cases/{case_id}
pub async fn get_case(
    State(state): State<Arc<AppState>>,
    Path(case_id): Path<i64>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let case = state
        .registry
        .case(&case_key(&headers, case_id))
        .map_err(reject)?;
    Ok(Json(case.snapshot()))
}

/// DELETE /api/v1/cases/{case_id}
pub async fn discard_case(
    State(state): State<Arc<AppState>>,
    Path(case_id): Path<i64>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state
        .registry
        .remove_case(&case_key(&headers, case_id))
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/cases/{case_id}/attempts
pub async fn submit_attempt(
    State(state): State<Arc<AppState>>,
    Path(case_id): Path<i64>,
    headers: HeaderMap,
    Json(req): Json<SubmitAnswerRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    validate(&req)?;
    let case = state
        .registry
        .case(&case_key(&headers, case_id))
        .map_err(reject)?;

    let step = case.submit_attempt(&req.answer).await.map_err(reject)?;
    let snapshot = case.snapshot();

    let mut feedback = step.value.feedback();
    if let Some(summary) = &snapshot.summary {
        feedback.push('\n');
        feedback.push_str(summary);
    }

    Ok(Json(CaseStepResponse {
        outcome: step.value,
        feedback,
        follow_up_error: step.follow_up_error.map(|e| e.to_string()),
        case: snapshot,
    }))
}

/// POST /api/v1/cases/{case_id}/hint
pub async fn reveal_hint(
    State(state): State<Arc<AppState>>,
    Path(case_id): Path<i64>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let case = state
        .registry
        .case(&case_key(&headers, case_id))
        .map_err(reject)?;
    let disclosed = case.reveal_hint().await.map_err(reject)?;

    Ok(Json(json!({
        "hint_disclosed": disclosed,
        "case": case.snapshot(),
    })))
}

/// POST /api/v1/cases/{case_id}/solution
pub async fn reveal_solution(
    State(state): State<Arc<AppState>>,
    Path(case_id): Path<i64>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let case = state
        .registry
        .case(&case_key(&headers, case_id))
        .map_err(reject)?;
    let disclosed = case.reveal_solution().await.map_err(reject)?;

    Ok(Json(json!({
        "solution_disclosed": disclosed,
        "case": case.snapshot(),
    })))
}

/// POST /api/v1/cases/{case_id}/report
pub async fn file_report(
    State(state): State<Arc<AppState>>,
    Path(case_id): Path<i64>,
    headers: HeaderMap,
    Json(req): Json<FileReportRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    validate(&req)?;
    let case = state
        .registry
        .case(&case_key(&headers, case_id))
        .map_err(reject)?;

    let step = case.file_report(&req.description).await.map_err(reject)?;
    if let Some(err) = &step.follow_up_error {
        tracing::warn!("Case {} did not move on after report: {}", case_id, err);
    }

    Ok((
        StatusCode::CREATED,
        Json(CaseReportResponse {
            report_id: step.value.report_id,
            case: case.snapshot(),
        }),
    ))
}

/// POST /api/v1/cases/{case_id}/resume
pub async fn resume_case(
    State(state): State<Arc<AppState>>,
    Path(case_id): Path<i64>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let case = state
        .registry
        .case(&case_key(&headers, case_id))
        .map_err(reject)?;
    case.resume().await.map_err(reject)?;
    Ok(Json(case.snapshot()))
}
