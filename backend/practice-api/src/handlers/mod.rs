use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use validator::Validate;

use crate::error::EngineError;
use crate::metrics;
use crate::services::AppState;

pub mod cases;
pub mod sse;
pub mod tasks;

pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let learning_api = check_learning_api(&state).await;
    let healthy = learning_api.get("status").and_then(|v| v.as_str()) == Some("healthy");

    let (status_code, status) = if healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        status_code,
        Json(json!({
            "status": status,
            "service": "mathlab-practice-api",
            "version": env!("CARGO_PKG_VERSION"),
            "sessions": {
                "tasks": state.registry.task_count(),
                "cases": state.registry.case_count(),
            },
            "dependencies": { "learning_api": learning_api }
        })),
    )
}

/// Any HTTP answer counts as reachable; only transport failures do not.
async fn check_learning_api(state: &AppState) -> serde_json::Map<String, serde_json::Value> {
    let mut result = serde_json::Map::new();

    match state
        .http
        .get(&state.config.learning_api_url)
        .timeout(Duration::from_secs(1))
        .send()
        .await
    {
        Ok(response) => {
            result.insert("status".to_string(), json!("healthy"));
            result.insert("http_status".to_string(), json!(response.status().as_u16()));
        }
        Err(e) if e.is_timeout() => {
            result.insert("status".to_string(), json!("unhealthy"));
            result.insert("error".to_string(), json!("Learning API timeout after 1s"));
        }
        Err(e) => {
            result.insert("status".to_string(), json!("unhealthy"));
            result.insert(
                "error".to_string(),
                json!(format!("Learning API unreachable: {}", e)),
            );
        }
    }

    result
}

pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::render_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to render metrics: {}", e),
        ),
    }
}

/// The student's token, forwarded as-is to the learning API.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

pub(crate) fn reject(err: EngineError) -> (StatusCode, String) {
    match &err {
        EngineError::Transient(_) | EngineError::Server { .. } => {
            tracing::warn!("Request failed: {}", err)
        }
        _ => tracing::debug!("Request rejected: {}", err),
    }
    (err.status_code(), err.to_string())
}

pub(crate) fn validate<T: Validate>(req: &T) -> Result<(), (StatusCode, String)> {
    req.validate().map_err(|e| {
        metrics::record_rejection("validation");
        (StatusCode::BAD_REQUEST, format!("Validation error: {}", e))
    })
}
