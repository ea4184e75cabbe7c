use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
};
use futures::stream::{self, Stream};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use uuid::Uuid;

use super::{cases::case_key, reject};
use crate::{metrics::SSE_CONNECTIONS_ACTIVE, models::SessionEvent, services::AppState};

/// GET /api/v1/tasks/{id}/events
pub async fn task_events(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let entry = state.registry.task(session_id).map_err(reject)?;
    tracing::info!("Client connected to SSE stream: task session={}", session_id);

    let stream = event_stream(entry.cell.subscribe(), session_id.to_string());
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// GET /api/v1/cases/{case_id}/events
pub async fn case_events(
    State(state): State<Arc<AppState>>,
    Path(case_id): Path<i64>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let case = state
        .registry
        .case(&case_key(&headers, case_id))
        .map_err(reject)?;
    tracing::info!("Client connected to SSE stream: case={}", case_id);

    let stream = event_stream(case.subscribe(), format!("case:{}", case_id));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

struct Connection {
    label: String,
}

impl Connection {
    fn open(label: String) -> Self {
        SSE_CONNECTIONS_ACTIVE.inc();
        Self { label }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        SSE_CONNECTIONS_ACTIVE.dec();
        tracing::info!("SSE stream closed: {}", self.label);
    }
}

/// Ends when every sender is gone, i.e. the session or case was dropped.
fn event_stream(
    receiver: broadcast::Receiver<SessionEvent>,
    label: String,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let connection = Connection::open(label);

    stream::unfold(
        (receiver, connection),
        |(mut receiver, connection)| async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        let sse = Event::default()
                            .event(event.event_name())
                            .data(event.to_sse_data());
                        return Some((Ok(sse), (receiver, connection)));
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            "SSE client {} lagged, skipped {} events",
                            connection.label,
                            skipped
                        );
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        },
    )
}
