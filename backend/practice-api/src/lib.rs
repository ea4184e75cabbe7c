use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use error::EngineError;
pub use services::AppState;

pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
        .nest("/api/v1/tasks", task_routes())
        .nest("/api/v1/cases", case_routes())
        .with_state(app_state)
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http().make_span_with(middlewares::trace::make_span))
        .layer(middleware::from_fn(
            middlewares::trace::trace_id_middleware,
        ))
}

fn task_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(handlers::tasks::open_task))
        .route(
            "/{id}",
            get(handlers::tasks::get_task).delete(handlers::tasks::discard_task),
        )
        .route("/{id}/attempts", post(handlers::tasks::submit_attempt))
        .route("/{id}/hint", post(handlers::tasks::reveal_hint))
        .route("/{id}/solution", post(handlers::tasks::reveal_solution))
        .route("/{id}/report", post(handlers::tasks::file_report))
        .route("/{id}/events", get(handlers::sse::task_events))
}

fn case_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/{case_id}",
            post(handlers::cases::open_case)
                .get(handlers::cases::get_case)
                .delete(handlers::cases::discard_case),
        )
        .route("/{case_id}/attempts", post(handlers::cases::submit_attempt))
        .route("/{case_id}/hint", post(handlers::cases::reveal_hint))
        .route("/{case_id}/solution", post(handlers::cases::reveal_solution))
        .route("/{case_id}/report", post(handlers::cases::file_report))
        .route("/{case_id}/resume", post(handlers::cases::resume_case))
        .route("/{case_id}/events", get(handlers::sse::case_events))
}
