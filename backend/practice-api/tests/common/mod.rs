#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    extract::{Path, State},
    http::{HeaderMap, Request, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

use mathlab_practice::{config::Config, create_router, services::AppState};

pub const TASK_ANSWER: &str = "4";
pub const CASE_EPISODES: u32 = 3;

/// In-process stand-in for the learning platform API.
pub struct StubLearningApi {
    next_history_id: AtomicI64,
    task_attempts: Mutex<HashMap<i64, u32>>,
    current_episode: AtomicU32,
    episode_attempts: Mutex<HashMap<u32, u32>>,
    /// Episode exhaustion is signalled with HTTP 400 instead of `attemptsLeft: 0`.
    pub exhaust_with_status: AtomicBool,
    pub hint_views: AtomicUsize,
    pub solution_views: AtomicUsize,
    pub reports: AtomicUsize,
    pub finish_calls: AtomicUsize,
    pub last_bearer: Mutex<Option<String>>,
}

impl Default for StubLearningApi {
    fn default() -> Self {
        Self {
            next_history_id: AtomicI64::new(100),
            task_attempts: Mutex::new(HashMap::new()),
            current_episode: AtomicU32::new(1),
            episode_attempts: Mutex::new(HashMap::new()),
            exhaust_with_status: AtomicBool::new(false),
            hint_views: AtomicUsize::new(0),
            solution_views: AtomicUsize::new(0),
            reports: AtomicUsize::new(0),
            finish_calls: AtomicUsize::new(0),
            last_bearer: Mutex::new(None),
        }
    }
}

impl StubLearningApi {
    pub fn task_attempt_calls(&self) -> u32 {
        self.task_attempts.lock().unwrap().values().sum()
    }

    fn advance_episode(&self, finished: u32) {
        let next = (finished + 1).min(CASE_EPISODES);
        self.current_episode.fetch_max(next, Ordering::SeqCst);
    }
}

type Stub = Arc<StubLearningApi>;

fn remember_bearer(stub: &StubLearningApi, headers: &HeaderMap) {
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string);
    *stub.last_bearer.lock().unwrap() = token;
}

async fn learning_mode(State(stub): State<Stub>, headers: HeaderMap) -> Json<Value> {
    remember_bearer(&stub, &headers);
    let history_id = stub.next_history_id.fetch_add(1, Ordering::SeqCst);
    Json(json!({
        "historyId": history_id,
        "question": "2 + 2 = ?",
        "hints": [
            { "hintId": 2, "hintText": "Then count two more", "orderIdx": 2 },
            { "hintId": 1, "hintText": "Start from two", "orderIdx": 1 }
        ],
        "explanation": "Two plus two is four."
    }))
}

async fn task_attempt(
    State(stub): State<Stub>,
    Path(history_id): Path<i64>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let used = {
        let mut attempts = stub.task_attempts.lock().unwrap();
        let used = attempts.entry(history_id).or_insert(0);
        *used += 1;
        *used
    };
    if used > 3 {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": "No attempts left" })),
        );
    }
    let correct = body["answer"].as_str() == Some(TASK_ANSWER);
    (
        StatusCode::OK,
        Json(json!({ "isCorrect": correct, "attemptsUsed": used, "solved": correct })),
    )
}

async fn task_hint(State(stub): State<Stub>) -> StatusCode {
    stub.hint_views.fetch_add(1, Ordering::SeqCst);
    StatusCode::OK
}

async fn task_solution(State(stub): State<Stub>) -> StatusCode {
    stub.solution_views.fetch_add(1, Ordering::SeqCst);
    StatusCode::OK
}

async fn task_report(State(stub): State<Stub>, Json(body): Json<Value>) -> impl IntoResponse {
    assert!(body["taskHistoryId"].is_i64());
    stub.reports.fetch_add(1, Ordering::SeqCst);
    (StatusCode::CREATED, Json(json!({ "reportId": 7 })))
}

async fn current_episode(State(stub): State<Stub>, Path(case_id): Path<i64>) -> Json<Value> {
    let n = stub.current_episode.load(Ordering::SeqCst);
    Json(json!({
        "caseId": case_id,
        "episode": {
            "episodeNumber": n,
            "sceneText": format!("Scene {}", n),
            "cluePrompt": format!("Clue {}", n),
            "clueAnswer": format!("{}", n * 10),
            "solution": format!("The answer was {}", n * 10),
            "nextHint": (n < CASE_EPISODES).then(|| format!("Look behind door {}", n + 1)),
        },
        "totalEpisodes": CASE_EPISODES
    }))
}

async fn solve_episode(
    State(stub): State<Stub>,
    Path((_case_id, n)): Path<(i64, u32)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    remember_bearer(&stub, &headers);
    let left = {
        let mut attempts = stub.episode_attempts.lock().unwrap();
        let used = attempts.entry(n).or_insert(0);
        *used += 1;
        3u32.saturating_sub(*used)
    };

    if body["solution"].as_str() == Some(format!("{}", n * 10).as_str()) {
        stub.advance_episode(n);
        return (
            StatusCode::OK,
            Json(json!({ "isCorrect": true, "attemptsLeft": left, "message": "Correct" })),
        );
    }

    if left == 0 {
        stub.advance_episode(n);
        if stub.exhaust_with_status.load(Ordering::SeqCst) {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "message": "No attempts left" })),
            );
        }
    }
    (
        StatusCode::OK,
        Json(json!({ "isCorrect": false, "attemptsLeft": left })),
    )
}

async fn episode_report(
    State(stub): State<Stub>,
    Path((_case_id, n)): Path<(i64, u32)>,
) -> impl IntoResponse {
    stub.reports.fetch_add(1, Ordering::SeqCst);
    stub.advance_episode(n);
    (StatusCode::CREATED, Json(json!({ "reportId": 9 })))
}

async fn finish_case(State(stub): State<Stub>) -> StatusCode {
    stub.finish_calls.fetch_add(1, Ordering::SeqCst);
    StatusCode::OK
}

/// Serves the stub on an ephemeral port and returns its base URL.
pub async fn spawn_learning_api() -> (String, Stub) {
    let stub: Stub = Arc::new(StubLearningApi::default());

    let app = Router::new()
        .route("/", get(|| async { "learning api" }))
        .route("/api/v1/learning-mode", post(learning_mode))
        .route("/api/v1/task-history/{id}/attempt", post(task_attempt))
        .route("/api/v1/task-history/{id}/hint", post(task_hint))
        .route("/api/v1/task-history/{id}/solution", post(task_solution))
        .route("/api/v1/task-report", post(task_report))
        .route("/api/v1/case/{id}/episode/current", get(current_episode))
        .route("/api/v1/case/{id}/episodes/{n}/solve", post(solve_episode))
        .route("/api/v1/case/{id}/episodes/{n}/report", post(episode_report))
        .route("/api/v1/case/{id}/finish", put(finish_case))
        .with_state(stub.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub learning API");
    let addr = listener.local_addr().expect("stub address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("stub learning API");
    });

    (format!("http://{}", addr), stub)
}

pub async fn create_test_app() -> (Router, Stub) {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let (url, stub) = spawn_learning_api().await;
    let config = Config {
        learning_api_url: url,
        bind_addr: "127.0.0.1:0".to_string(),
        learning_api_timeout_ms: 2000,
        learning_api_retry_attempts: 1,
    };
    let app_state = Arc::new(AppState::new(config).expect("Failed to initialize test app state"));

    (create_router(app_state), stub)
}

pub async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    send_with(app, method, uri, body, None).await
}

pub async fn send_with(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    bearer: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));

    (status, json)
}

/// Opens a learning-mode task and returns its session id.
pub async fn open_task(app: &Router) -> String {
    let (status, json) = send(
        app,
        "POST",
        "/api/v1/tasks",
        Some(json!({ "grade_id": 5, "topic_id": 2, "lesson_id": 3, "difficulty": "EASY" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "open task failed: {}", json);
    json["session_id"].as_str().unwrap().to_string()
}
