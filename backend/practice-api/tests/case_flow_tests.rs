mod common;

use axum::http::StatusCode;
use serde_json::{json, Value};
use std::sync::atomic::Ordering;

use common::{create_test_app, send, send_with, CASE_EPISODES};

async fn answer(app: &axum::Router, case_id: i64, answer: &str) -> Value {
    let (status, json) = send(
        app,
        "POST",
        &format!("/api/v1/cases/{}/attempts", case_id),
        Some(json!({ "answer": answer })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "attempt failed: {}", json);
    json
}

#[tokio::test]
async fn test_open_case_starts_at_current_episode() {
    let (app, _stub) = create_test_app().await;

    let (status, json) = send(&app, "POST", "/api/v1/cases/12", None).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["case_id"], 12);
    assert_eq!(json["total_episodes"], CASE_EPISODES);
    assert_eq!(json["state"], "in_progress");
    assert_eq!(json["current_episode"], 1);
    assert_eq!(json["correct_count"], 0);
    assert_eq!(json["episode"]["prompt"], "Clue 1");
    assert_eq!(json["episode"]["scene_text"], "Scene 1");
    assert!(json["episode"]["correct_answer"].is_null());
}

#[tokio::test]
async fn test_case_with_two_solved_episodes_completes_with_two() {
    let (app, stub) = create_test_app().await;
    send(&app, "POST", "/api/v1/cases/12", None).await;

    let json = answer(&app, 12, "10").await;
    assert_eq!(json["outcome"]["outcome"], "correct");
    assert_eq!(json["feedback"], "Correct! Next clue: Look behind door 2");
    assert_eq!(json["case"]["current_episode"], 2);
    assert_eq!(json["case"]["correct_count"], 1);

    answer(&app, 12, "1").await;
    answer(&app, 12, "2").await;
    let json = answer(&app, 12, "3").await;
    assert_eq!(json["outcome"]["outcome"], "incorrect_exhausted");
    assert_eq!(json["outcome"]["correct_answer"], "20");
    assert_eq!(json["case"]["current_episode"], 3);
    assert_eq!(json["case"]["correct_count"], 1);

    let json = answer(&app, 12, "30").await;
    assert_eq!(json["case"]["state"], "completed");
    assert_eq!(json["case"]["final_correct_count"], 2);
    assert_eq!(
        json["case"]["summary"],
        "Case finished. Correctly solved: 2/3."
    );
    assert!(json["feedback"]
        .as_str()
        .unwrap()
        .ends_with("Case finished. Correctly solved: 2/3."));
    assert_eq!(stub.finish_calls.load(Ordering::SeqCst), 1);

    let (status, _) = send(
        &app,
        "POST",
        "/api/v1/cases/12/attempts",
        Some(json!({ "answer": "30" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "POST", "/api/v1/cases/12/resume", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stub.finish_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_exhaustion_signalled_by_status_matches_field() {
    let (app, stub) = create_test_app().await;
    stub.exhaust_with_status.store(true, Ordering::SeqCst);
    send(&app, "POST", "/api/v1/cases/4", None).await;

    answer(&app, 4, "1").await;
    answer(&app, 4, "2").await;
    let json = answer(&app, 4, "3").await;

    assert_eq!(json["outcome"]["outcome"], "incorrect_exhausted");
    assert_eq!(json["outcome"]["correct_answer"], "10");
    assert_eq!(json["outcome"]["next_hint"], "Look behind door 2");
    assert!(json["follow_up_error"].is_null());
    assert_eq!(json["case"]["current_episode"], 2);
    assert_eq!(json["case"]["correct_count"], 0);
}

#[tokio::test]
async fn test_reporting_an_episode_moves_on() {
    let (app, stub) = create_test_app().await;
    send(&app, "POST", "/api/v1/cases/8", None).await;

    let (status, json) = send(
        &app,
        "POST",
        "/api/v1/cases/8/report",
        Some(json!({ "description": "Clue text is garbled" })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["report_id"], 9);
    assert_eq!(json["case"]["current_episode"], 2);
    assert_eq!(json["case"]["correct_count"], 0);
    assert_eq!(stub.reports.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_episode_hint_is_local() {
    let (app, stub) = create_test_app().await;
    send(&app, "POST", "/api/v1/cases/3", None).await;

    let (status, json) = send(&app, "POST", "/api/v1/cases/3/hint", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["hint_disclosed"], true);
    assert_eq!(json["case"]["episode"]["hint_disclosed"], true);
    assert_eq!(stub.hint_views.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unknown_case_is_not_found() {
    let (app, _stub) = create_test_app().await;

    let (status, _) = send(&app, "GET", "/api/v1/cases/999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    send(&app, "POST", "/api/v1/cases/5", None).await;
    let (status, _) = send(&app, "DELETE", "/api/v1/cases/5", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, "GET", "/api/v1/cases/5", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_students_on_the_same_case_do_not_share_a_run() {
    let (app, stub) = create_test_app().await;
    let (status, _) = send_with(&app, "POST", "/api/v1/cases/21", None, Some("alice")).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = send_with(&app, "POST", "/api/v1/cases/21", None, Some("bob")).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, json) = send_with(
        &app,
        "POST",
        "/api/v1/cases/21/attempts",
        Some(json!({ "answer": "10" })),
        Some("alice"),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "attempt failed: {}", json);
    assert_eq!(json["case"]["current_episode"], 2);
    assert_eq!(json["case"]["correct_count"], 1);

    let (status, json) = send_with(&app, "GET", "/api/v1/cases/21", None, Some("bob")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["current_episode"], 1);
    assert_eq!(json["correct_count"], 0);

    let (status, json) = send_with(
        &app,
        "POST",
        "/api/v1/cases/21/attempts",
        Some(json!({ "answer": "1" })),
        Some("bob"),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "attempt failed: {}", json);
    assert_eq!(json["outcome"]["outcome"], "incorrect_retryable");
    assert_eq!(stub.last_bearer.lock().unwrap().as_deref(), Some("bob"));

    let (status, json) = send_with(&app, "GET", "/api/v1/cases/21", None, Some("alice")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["current_episode"], 2);

    let (status, _) = send(&app, "GET", "/api/v1/cases/21", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
