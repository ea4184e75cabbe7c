use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::metrics::track_oracle_call;
use crate::models::report::ReportReceipt;
use crate::models::task::OpenTaskRequest;
use crate::models::{
    AnswerableUnit, CheckReply, EpisodeEnvelope, Hint, Outcome, UnitHandle, MAX_ATTEMPTS,
};

/// Failures of the learning API once the exhaustion signal has been folded
/// into `Outcome`.
#[derive(Debug, Clone, Error)]
pub enum OracleError {
    #[error("{0}")]
    Transient(String),

    #[error("HTTP {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("unexpected response: {0}")]
    Malformed(String),
}

impl OracleError {
    pub fn is_transient(&self) -> bool {
        matches!(self, OracleError::Transient(_))
    }
}

/// The remote authority on correctness and attempt counting.
#[async_trait]
pub trait LearningOracle: Send + Sync {
    async fn open_task(&self, req: &OpenTaskRequest) -> Result<AnswerableUnit, OracleError>;

    /// For episode handles this is the case's solve-episode call.
    async fn check_answer(&self, handle: UnitHandle, answer: &str)
        -> Result<CheckReply, OracleError>;

    async fn record_hint_view(&self, handle: UnitHandle) -> Result<(), OracleError>;

    async fn record_solution_view(&self, handle: UnitHandle) -> Result<(), OracleError>;

    async fn file_problem_report(
        &self,
        handle: UnitHandle,
        description: &str,
    ) -> Result<ReportReceipt, OracleError>;

    async fn fetch_current_episode(&self, case_id: i64) -> Result<EpisodeEnvelope, OracleError>;

    async fn mark_case_completed(&self, case_id: i64) -> Result<(), OracleError>;
}

/// Raw failure of one HTTP exchange, before classification.
#[derive(Debug)]
pub(crate) enum HttpFailure {
    Transport(String),
    Status { status: u16, message: String },
    Decode(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AttemptResponse {
    #[serde(alias = "correct")]
    is_correct: bool,
    #[serde(default)]
    attempts_used: Option<u32>,
    #[serde(default, alias = "remainingAttempts")]
    attempts_left: Option<u32>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    next_hint: Option<String>,
    #[serde(default)]
    attempted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LearningModeResponse {
    history_id: i64,
    question: String,
    #[serde(default)]
    hints: Vec<HintPayload>,
    #[serde(default)]
    explanation: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HintPayload {
    #[serde(default)]
    hint_id: Option<i64>,
    hint_text: String,
    #[serde(default)]
    order_idx: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurrentEpisodeResponse {
    episode: EpisodePayload,
    total_episodes: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EpisodePayload {
    episode_number: u32,
    #[serde(default)]
    scene_text: Option<String>,
    clue_prompt: String,
    #[serde(default)]
    clue_answer: Option<String>,
    #[serde(default)]
    solution: Option<String>,
    #[serde(default)]
    next_hint: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportPayload {
    #[serde(default, alias = "id")]
    report_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    message: Option<String>,
}

/// Turns whatever the learning API said about an answer into one `CheckReply`.
///
/// Exhaustion arrives either as `attemptsLeft == 0` / `attemptsUsed >= 3` or,
/// for episodes only, as HTTP 400 on the solve endpoint; both become
/// `Outcome::IncorrectExhausted`. A 400 on the task endpoint is a rejection.
pub(crate) fn normalize_check(
    handle: UnitHandle,
    result: Result<AttemptResponse, HttpFailure>,
) -> Result<CheckReply, OracleError> {
    let resp = match result {
        Ok(resp) => resp,
        Err(HttpFailure::Status { status: 400, .. }) if handle.is_episode() => {
            return Ok(CheckReply::new(Outcome::exhausted()).at_attempt(MAX_ATTEMPTS));
        }
        Err(failure) => return Err(classify_failure(failure)),
    };

    let remaining = resp
        .attempts_left
        .or_else(|| resp.attempts_used.map(|used| MAX_ATTEMPTS.saturating_sub(used)));
    let attempt_number = resp
        .attempts_used
        .or_else(|| resp.attempts_left.map(|left| MAX_ATTEMPTS.saturating_sub(left)))
        .map(|n| n.clamp(1, MAX_ATTEMPTS));

    let outcome = if resp.is_correct {
        Outcome::Correct {
            next_hint: resp.next_hint,
        }
    } else {
        match remaining {
            Some(0) => Outcome::IncorrectExhausted {
                correct_answer: None,
                next_hint: resp.next_hint,
            },
            Some(remaining_attempts) => Outcome::IncorrectRetryable {
                remaining_attempts,
                message: resp.message,
            },
            None => {
                return Err(OracleError::Malformed(
                    "answer check carried no attempt accounting".to_string(),
                ))
            }
        }
    };

    Ok(CheckReply {
        outcome,
        attempt_number,
        recorded_at: resp.attempted_at,
    })
}

pub(crate) fn classify_failure(failure: HttpFailure) -> OracleError {
    match failure {
        HttpFailure::Transport(message) => OracleError::Transient(message),
        HttpFailure::Status {
            status: status @ (429 | 502 | 503 | 504),
            message,
        } => OracleError::Transient(format!("HTTP {}: {}", status, message)),
        HttpFailure::Status { status, message } => OracleError::Rejected { status, message },
        HttpFailure::Decode(message) => OracleError::Malformed(message),
    }
}

/// `LearningOracle` over the learning platform's REST API.
///
/// Carries the bearer token of the student who opened the session; a fresh
/// oracle is built per opened task or case.
pub struct HttpOracle {
    client: Client,
    base_url: String,
    bearer: Option<String>,
}

impl HttpOracle {
    pub fn new(client: Client, base_url: &str, bearer: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bearer,
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.bearer {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, HttpFailure> {
        let response = builder
            .send()
            .await
            .map_err(|e| HttpFailure::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response
            .json::<ErrorPayload>()
            .await
            .ok()
            .and_then(|payload| payload.message)
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));

        Err(HttpFailure::Status {
            status: status.as_u16(),
            message,
        })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, HttpFailure> {
        let response = self.send(builder).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| HttpFailure::Decode(e.to_string()))
    }

    async fn send_ack(&self, builder: RequestBuilder) -> Result<(), OracleError> {
        self.send(builder)
            .await
            .map(|_| ())
            .map_err(classify_failure)
    }
}

#[async_trait]
impl LearningOracle for HttpOracle {
    async fn open_task(&self, req: &OpenTaskRequest) -> Result<AnswerableUnit, OracleError> {
        let builder = self
            .request(Method::POST, "/api/v1/learning-mode")
            .json(&json!({
                "gradeId": req.grade_id,
                "topicId": req.topic_id,
                "lessonId": req.lesson_id,
                "difficulty": req.difficulty,
                "includeSvg": false,
            }));

        let payload: LearningModeResponse =
            track_oracle_call("open_task", self.send_json(builder))
                .await
                .map_err(classify_failure)?;

        tracing::info!("Learning-mode task issued: history_id={}", payload.history_id);

        let hints = payload
            .hints
            .into_iter()
            .map(|h| Hint {
                id: h.hint_id,
                text: h.hint_text,
                order: h.order_idx,
            })
            .collect();

        Ok(AnswerableUnit::new(
            UnitHandle::Task {
                history_id: payload.history_id,
            },
            payload.question,
        )
        .with_hints(hints)
        .with_explanation(payload.explanation))
    }

    async fn check_answer(
        &self,
        handle: UnitHandle,
        answer: &str,
    ) -> Result<CheckReply, OracleError> {
        let builder = match handle {
            UnitHandle::Task { history_id } => self
                .request(
                    Method::POST,
                    &format!("/api/v1/task-history/{}/attempt", history_id),
                )
                .json(&json!({ "answer": answer })),
            UnitHandle::Episode {
                case_id,
                episode_number,
            } => self
                .request(
                    Method::POST,
                    &format!("/api/v1/case/{}/episodes/{}/solve", case_id, episode_number),
                )
                .json(&json!({ "solution": answer })),
        };

        let result = track_oracle_call("check_answer", self.send_json::<AttemptResponse>(builder)).await;
        normalize_check(handle, result)
    }

    async fn record_hint_view(&self, handle: UnitHandle) -> Result<(), OracleError> {
        match handle {
            UnitHandle::Task { history_id } => {
                let builder = self.request(
                    Method::POST,
                    &format!("/api/v1/task-history/{}/hint", history_id),
                );
                track_oracle_call("record_hint_view", self.send_ack(builder)).await
            }
            UnitHandle::Episode { .. } => {
                tracing::debug!("Hint view on {} is tracked locally only", handle);
                Ok(())
            }
        }
    }

    async fn record_solution_view(&self, handle: UnitHandle) -> Result<(), OracleError> {
        match handle {
            UnitHandle::Task { history_id } => {
                let builder = self.request(
                    Method::POST,
                    &format!("/api/v1/task-history/{}/solution", history_id),
                );
                track_oracle_call("record_solution_view", self.send_ack(builder)).await
            }
            UnitHandle::Episode { .. } => {
                tracing::debug!("Solution view on {} is tracked locally only", handle);
                Ok(())
            }
        }
    }

    async fn file_problem_report(
        &self,
        handle: UnitHandle,
        description: &str,
    ) -> Result<ReportReceipt, OracleError> {
        let builder = match handle {
            UnitHandle::Task { history_id } => self
                .request(Method::POST, "/api/v1/task-report")
                .json(&json!({
                    "taskHistoryId": history_id,
                    "description": description,
                })),
            UnitHandle::Episode {
                case_id,
                episode_number,
            } => self
                .request(
                    Method::POST,
                    &format!("/api/v1/case/{}/episodes/{}/report", case_id, episode_number),
                )
                .json(&json!({ "description": description })),
        };

        // The report endpoint may answer with an empty body.
        let response = track_oracle_call("file_problem_report", self.send(builder))
            .await
            .map_err(classify_failure)?;
        let payload = response.json::<ReportPayload>().await.unwrap_or_default();

        Ok(ReportReceipt {
            report_id: payload.report_id,
        })
    }

    async fn fetch_current_episode(&self, case_id: i64) -> Result<EpisodeEnvelope, OracleError> {
        let builder = self.request(
            Method::GET,
            &format!("/api/v1/case/{}/episode/current", case_id),
        );

        let payload: CurrentEpisodeResponse =
            track_oracle_call("fetch_current_episode", self.send_json(builder))
                .await
                .map_err(classify_failure)?;

        if payload.total_episodes == 0 || payload.episode.episode_number == 0 {
            return Err(OracleError::Malformed(format!(
                "case {} returned episode {} of {}",
                case_id, payload.episode.episode_number, payload.total_episodes
            )));
        }

        let episode = payload.episode;
        let unit = AnswerableUnit::new(
            UnitHandle::Episode {
                case_id,
                episode_number: episode.episode_number,
            },
            episode.clue_prompt,
        )
        .with_scene(episode.scene_text)
        .with_expected_answer(episode.clue_answer.or_else(|| episode.solution.clone()))
        .with_explanation(episode.solution)
        .with_next_hint(episode.next_hint);

        Ok(EpisodeEnvelope {
            unit,
            total_episodes: payload.total_episodes,
        })
    }

    async fn mark_case_completed(&self, case_id: i64) -> Result<(), OracleError> {
        let builder = self
            .request(Method::PUT, &format!("/api/v1/case/{}/finish", case_id))
            .json(&json!({}));
        track_oracle_call("mark_case_completed", self.send_ack(builder)).await
    }
}
