//! Scripted learning API for engine unit tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;

use super::oracle::{LearningOracle, OracleError};
use super::session_cell::SessionCell;
use crate::models::report::ReportReceipt;
use crate::models::task::OpenTaskRequest;
use crate::models::{
    AnswerableUnit, CheckReply, EpisodeEnvelope, InteractionSession, Outcome, UnitHandle,
    MAX_ATTEMPTS,
};

#[derive(Default)]
pub struct ScriptedOracle {
    replies: Mutex<VecDeque<Result<CheckReply, OracleError>>>,
    episodes: Mutex<VecDeque<Result<EpisodeEnvelope, OracleError>>>,
    pub check_calls: AtomicUsize,
    pub hint_calls: AtomicUsize,
    pub solution_calls: AtomicUsize,
    pub report_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
    pub completion_calls: AtomicUsize,
    pub fail_recordings: AtomicBool,
    pub fail_reports: AtomicBool,
    /// Number of upcoming completion calls that fail transiently.
    pub completion_failures: AtomicUsize,
    paused: AtomicBool,
    release: Notify,
    fetch_paused: AtomicBool,
    fetch_release: Notify,
}

impl ScriptedOracle {
    pub fn push_reply(&self, reply: Result<CheckReply, OracleError>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn push_episode(&self, episode: EpisodeEnvelope) {
        self.episodes.lock().unwrap().push_back(Ok(episode));
    }

    pub fn push_episode_failure(&self, err: OracleError) {
        self.episodes.lock().unwrap().push_back(Err(err));
    }

    /// Makes the next `check_answer` wait for `release_check`.
    pub fn pause_checks(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn release_check(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.release.notify_one();
    }

    /// Makes the next `fetch_current_episode` wait for `release_fetch`.
    pub fn pause_fetches(&self) {
        self.fetch_paused.store(true, Ordering::SeqCst);
    }

    pub fn release_fetch(&self) {
        self.fetch_paused.store(false, Ordering::SeqCst);
        self.fetch_release.notify_one();
    }

    fn recording(&self, counter: &AtomicUsize) -> Result<(), OracleError> {
        counter.fetch_add(1, Ordering::SeqCst);
        if self.fail_recordings.load(Ordering::SeqCst) {
            return Err(OracleError::Transient("connection reset".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl LearningOracle for ScriptedOracle {
    async fn open_task(&self, req: &OpenTaskRequest) -> Result<AnswerableUnit, OracleError> {
        Ok(task_unit(req.lesson_id))
    }

    async fn check_answer(
        &self,
        _handle: UnitHandle,
        _answer: &str,
    ) -> Result<CheckReply, OracleError> {
        self.check_calls.fetch_add(1, Ordering::SeqCst);
        if self.paused.load(Ordering::SeqCst) {
            self.release.notified().await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(OracleError::Malformed("no scripted reply".into())))
    }

    async fn record_hint_view(&self, _handle: UnitHandle) -> Result<(), OracleError> {
        self.recording(&self.hint_calls)
    }

    async fn record_solution_view(&self, _handle: UnitHandle) -> Result<(), OracleError> {
        self.recording(&self.solution_calls)
    }

    async fn file_problem_report(
        &self,
        _handle: UnitHandle,
        _description: &str,
    ) -> Result<ReportReceipt, OracleError> {
        let n = self.report_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_reports.load(Ordering::SeqCst) {
            return Err(OracleError::Rejected {
                status: 500,
                message: "report storage down".into(),
            });
        }
        Ok(ReportReceipt {
            report_id: Some(100 + n as i64),
        })
    }

    async fn fetch_current_episode(&self, case_id: i64) -> Result<EpisodeEnvelope, OracleError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fetch_paused.load(Ordering::SeqCst) {
            self.fetch_release.notified().await;
        }
        self.episodes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(OracleError::Rejected {
                    status: 404,
                    message: format!("case {} has no further episode", case_id),
                })
            })
    }

    async fn mark_case_completed(&self, _case_id: i64) -> Result<(), OracleError> {
        self.completion_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .completion_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(OracleError::Transient("gateway timeout".into()));
        }
        Ok(())
    }
}

pub fn task_unit(history_id: i64) -> AnswerableUnit {
    AnswerableUnit::new(UnitHandle::Task { history_id }, "6 * 7 = ?")
        .with_explanation(Some("Six sevens are forty-two.".to_string()))
        .with_expected_answer(Some("42".to_string()))
}

pub fn task_cell(history_id: i64) -> SessionCell {
    SessionCell::new(InteractionSession::new(task_unit(history_id)))
}

pub fn episode_envelope(case_id: i64, episode_number: u32, total_episodes: u32) -> EpisodeEnvelope {
    let unit = AnswerableUnit::new(
        UnitHandle::Episode {
            case_id,
            episode_number,
        },
        format!("Clue {}", episode_number),
    )
    .with_scene(Some(format!("Scene {}", episode_number)))
    .with_expected_answer(Some(format!("{}", episode_number * 10)))
    .with_explanation(Some(format!("The answer is {}", episode_number * 10)))
    .with_next_hint((episode_number < total_episodes).then(|| format!("Look at scene {}", episode_number + 1)));

    EpisodeEnvelope {
        unit,
        total_episodes,
    }
}

pub fn incorrect(attempts_used: u32) -> CheckReply {
    let remaining_attempts = MAX_ATTEMPTS.saturating_sub(attempts_used);
    let outcome = if remaining_attempts == 0 {
        Outcome::exhausted()
    } else {
        Outcome::IncorrectRetryable {
            remaining_attempts,
            message: None,
        }
    };
    CheckReply::new(outcome).at_attempt(attempts_used)
}

pub fn correct(attempts_used: u32) -> CheckReply {
    CheckReply::new(Outcome::Correct { next_hint: None }).at_attempt(attempts_used)
}
