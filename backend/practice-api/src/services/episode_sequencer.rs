use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;

use super::attempt_ledger::AttemptLedger;
use super::disclosure_gate::DisclosureGate;
use super::oracle::LearningOracle;
use super::report_lock::ReportLock;
use super::session_cell::{event_channel, FlightGuard, SessionCell};
use crate::error::{EngineError, Rejection};
use crate::metrics::{record_rejection, CASES_COMPLETED_TOTAL, EPISODES_ADVANCED_TOTAL};
use crate::models::case::{case_summary, CaseFollowUp};
use crate::models::event::{CaseCompleted, EpisodeAdvanced};
use crate::models::report::ReportReceipt;
use crate::models::{
    CaseSnapshot, CaseState, EpisodeEnvelope, InteractionSession, Outcome, SessionEvent,
    SessionStatus,
};
use crate::utils::retry::{retry_transient, RetryConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Playing,
    AwaitingNext,
    AwaitingCompletion,
    Completed,
}

struct CaseInner {
    total_episodes: u32,
    current: Arc<SessionCell>,
    correct_count: u32,
    /// The current episode's terminal status has been counted.
    tallied: bool,
    phase: Phase,
}

/// Result of an episode operation plus the outcome of whatever the case did
/// next. A failed follow-up leaves the case waiting for `resume`.
#[derive(Debug)]
pub struct CaseStep<T> {
    pub value: T,
    pub follow_up_error: Option<EngineError>,
}

/// One run through a case: episodes are played one at a time and the case is
/// marked completed exactly once after the last one ends.
pub struct CaseProgress {
    case_id: i64,
    oracle: Arc<dyn LearningOracle>,
    ledger: AttemptLedger,
    gate: DisclosureGate,
    lock: ReportLock,
    retry: RetryConfig,
    events: broadcast::Sender<SessionEvent>,
    inner: Mutex<CaseInner>,
    stepping: AtomicBool,
    completion_issued: AtomicBool,
    retired: AtomicBool,
}

impl CaseProgress {
    /// Starts (or picks up) a case at whatever episode the learning API
    /// reports as current.
    pub async fn open(
        oracle: Arc<dyn LearningOracle>,
        case_id: i64,
        retry: RetryConfig,
    ) -> Result<Arc<Self>, EngineError> {
        let envelope = Self::fetch(&oracle, case_id, retry.clone()).await?;
        let events = event_channel();
        let current = Arc::new(SessionCell::with_events(
            InteractionSession::new(envelope.unit),
            events.clone(),
        ));

        tracing::info!(
            "Case {} opened at {} of {} episodes",
            case_id,
            current.handle(),
            envelope.total_episodes
        );

        Ok(Arc::new(Self {
            case_id,
            ledger: AttemptLedger::new(oracle.clone()),
            gate: DisclosureGate::new(oracle.clone()),
            lock: ReportLock::new(oracle.clone()),
            oracle,
            retry,
            events,
            inner: Mutex::new(CaseInner {
                total_episodes: envelope.total_episodes,
                current,
                correct_count: 0,
                tallied: false,
                phase: Phase::Playing,
            }),
            stepping: AtomicBool::new(false),
            completion_issued: AtomicBool::new(false),
            retired: AtomicBool::new(false),
        }))
    }

    async fn fetch(
        oracle: &Arc<dyn LearningOracle>,
        case_id: i64,
        retry: RetryConfig,
    ) -> Result<EpisodeEnvelope, EngineError> {
        retry_transient(retry, move || oracle.fetch_current_episode(case_id))
            .await
            .map_err(|e| {
                tracing::warn!("Failed to fetch current episode of case {}: {}", case_id, e);
                EngineError::from(e)
            })
    }

    fn lock_inner(&self) -> MutexGuard<'_, CaseInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn case_id(&self) -> i64 {
        self.case_id
    }

    pub fn current(&self) -> Arc<SessionCell> {
        self.lock_inner().current.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> CaseState {
        let inner = self.lock_inner();
        Self::state_of(&inner)
    }

    fn state_of(inner: &CaseInner) -> CaseState {
        match inner.phase {
            Phase::Completed => CaseState::Completed {
                final_correct_count: inner.correct_count,
            },
            _ => CaseState::InProgress {
                current_episode: inner.current.handle().episode_number().unwrap_or(0),
                correct_count: inner.correct_count,
            },
        }
    }

    pub fn snapshot(&self) -> CaseSnapshot {
        let inner = self.lock_inner();
        let completed = inner.phase == Phase::Completed;
        CaseSnapshot {
            case_id: self.case_id,
            total_episodes: inner.total_episodes,
            state: Self::state_of(&inner),
            awaiting: match inner.phase {
                Phase::AwaitingNext => Some(CaseFollowUp::NextEpisode),
                Phase::AwaitingCompletion => Some(CaseFollowUp::Completion),
                Phase::Playing | Phase::Completed => None,
            },
            episode: inner.current.snapshot(),
            summary: completed.then(|| case_summary(inner.correct_count, inner.total_episodes)),
        }
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Refuses work once the run is discarded. Callers hold the inner lock so
    /// the check cannot interleave with `retire`.
    fn ensure_live(&self, _inner: &CaseInner) -> Result<(), EngineError> {
        if self.is_retired() {
            tracing::warn!("Dropping work for discarded case {}", self.case_id);
            record_rejection("stale");
            return Err(EngineError::Stale);
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<Arc<SessionCell>, EngineError> {
        let inner = self.lock_inner();
        self.ensure_live(&inner)?;
        if inner.phase == Phase::Completed {
            record_rejection("validation");
            return Err(Rejection::CaseCompleted.into());
        }
        Ok(inner.current.clone())
    }

    pub async fn submit_attempt(&self, answer: &str) -> Result<CaseStep<Outcome>, EngineError> {
        let cell = self.ensure_open()?;
        let outcome = self.ledger.submit_attempt(&cell, answer).await?;
        let follow_up_error = self.observe(&cell).await.err();
        Ok(CaseStep {
            value: outcome,
            follow_up_error,
        })
    }

    pub async fn reveal_hint(&self) -> Result<bool, EngineError> {
        let cell = self.ensure_open()?;
        self.gate.reveal_hint(&cell).await
    }

    pub async fn reveal_solution(&self) -> Result<bool, EngineError> {
        let cell = self.ensure_open()?;
        self.gate.reveal_solution(&cell).await
    }

    /// Reporting an episode ends it; the case moves on as it would after
    /// exhaustion.
    pub async fn file_report(
        &self,
        description: &str,
    ) -> Result<CaseStep<ReportReceipt>, EngineError> {
        let cell = self.ensure_open()?;
        let receipt = self.lock.file_report(&cell, description).await?;
        let follow_up_error = self.observe(&cell).await.err();
        Ok(CaseStep {
            value: receipt,
            follow_up_error,
        })
    }

    /// Retries the next-episode fetch or the completion call after a failure.
    pub async fn resume(&self) -> Result<(), EngineError> {
        let cell = self.current();
        self.observe(&cell).await
    }

    /// Discards the case run; responses still in flight are dropped.
    pub fn retire(&self) {
        let current = {
            let inner = self.lock_inner();
            if self.retired.swap(true, Ordering::AcqRel) {
                return;
            }
            inner.current.clone()
        };
        current.retire();
        tracing::debug!("Case {} discarded", self.case_id);
    }

    async fn observe(&self, cell: &Arc<SessionCell>) -> Result<(), EngineError> {
        let phase = {
            let mut inner = self.lock_inner();
            self.ensure_live(&inner)?;
            if !Arc::ptr_eq(&inner.current, cell) {
                return Ok(());
            }
            let status = cell.status();
            if !status.is_terminal() {
                return Ok(());
            }
            if !inner.tallied {
                inner.tallied = true;
                if status == SessionStatus::Solved {
                    inner.correct_count += 1;
                }
                let episode_number = cell.handle().episode_number().unwrap_or(0);
                inner.phase = if episode_number >= inner.total_episodes {
                    Phase::AwaitingCompletion
                } else {
                    Phase::AwaitingNext
                };
                tracing::info!(
                    "Case {} episode {} ended {} ({} correct so far)",
                    self.case_id,
                    episode_number,
                    status.as_str(),
                    inner.correct_count
                );
            }
            inner.phase
        };

        match phase {
            Phase::AwaitingNext => self.advance().await,
            Phase::AwaitingCompletion => self.complete().await,
            Phase::Playing | Phase::Completed => Ok(()),
        }
    }

    async fn advance(&self) -> Result<(), EngineError> {
        let _stepping = FlightGuard::acquire(&self.stepping)?;
        let finished = {
            let inner = self.lock_inner();
            if inner.phase != Phase::AwaitingNext {
                return Ok(());
            }
            inner.current.handle().episode_number().unwrap_or(0)
        };

        let envelope = Self::fetch(&self.oracle, self.case_id, self.retry.clone()).await?;
        let next = envelope.unit.handle.episode_number().unwrap_or(0);
        if next <= finished {
            tracing::error!(
                "Case {} returned episode {} after episode {}",
                self.case_id,
                next,
                finished
            );
            return Err(EngineError::Server {
                status: 409,
                message: format!(
                    "case {} did not advance past episode {}",
                    self.case_id, finished
                ),
            });
        }

        let cell = Arc::new(SessionCell::with_events(
            InteractionSession::new(envelope.unit),
            self.events.clone(),
        ));
        let (previous, correct_count) = {
            let mut inner = self.lock_inner();
            if let Err(e) = self.ensure_live(&inner) {
                drop(inner);
                cell.retire();
                return Err(e);
            }
            let previous = std::mem::replace(&mut inner.current, cell);
            inner.total_episodes = envelope.total_episodes;
            inner.tallied = false;
            inner.phase = Phase::Playing;
            (previous, inner.correct_count)
        };
        previous.retire();

        EPISODES_ADVANCED_TOTAL.inc();
        tracing::info!(
            "Case {} advanced to episode {} of {}",
            self.case_id,
            next,
            envelope.total_episodes
        );
        let _ = self
            .events
            .send(SessionEvent::EpisodeAdvanced(EpisodeAdvanced {
                case_id: self.case_id,
                episode_number: next,
                total_episodes: envelope.total_episodes,
                correct_count,
                timestamp: Utc::now(),
            }));

        Ok(())
    }

    async fn complete(&self) -> Result<(), EngineError> {
        if self
            .completion_issued
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        let live = {
            let inner = self.lock_inner();
            self.ensure_live(&inner)
        };
        if let Err(e) = live {
            self.completion_issued.store(false, Ordering::Release);
            return Err(e);
        }

        let oracle = &self.oracle;
        let case_id = self.case_id;
        if let Err(e) =
            retry_transient(self.retry.clone(), move || oracle.mark_case_completed(case_id)).await
        {
            self.completion_issued.store(false, Ordering::Release);
            tracing::warn!("Failed to mark case {} completed: {}", case_id, e);
            return Err(e.into());
        }

        let (correct_count, total_episodes) = {
            let mut inner = self.lock_inner();
            self.ensure_live(&inner)?;
            inner.phase = Phase::Completed;
            (inner.correct_count, inner.total_episodes)
        };

        CASES_COMPLETED_TOTAL.inc();
        tracing::info!(
            "Case {} completed: {}/{} correct",
            case_id,
            correct_count,
            total_episodes
        );
        let _ = self.events.send(SessionEvent::CaseCompleted(CaseCompleted {
            case_id,
            correct_count,
            total_episodes,
            timestamp: Utc::now(),
        }));

        Ok(())
    }
}
