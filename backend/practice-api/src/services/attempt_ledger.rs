use chrono::Utc;
use std::sync::Arc;

use super::disclosure_gate::DisclosureGate;
use super::oracle::LearningOracle;
use super::session_cell::SessionCell;
use crate::error::{EngineError, Rejection};
use crate::metrics::{record_rejection, ATTEMPTS_TOTAL};
use crate::models::{AttemptRecord, Change, Outcome, SessionStatus, MAX_ATTEMPTS};

/// Answer attempts for one session, counted and judged by the learning API.
pub struct AttemptLedger {
    oracle: Arc<dyn LearningOracle>,
    gate: DisclosureGate,
}

impl AttemptLedger {
    pub fn new(oracle: Arc<dyn LearningOracle>) -> Self {
        Self {
            gate: DisclosureGate::new(oracle.clone()),
            oracle,
        }
    }

    pub async fn submit_attempt(
        &self,
        cell: &SessionCell,
        answer: &str,
    ) -> Result<Outcome, EngineError> {
        let answer = answer.trim();
        if answer.is_empty() {
            record_rejection("validation");
            return Err(Rejection::BlankAnswer.into());
        }

        let guard = cell.begin()?;
        let (handle, attempts_so_far, correct_answer, next_hint) = cell
            .read(|s| {
                s.ensure_active().map(|_| {
                    (
                        s.handle(),
                        s.attempts().len() as u32,
                        s.unit().expected_answer.clone(),
                        s.unit().next_hint.clone(),
                    )
                })
            })
            .map_err(|rejection| {
                record_rejection("validation");
                tracing::debug!("Attempt refused: {}", rejection);
                EngineError::from(rejection)
            })?;

        tracing::info!(
            "Submitting attempt {} for {}",
            attempts_so_far + 1,
            handle
        );

        let reply = match self.oracle.check_answer(handle, answer).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!("Answer check failed for {}: {}", handle, e);
                return Err(e.into());
            }
        };

        let outcome = reply
            .outcome
            .with_reveal(correct_answer.clone(), next_hint.clone());
        let record = AttemptRecord {
            attempt_number: reply
                .attempt_number
                .unwrap_or(attempts_so_far + 1)
                .min(MAX_ATTEMPTS),
            answer: answer.to_string(),
            correct: outcome.is_correct(),
            recorded_at: reply.recorded_at.unwrap_or_else(Utc::now),
        };
        let exhausted = matches!(outcome, Outcome::IncorrectExhausted { .. });

        let applied = cell.commit(&guard, Change::Attempt { record, exhausted })?;

        // The local ceiling can close the session even when the learning API
        // still reported attempts left.
        let outcome = if applied.to == SessionStatus::Exhausted && !outcome.is_terminal() {
            Outcome::IncorrectExhausted {
                correct_answer,
                next_hint,
            }
        } else {
            outcome
        };

        ATTEMPTS_TOTAL
            .with_label_values(&[handle.kind(), outcome.label()])
            .inc();
        tracing::info!(
            "Attempt judged for {}: {} (status {})",
            handle,
            outcome.label(),
            applied.to.as_str()
        );

        if applied.solution_forced {
            self.gate.record_forced(handle).await;
        }

        drop(guard);
        Ok(outcome)
    }
}
