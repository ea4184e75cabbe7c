use serde::{Deserialize, Serialize};

use super::answer::{AttemptRecord, MAX_ATTEMPTS};
use super::disclosure::DisclosureKind;
use super::unit::{AnswerableUnit, Hint, UnitHandle};
use crate::error::Rejection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Active,
    Solved,
    Exhausted,
    Reported,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        self != SessionStatus::Active
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Solved => "solved",
            SessionStatus::Exhausted => "exhausted",
            SessionStatus::Reported => "reported",
        }
    }
}

/// A state change requested by one of the engine components.
#[derive(Debug, Clone)]
pub enum Change {
    /// A judged answer. `exhausted` is the oracle saying no attempts remain.
    Attempt {
        record: AttemptRecord,
        exhausted: bool,
    },
    HintDisclosed,
    SolutionDisclosed,
    Reported,
}

/// What `InteractionSession::apply` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Applied {
    pub from: SessionStatus,
    pub to: SessionStatus,
    /// False when the change was refused and nothing was written.
    pub effective: bool,
    /// The transition left `Active` while the solution was still hidden; the
    /// caller owes exactly one solution-view recording.
    pub solution_forced: bool,
}

impl Applied {
    fn refused(status: SessionStatus) -> Self {
        Self {
            from: status,
            to: status,
            effective: false,
            solution_forced: false,
        }
    }

    pub fn status_changed(&self) -> bool {
        self.from != self.to
    }
}

/// Attempts, disclosures and report state for one answerable unit.
#[derive(Debug, Clone)]
pub struct InteractionSession {
    unit: AnswerableUnit,
    attempts: Vec<AttemptRecord>,
    hint_disclosed: bool,
    solution_disclosed: bool,
    reported: bool,
    status: SessionStatus,
}

impl InteractionSession {
    pub fn new(unit: AnswerableUnit) -> Self {
        Self {
            unit,
            attempts: Vec::new(),
            hint_disclosed: false,
            solution_disclosed: false,
            reported: false,
            status: SessionStatus::Active,
        }
    }

    /// Rebuilds a session from attempts the learning API already holds.
    pub fn resume(unit: AnswerableUnit, mut attempts: Vec<AttemptRecord>) -> Self {
        attempts.truncate(MAX_ATTEMPTS as usize);
        let status = if attempts.iter().any(|a| a.correct) {
            SessionStatus::Solved
        } else if attempts.len() >= MAX_ATTEMPTS as usize {
            SessionStatus::Exhausted
        } else {
            SessionStatus::Active
        };

        Self {
            unit,
            attempts,
            hint_disclosed: false,
            solution_disclosed: status.is_terminal(),
            reported: false,
            status,
        }
    }

    pub fn unit(&self) -> &AnswerableUnit {
        &self.unit
    }

    pub fn handle(&self) -> UnitHandle {
        self.unit.handle
    }

    pub fn attempts(&self) -> &[AttemptRecord] {
        &self.attempts
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn hint_disclosed(&self) -> bool {
        self.hint_disclosed
    }

    pub fn solution_disclosed(&self) -> bool {
        self.solution_disclosed
    }

    pub fn reported(&self) -> bool {
        self.reported
    }

    pub fn is_disclosed(&self, kind: DisclosureKind) -> bool {
        match kind {
            DisclosureKind::Hint => self.hint_disclosed,
            DisclosureKind::Solution => self.solution_disclosed,
        }
    }

    pub fn remaining_attempts(&self) -> u32 {
        if self.status.is_terminal() {
            return 0;
        }
        MAX_ATTEMPTS.saturating_sub(self.attempts.len() as u32)
    }

    pub fn ensure_active(&self) -> Result<(), Rejection> {
        if self.status.is_terminal() {
            return Err(Rejection::SessionClosed(self.status));
        }
        Ok(())
    }

    /// The only writer of session state.
    pub fn apply(&mut self, change: Change) -> Applied {
        let from = self.status;

        match change {
            Change::Attempt { record, exhausted } => {
                if from.is_terminal() || self.attempts.len() >= MAX_ATTEMPTS as usize {
                    return Applied::refused(from);
                }
                let correct = record.correct;
                self.attempts.push(record);
                self.status = if correct {
                    SessionStatus::Solved
                } else if exhausted || self.attempts.len() >= MAX_ATTEMPTS as usize {
                    SessionStatus::Exhausted
                } else {
                    SessionStatus::Active
                };
            }
            Change::HintDisclosed => self.hint_disclosed = true,
            Change::SolutionDisclosed => self.solution_disclosed = true,
            Change::Reported => {
                if self.reported {
                    return Applied::refused(from);
                }
                self.reported = true;
                self.hint_disclosed = true;
                self.status = SessionStatus::Reported;
            }
        }

        let to = self.status;
        let solution_forced = to.is_terminal() && !self.solution_disclosed;
        if solution_forced {
            self.solution_disclosed = true;
        }

        Applied {
            from,
            to,
            effective: true,
            solution_forced,
        }
    }

    /// Presentation view. Hints and the solution only appear once disclosed.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            handle: self.unit.handle,
            status: self.status,
            prompt: self.unit.prompt.clone(),
            scene_text: self.unit.scene_text.clone(),
            attempts: self.attempts.clone(),
            remaining_attempts: self.remaining_attempts(),
            hint_disclosed: self.hint_disclosed,
            solution_disclosed: self.solution_disclosed,
            reported: self.reported,
            hints: if self.hint_disclosed {
                self.unit.hints.clone()
            } else {
                Vec::new()
            },
            explanation: self
                .solution_disclosed
                .then(|| self.unit.explanation.clone())
                .flatten(),
            correct_answer: self
                .solution_disclosed
                .then(|| self.unit.expected_answer.clone())
                .flatten(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub handle: UnitHandle,
    pub status: SessionStatus,
    pub prompt: String,
    pub scene_text: Option<String>,
    pub attempts: Vec<AttemptRecord>,
    pub remaining_attempts: u32,
    pub hint_disclosed: bool,
    pub solution_disclosed: bool,
    pub reported: bool,
    pub hints: Vec<Hint>,
    pub explanation: Option<String>,
    pub correct_answer: Option<String>,
}
