use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::session::SessionSnapshot;

/// Attempts allowed per task or case episode.
pub const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitAnswerRequest {
    #[validate(length(max = 500, message = "Answer must be at most 500 characters"))]
    pub answer: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitAnswerResponse {
    pub outcome: Outcome,
    pub feedback: String,
    pub session: SessionSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Attempt number as confirmed by the learning API.
    pub attempt_number: u32,
    pub answer: String,
    pub correct: bool,
    pub recorded_at: DateTime<Utc>,
}

/// Classification of one answer check. Both exhaustion signals of the
/// learning API (zero remaining attempts, or the dedicated error status)
/// arrive here as `IncorrectExhausted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Correct {
        next_hint: Option<String>,
    },
    IncorrectRetryable {
        remaining_attempts: u32,
        message: Option<String>,
    },
    IncorrectExhausted {
        correct_answer: Option<String>,
        next_hint: Option<String>,
    },
}

impl Outcome {
    pub fn exhausted() -> Self {
        Outcome::IncorrectExhausted {
            correct_answer: None,
            next_hint: None,
        }
    }

    pub fn is_correct(&self) -> bool {
        matches!(self, Outcome::Correct { .. })
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Outcome::IncorrectRetryable { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Correct { .. } => "correct",
            Outcome::IncorrectRetryable { .. } => "incorrect_retryable",
            Outcome::IncorrectExhausted { .. } => "incorrect_exhausted",
        }
    }

    /// Fills in what the unit itself knows: the correct answer on exhaustion
    /// (whichever channel signalled it) and the next clue of a case.
    pub fn with_reveal(self, correct_answer: Option<String>, next_hint: Option<String>) -> Self {
        match self {
            Outcome::Correct { next_hint: hint } => Outcome::Correct {
                next_hint: hint.or(next_hint),
            },
            Outcome::IncorrectExhausted {
                correct_answer: answer,
                next_hint: hint,
            } => Outcome::IncorrectExhausted {
                correct_answer: answer.or(correct_answer),
                next_hint: hint.or(next_hint),
            },
            retryable => retryable,
        }
    }

    pub fn feedback(&self) -> String {
        match self {
            Outcome::Correct { next_hint: None } => "Correct! Well done.".to_string(),
            Outcome::Correct {
                next_hint: Some(hint),
            } => format!("Correct! Next clue: {}", hint),
            Outcome::IncorrectRetryable {
                message: Some(message),
                ..
            } => message.clone(),
            Outcome::IncorrectRetryable {
                remaining_attempts,
                message: None,
            } => format!("Incorrect. Attempts remaining: {}", remaining_attempts),
            Outcome::IncorrectExhausted {
                correct_answer,
                next_hint,
            } => {
                let mut text = "No attempts left.".to_string();
                if let Some(answer) = correct_answer {
                    text.push_str(&format!(" Correct answer: {}", answer));
                }
                if let Some(hint) = next_hint {
                    text.push_str(&format!("\nNext clue: {}", hint));
                }
                text
            }
        }
    }
}

/// Answer check result as normalized at the oracle boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckReply {
    pub outcome: Outcome,
    pub attempt_number: Option<u32>,
    pub recorded_at: Option<DateTime<Utc>>,
}

impl CheckReply {
    pub fn new(outcome: Outcome) -> Self {
        Self {
            outcome,
            attempt_number: None,
            recorded_at: None,
        }
    }

    pub fn at_attempt(mut self, attempt_number: u32) -> Self {
        self.attempt_number = Some(attempt_number);
        self
    }
}
