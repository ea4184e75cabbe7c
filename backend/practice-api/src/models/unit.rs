use serde::{Deserialize, Serialize};
use std::fmt;

/// Remote identity of an answerable unit, issued by the learning API.
///
/// Every oracle call receives the handle by value; nothing about the remote
/// session lives in process-wide state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnitHandle {
    Task { history_id: i64 },
    Episode { case_id: i64, episode_number: u32 },
}

impl UnitHandle {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            UnitHandle::Task { .. } => "task",
            UnitHandle::Episode { .. } => "episode",
        }
    }

    pub fn is_episode(&self) -> bool {
        matches!(self, UnitHandle::Episode { .. })
    }

    pub fn episode_number(&self) -> Option<u32> {
        match self {
            UnitHandle::Task { .. } => None,
            UnitHandle::Episode { episode_number, .. } => Some(*episode_number),
        }
    }
}

impl fmt::Display for UnitHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitHandle::Task { history_id } => write!(f, "task:{}", history_id),
            UnitHandle::Episode {
                case_id,
                episode_number,
            } => write!(f, "case:{}/episode:{}", case_id, episode_number),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hint {
    pub id: Option<i64>,
    pub text: String,
    pub order: i32,
}

/// A task or a single case episode, immutable once fetched.
#[derive(Debug, Clone)]
pub struct AnswerableUnit {
    pub handle: UnitHandle,
    pub prompt: String,
    /// Sorted by `order`.
    pub hints: Vec<Hint>,
    pub explanation: Option<String>,
    /// Opaque to the engine; only ever shown back to the student, never compared.
    pub expected_answer: Option<String>,
    pub scene_text: Option<String>,
    /// Next clue of a case, revealed once the episode is resolved.
    pub next_hint: Option<String>,
}

impl AnswerableUnit {
    pub fn new(handle: UnitHandle, prompt: impl Into<String>) -> Self {
        Self {
            handle,
            prompt: prompt.into(),
            hints: Vec::new(),
            explanation: None,
            expected_answer: None,
            scene_text: None,
            next_hint: None,
        }
    }

    pub fn with_hints(mut self, mut hints: Vec<Hint>) -> Self {
        hints.sort_by_key(|hint| hint.order);
        self.hints = hints;
        self
    }

    pub fn with_explanation(mut self, explanation: Option<String>) -> Self {
        self.explanation = explanation;
        self
    }

    pub fn with_expected_answer(mut self, answer: Option<String>) -> Self {
        self.expected_answer = answer;
        self
    }

    pub fn with_scene(mut self, scene_text: Option<String>) -> Self {
        self.scene_text = scene_text;
        self
    }

    pub fn with_next_hint(mut self, next_hint: Option<String>) -> Self {
        self.next_hint = next_hint;
        self
    }
}
