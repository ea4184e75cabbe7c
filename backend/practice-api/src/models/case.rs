use serde::{Deserialize, Serialize};

use super::answer::Outcome;
use super::session::SessionSnapshot;
use super::unit::AnswerableUnit;

/// What the learning API returns for a case's current episode.
#[derive(Debug, Clone)]
pub struct EpisodeEnvelope {
    pub unit: AnswerableUnit,
    pub total_episodes: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CaseState {
    InProgress {
        current_episode: u32,
        correct_count: u32,
    },
    Completed {
        final_correct_count: u32,
    },
}

impl CaseState {
    pub fn is_completed(&self) -> bool {
        matches!(self, CaseState::Completed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CaseSnapshot {
    pub case_id: i64,
    pub total_episodes: u32,
    #[serde(flatten)]
    pub state: CaseState,
    /// Set while the next episode or the completion call still has to go through.
    pub awaiting: Option<CaseFollowUp>,
    pub episode: SessionSnapshot,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseFollowUp {
    NextEpisode,
    Completion,
}

#[derive(Debug, Serialize)]
pub struct CaseStepResponse {
    pub outcome: Outcome,
    pub feedback: String,
    /// Failure of the follow-up fetch or completion call; retry with `resume`.
    pub follow_up_error: Option<String>,
    pub case: CaseSnapshot,
}

pub fn case_summary(correct_count: u32, total_episodes: u32) -> String {
    format!(
        "Case finished. Correctly solved: {}/{}.",
        correct_count, total_episodes
    )
}
