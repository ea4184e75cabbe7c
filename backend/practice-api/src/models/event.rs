use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::answer::AttemptRecord;
use super::disclosure::{DisclosureKind, DisclosureTrigger};
use super::session::SessionStatus;
use super::unit::UnitHandle;

/// State transitions pushed to presentation layers over SSE.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SessionEvent {
    AttemptJudged(AttemptJudged),
    Disclosed(Disclosed),
    ReportFiled(ReportFiled),
    StatusChanged(StatusChanged),
    EpisodeAdvanced(EpisodeAdvanced),
    CaseCompleted(CaseCompleted),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AttemptJudged {
    pub handle: UnitHandle,
    pub attempt: AttemptRecord,
    pub remaining_attempts: u32,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Disclosed {
    pub handle: UnitHandle,
    pub kind: DisclosureKind,
    pub trigger: DisclosureTrigger,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReportFiled {
    pub handle: UnitHandle,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StatusChanged {
    pub handle: UnitHandle,
    pub from: SessionStatus,
    pub to: SessionStatus,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EpisodeAdvanced {
    pub case_id: i64,
    pub episode_number: u32,
    pub total_episodes: u32,
    pub correct_count: u32,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CaseCompleted {
    pub case_id: i64,
    pub correct_count: u32,
    pub total_episodes: u32,
    pub timestamp: DateTime<Utc>,
}

impl SessionEvent {
    pub fn to_sse_data(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            SessionEvent::AttemptJudged(_) => "attempt-judged",
            SessionEvent::Disclosed(_) => "disclosed",
            SessionEvent::ReportFiled(_) => "report-filed",
            SessionEvent::StatusChanged(_) => "status-changed",
            SessionEvent::EpisodeAdvanced(_) => "episode-advanced",
            SessionEvent::CaseCompleted(_) => "case-completed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_payload_carries_type_tag() {
        let event = SessionEvent::StatusChanged(StatusChanged {
            handle: UnitHandle::Task { history_id: 5 },
            from: SessionStatus::Active,
            to: SessionStatus::Exhausted,
            timestamp: Utc::now(),
        });

        let data: serde_json::Value = serde_json::from_str(&event.to_sse_data()).unwrap();
        assert_eq!(event.event_name(), "status-changed");
        assert_eq!(data["type"], "status-changed");
        assert_eq!(data["to"], "EXHAUSTED");
        assert_eq!(data["handle"]["kind"], "task");
    }
}
