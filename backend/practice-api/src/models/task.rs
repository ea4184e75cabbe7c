use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::session::SessionSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

/// Parameters of a learning-mode task request.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct OpenTaskRequest {
    #[validate(range(min = 1, message = "grade_id must be positive"))]
    pub grade_id: i64,
    #[validate(range(min = 1, message = "topic_id must be positive"))]
    pub topic_id: i64,
    #[validate(range(min = 1, message = "lesson_id must be positive"))]
    pub lesson_id: i64,
    pub difficulty: Difficulty,
}

#[derive(Debug, Serialize)]
pub struct OpenTaskResponse {
    pub session_id: Uuid,
    pub session: SessionSnapshot,
}
