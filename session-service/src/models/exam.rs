use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    #[serde(rename = "active")]
    Active,
    #[serde(rename = "completed")]
    Completed,
}

impl SessionStatus {
    pub fn from_str(value: &str) -> Self {
        match value {
            "completed" => SessionStatus::Completed,
            _ => SessionStatus::Active,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
        }
    }
}

/// Live, resumable state of one user's attempt at one exam.
///
/// Progress updates overwrite; there is no increment path. Once the status
/// reaches `completed` the row is never written again.
#[derive(Debug, Clone)]
pub struct ExamSession {
    pub exam_id: Uuid,
    pub user_id: Uuid,
    pub current_question: i32,
    pub time_remaining_seconds: i32,
    /// Sparse, index-addressed answer list (JSON array, nulls for skips).
    pub answers: serde_json::Value,
    pub status: SessionStatus,
    pub last_activity_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExamResult {
    pub exam_id: Uuid,
    pub user_id: Uuid,
    pub correct_count: i32,
    pub total_questions: i32,
    pub score_percent: f64,
    pub completed_at: DateTime<Utc>,
}
