use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomKind {
    #[serde(rename = "direct")]
    Direct,
    #[serde(rename = "study_group")]
    StudyGroup,
    #[serde(rename = "exam")]
    Exam,
}

impl RoomKind {
    pub fn from_str(value: &str) -> Self {
        match value {
            "study_group" => RoomKind::StudyGroup,
            "exam" => RoomKind::Exam,
            _ => RoomKind::Direct,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RoomKind::Direct => "direct",
            RoomKind::StudyGroup => "study_group",
            RoomKind::Exam => "exam",
        }
    }
}

/// Durable room record. The live multicast group over currently-connected
/// members is a derived index owned by the ConnectionRegistry, not part of
/// this row.
#[derive(Debug, Clone)]
pub struct Room {
    pub id: Uuid,
    pub name: String,
    pub kind: RoomKind,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}
