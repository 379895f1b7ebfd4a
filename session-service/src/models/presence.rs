use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PresenceStatus {
    #[serde(rename = "online")]
    Online,
    #[serde(rename = "offline")]
    Offline,
}

impl PresenceStatus {
    pub fn from_str(value: &str) -> Self {
        match value {
            "online" => PresenceStatus::Online,
            _ => PresenceStatus::Offline,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceStatus::Online => "online",
            PresenceStatus::Offline => "offline",
        }
    }
}

/// One row per user, last write wins. `connection_id` identifies the most
/// recent connection; on multi-login the newest connection owns the entry.
#[derive(Debug, Clone)]
pub struct PresenceEntry {
    pub user_id: Uuid,
    pub connection_id: Option<Uuid>,
    pub status: PresenceStatus,
    pub room_id: Option<Uuid>,
    pub last_seen_at: DateTime<Utc>,
}
