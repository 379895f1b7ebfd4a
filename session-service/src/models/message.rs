use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A persisted chat message.
///
/// Immutable once created except for the read flag. The exact serialized
/// form of this struct is what every live room member receives; broadcasts
/// are always derived from the persisted row so receivers never see a
/// message that failed to persist.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChatMessage {
    pub id: Uuid,
    pub room_id: Uuid,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub body: String,
    /// "text" or "file"
    pub message_type: String,
    pub file_url: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}
