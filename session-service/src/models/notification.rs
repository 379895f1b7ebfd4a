use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub sender_id: Option<Uuid>,
    pub notification_type: String,
    pub title: String,
    pub body: String,
    /// "low" | "normal" | "high"
    pub priority: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}
