//! Outbound event surface.
//!
//! Every event a client can receive is a variant here, named
//! `object.action`. All events share one top-level JSON shape: `type`,
//! `timestamp`, then the variant's own fields flattened in. Serialization
//! happens in exactly one place (`to_payload`), so no handler builds event
//! JSON by hand.

use crate::models::exam::ExamResult;
use crate::models::leaderboard::LeaderboardEntry;
use crate::models::message::ChatMessage;
use crate::models::notification::Notification;
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub enum ServerEvent {
    #[serde(rename = "room.history")]
    RoomHistory {
        room_id: Uuid,
        messages: Vec<ChatMessage>,
    },

    #[serde(rename = "room.participant_joined")]
    ParticipantJoined {
        room_id: Uuid,
        user_id: Uuid,
        display_name: String,
    },

    #[serde(rename = "room.participant_left")]
    ParticipantLeft { room_id: Uuid, user_id: Uuid },

    #[serde(rename = "room.deleted")]
    RoomDeleted { room_id: Uuid },

    #[serde(rename = "message.new")]
    MessageNew { message: ChatMessage },

    /// Short-form alert pushed to a participant who is online but sitting
    /// in some other room. Not persisted; offline participants get a
    /// Notification row instead.
    #[serde(rename = "message.alert")]
    MessageAlert {
        room_id: Uuid,
        sender_id: Uuid,
        sender_name: String,
        preview: String,
    },

    #[serde(rename = "typing.update")]
    TypingUpdate {
        room_id: Uuid,
        user_id: Uuid,
        is_typing: bool,
    },

    #[serde(rename = "presence.changed")]
    PresenceChanged { user_id: Uuid, status: String },

    #[serde(rename = "exam.joined")]
    ExamJoined {
        exam_id: Uuid,
        current_question: i32,
        time_remaining: i32,
        resumed: bool,
    },

    #[serde(rename = "exam.progress_saved")]
    ExamProgressSaved {
        exam_id: Uuid,
        current_question: i32,
        time_remaining: i32,
    },

    #[serde(rename = "exam.completed")]
    ExamCompleted { exam_id: Uuid, result: ExamResult },

    #[serde(rename = "exam.participant_completed")]
    ExamParticipantCompleted {
        exam_id: Uuid,
        user_id: Uuid,
        display_name: String,
    },

    #[serde(rename = "exam.participant_count")]
    ExamParticipantCount { exam_id: Uuid, count: usize },

    #[serde(rename = "leaderboard.snapshot")]
    LeaderboardSnapshot {
        period: String,
        specialty: String,
        entries: Vec<LeaderboardEntry>,
    },

    #[serde(rename = "notification.new")]
    NotificationNew { notification: Notification },

    #[serde(rename = "notification.unread_count")]
    UnreadCount { unread_count: i64 },

    #[serde(rename = "heartbeat.ack")]
    HeartbeatAck,

    #[serde(rename = "error")]
    Error { code: String, message: String },
}

impl ServerEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RoomHistory { .. } => "room.history",
            Self::ParticipantJoined { .. } => "room.participant_joined",
            Self::ParticipantLeft { .. } => "room.participant_left",
            Self::RoomDeleted { .. } => "room.deleted",
            Self::MessageNew { .. } => "message.new",
            Self::MessageAlert { .. } => "message.alert",
            Self::TypingUpdate { .. } => "typing.update",
            Self::PresenceChanged { .. } => "presence.changed",
            Self::ExamJoined { .. } => "exam.joined",
            Self::ExamProgressSaved { .. } => "exam.progress_saved",
            Self::ExamCompleted { .. } => "exam.completed",
            Self::ExamParticipantCompleted { .. } => "exam.participant_completed",
            Self::ExamParticipantCount { .. } => "exam.participant_count",
            Self::LeaderboardSnapshot { .. } => "leaderboard.snapshot",
            Self::NotificationNew { .. } => "notification.new",
            Self::UnreadCount { .. } => "notification.unread_count",
            Self::HeartbeatAck => "heartbeat.ack",
            Self::Error { .. } => "error",
        }
    }

    /// Serialize to the flat wire shape.
    ///
    /// The derived serialization is externally tagged; this unwraps the tag
    /// and merges the variant fields next to `type` and `timestamp`.
    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        let mut payload = serde_json::json!({
            "type": self.event_type(),
            "timestamp": Utc::now().to_rfc3339(),
        });

        if let serde_json::Value::Object(outer) = serde_json::to_value(self)? {
            for (_, fields) in outer {
                if let serde_json::Value::Object(map) = fields {
                    for (key, value) in map {
                        payload[key] = value;
                    }
                }
            }
        }

        serde_json::to_string(&payload)
    }

    /// Build the `error` event for a failed command.
    pub fn from_error(err: &crate::error::AppError) -> Self {
        Self::Error {
            code: err.code().to_string(),
            message: err.public_message(),
        }
    }
}
