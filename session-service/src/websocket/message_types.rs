use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Commands a client may issue over an established connection.
///
/// This is the whole inbound surface: payloads are parsed into these typed
/// variants at the boundary, and anything that does not parse is rejected
/// with a validation error before reaching a handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientCommand {
    #[serde(rename = "join-room", rename_all = "camelCase")]
    JoinRoom { room_id: Uuid },

    #[serde(rename = "leave-room", rename_all = "camelCase")]
    LeaveRoom { room_id: Uuid },

    #[serde(rename = "delete-room", rename_all = "camelCase")]
    DeleteRoom { room_id: Uuid },

    #[serde(rename = "send-message", rename_all = "camelCase")]
    SendMessage {
        room_id: Uuid,
        message: String,
        #[serde(default = "default_message_type")]
        message_type: String,
        #[serde(default)]
        file_url: Option<String>,
    },

    #[serde(rename = "typing-indicator", rename_all = "camelCase")]
    TypingIndicator { room_id: Uuid, is_typing: bool },

    #[serde(rename = "join-exam", rename_all = "camelCase")]
    JoinExam { exam_id: Uuid },

    #[serde(rename = "exam-progress", rename_all = "camelCase")]
    ExamProgress {
        exam_id: Uuid,
        current_question: i32,
        time_remaining: i32,
        answers: serde_json::Value,
    },

    #[serde(rename = "exam-complete", rename_all = "camelCase")]
    ExamComplete { exam_id: Uuid },

    #[serde(rename = "leaderboard-request", rename_all = "camelCase")]
    LeaderboardRequest {
        #[serde(default)]
        period: Option<String>,
        #[serde(default)]
        specialty: Option<String>,
        #[serde(default)]
        limit: Option<i64>,
    },

    #[serde(rename = "leaderboard-refresh")]
    LeaderboardRefresh,

    #[serde(rename = "notification-send", rename_all = "camelCase")]
    NotificationSend {
        #[serde(default)]
        user_id: Option<Uuid>,
        notification_type: String,
        title: String,
        message: String,
        #[serde(default)]
        priority: Option<String>,
    },

    #[serde(rename = "notification-read", rename_all = "camelCase")]
    NotificationRead { notification_id: Uuid },

    #[serde(rename = "notification-read-all")]
    NotificationReadAll,

    #[serde(rename = "heartbeat")]
    Heartbeat,
}

fn default_message_type() -> String {
    "text".to_string()
}

impl ClientCommand {
    /// Command name as it appears on the wire, for logs and metrics labels.
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinRoom { .. } => "join-room",
            Self::LeaveRoom { .. } => "leave-room",
            Self::DeleteRoom { .. } => "delete-room",
            Self::SendMessage { .. } => "send-message",
            Self::TypingIndicator { .. } => "typing-indicator",
            Self::JoinExam { .. } => "join-exam",
            Self::ExamProgress { .. } => "exam-progress",
            Self::ExamComplete { .. } => "exam-complete",
            Self::LeaderboardRequest { .. } => "leaderboard-request",
            Self::LeaderboardRefresh => "leaderboard-refresh",
            Self::NotificationSend { .. } => "notification-send",
            Self::NotificationRead { .. } => "notification-read",
            Self::NotificationReadAll => "notification-read-all",
            Self::Heartbeat => "heartbeat",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_message_with_defaults() {
        let room = Uuid::new_v4();
        let raw = format!(r#"{{"type":"send-message","roomId":"{room}","message":"hi"}}"#);
        let cmd: ClientCommand = serde_json::from_str(&raw).unwrap();
        match cmd {
            ClientCommand::SendMessage {
                room_id,
                message,
                message_type,
                file_url,
            } => {
                assert_eq!(room_id, room);
                assert_eq!(message, "hi");
                assert_eq!(message_type, "text");
                assert!(file_url.is_none());
            }
            other => panic!("parsed wrong variant: {other:?}"),
        }
    }

    #[test]
    fn unknown_command_fails_to_parse() {
        let raw = r#"{"type":"drop-tables","roomId":"not-even-a-uuid"}"#;
        assert!(serde_json::from_str::<ClientCommand>(raw).is_err());
    }

    #[test]
    fn missing_required_field_fails_to_parse() {
        let raw = r#"{"type":"join-room"}"#;
        assert!(serde_json::from_str::<ClientCommand>(raw).is_err());
    }

    #[test]
    fn heartbeat_needs_no_payload() {
        let cmd: ClientCommand = serde_json::from_str(r#"{"type":"heartbeat"}"#).unwrap();
        assert_eq!(cmd.name(), "heartbeat");
    }
}
