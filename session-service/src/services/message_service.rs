use crate::error::{AppError, AppResult};
use crate::models::identity::Identity;
use crate::models::message::ChatMessage;
use crate::models::room::{Room, RoomKind};
use crate::services::room_service::RoomService;
use crate::services::sanitize;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

pub struct MessageService;

impl MessageService {
    /// Sanitize and persist a chat message, returning the stored row.
    ///
    /// This is the only place chat persistence happens; every broadcast is
    /// derived from the row returned here, so a message that fails to
    /// persist is never seen by anyone.
    pub async fn persist_message(
        db: &Pool<Postgres>,
        room: &Room,
        sender: &Identity,
        body: &str,
        message_type: &str,
        file_url: Option<&str>,
    ) -> AppResult<ChatMessage> {
        let body = sanitize::sanitize_markup(body);
        if body.trim().is_empty() && file_url.is_none() {
            return Err(AppError::BadRequest("message is empty".into()));
        }
        if !matches!(message_type, "text" | "file") {
            return Err(AppError::BadRequest("unknown message type".into()));
        }

        // Study groups are member-only; direct and open rooms accept any
        // authenticated sender.
        if room.kind == RoomKind::StudyGroup
            && !RoomService::is_participant(db, room.id, sender.user_id).await?
        {
            return Err(AppError::Forbidden(
                "not a participant of this study group".into(),
            ));
        }

        let message = sqlx::query_as::<_, ChatMessage>(
            "INSERT INTO messages (room_id, sender_id, sender_name, body, message_type, file_url) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id, room_id, sender_id, sender_name, body, message_type, file_url, is_read, created_at",
        )
        .bind(room.id)
        .bind(sender.user_id)
        .bind(&sender.display_name)
        .bind(&body)
        .bind(message_type)
        .bind(file_url)
        .fetch_one(db)
        .await?;

        Ok(message)
    }

    /// Bounded recent history: fetched most-recent-first, returned in
    /// chronological order for delivery to a joining connection.
    pub async fn recent_history(
        db: &Pool<Postgres>,
        room_id: Uuid,
        limit: i64,
    ) -> AppResult<Vec<ChatMessage>> {
        let mut messages = sqlx::query_as::<_, ChatMessage>(
            "SELECT id, room_id, sender_id, sender_name, body, message_type, file_url, is_read, created_at \
             FROM messages WHERE room_id = $1 \
             ORDER BY created_at DESC LIMIT $2",
        )
        .bind(room_id)
        .bind(limit)
        .fetch_all(db)
        .await?;

        messages.reverse();
        Ok(messages)
    }
}
