use crate::error::{AppError, AppResult};
use crate::models::notification::Notification;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

pub struct NotificationService;

impl NotificationService {
    /// Persist a notification addressed to one user.
    pub async fn create(
        db: &Pool<Postgres>,
        recipient_id: Uuid,
        sender_id: Option<Uuid>,
        notification_type: &str,
        title: &str,
        body: &str,
        priority: &str,
    ) -> AppResult<Notification> {
        let notification = sqlx::query_as::<_, Notification>(
            "INSERT INTO notifications (recipient_id, sender_id, notification_type, title, body, priority) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id, recipient_id, sender_id, notification_type, title, body, priority, is_read, created_at",
        )
        .bind(recipient_id)
        .bind(sender_id)
        .bind(notification_type)
        .bind(title)
        .bind(body)
        .bind(priority)
        .fetch_one(db)
        .await?;

        Ok(notification)
    }

    pub async fn unread_count(db: &Pool<Postgres>, user_id: Uuid) -> AppResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = $1 AND is_read = FALSE",
        )
        .bind(user_id)
        .fetch_one(db)
        .await?;
        Ok(count)
    }

    /// Mark one notification read. The recipient check is part of the
    /// predicate so one user cannot mark another's rows.
    pub async fn mark_read(
        db: &Pool<Postgres>,
        notification_id: Uuid,
        recipient_id: Uuid,
    ) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE, read_at = NOW() \
             WHERE id = $1 AND recipient_id = $2",
        )
        .bind(notification_id)
        .bind(recipient_id)
        .execute(db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("notification".into()));
        }
        Ok(())
    }

    pub async fn mark_all_read(db: &Pool<Postgres>, recipient_id: Uuid) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE, read_at = NOW() \
             WHERE recipient_id = $1 AND is_read = FALSE",
        )
        .bind(recipient_id)
        .execute(db)
        .await?;
        Ok(result.rows_affected())
    }
}
