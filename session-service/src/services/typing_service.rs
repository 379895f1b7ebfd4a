use crate::error::AppResult;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

pub struct TypingService;

impl TypingService {
    /// Upsert or clear the (room, user) typing indicator.
    pub async fn set_typing(
        db: &Pool<Postgres>,
        room_id: Uuid,
        user_id: Uuid,
        is_typing: bool,
    ) -> AppResult<()> {
        if is_typing {
            sqlx::query(
                "INSERT INTO typing_indicators (room_id, user_id, updated_at) \
                 VALUES ($1, $2, NOW()) \
                 ON CONFLICT (room_id, user_id) DO UPDATE SET updated_at = NOW()",
            )
            .bind(room_id)
            .bind(user_id)
            .execute(db)
            .await?;
        } else {
            sqlx::query("DELETE FROM typing_indicators WHERE room_id = $1 AND user_id = $2")
                .bind(room_id)
                .bind(user_id)
                .execute(db)
                .await?;
        }
        Ok(())
    }

    /// Drop every indicator a disconnecting user still holds.
    pub async fn clear_for_user(db: &Pool<Postgres>, user_id: Uuid) -> AppResult<()> {
        sqlx::query("DELETE FROM typing_indicators WHERE user_id = $1")
            .bind(user_id)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Delete indicators older than the staleness threshold. Returns the
    /// number of rows removed.
    pub async fn sweep_stale(db: &Pool<Postgres>, stale_after_seconds: i64) -> AppResult<u64> {
        let result = sqlx::query(
            "DELETE FROM typing_indicators WHERE updated_at < NOW() - make_interval(secs => $1)",
        )
        .bind(stale_after_seconds as f64)
        .execute(db)
        .await?;
        Ok(result.rows_affected())
    }
}
