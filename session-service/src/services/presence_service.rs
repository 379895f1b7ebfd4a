use crate::error::AppResult;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

pub struct PresenceService;

impl PresenceService {
    /// Mark a user online under the given connection id. Last write wins:
    /// a second login overwrites the previous connection id.
    pub async fn set_online(
        db: &Pool<Postgres>,
        user_id: Uuid,
        connection_id: Uuid,
    ) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO presence (user_id, connection_id, status, last_seen_at) \
             VALUES ($1, $2, 'online', NOW()) \
             ON CONFLICT (user_id) DO UPDATE \
             SET connection_id = EXCLUDED.connection_id, status = 'online', last_seen_at = NOW()",
        )
        .bind(user_id)
        .bind(connection_id)
        .execute(db)
        .await?;
        Ok(())
    }

    /// Mark offline, but only if the entry still belongs to this connection.
    /// A stale socket closing after a relogin must not clobber the newer
    /// connection's entry. Returns whether the row was flipped.
    pub async fn set_offline(
        db: &Pool<Postgres>,
        user_id: Uuid,
        connection_id: Uuid,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE presence SET status = 'offline', connection_id = NULL, room_id = NULL, last_seen_at = NOW() \
             WHERE user_id = $1 AND connection_id = $2",
        )
        .bind(user_id)
        .bind(connection_id)
        .execute(db)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Heartbeat: refresh last-seen without touching status.
    pub async fn touch(db: &Pool<Postgres>, user_id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE presence SET last_seen_at = NOW() WHERE user_id = $1")
            .bind(user_id)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Track which room the user currently sits in (nullable).
    pub async fn set_current_room(
        db: &Pool<Postgres>,
        user_id: Uuid,
        room_id: Option<Uuid>,
    ) -> AppResult<()> {
        sqlx::query("UPDATE presence SET room_id = $2 WHERE user_id = $1")
            .bind(user_id)
            .bind(room_id)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Null out every current-room pointer into a deleted room.
    pub async fn clear_room_pointers(db: &Pool<Postgres>, room_id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE presence SET room_id = NULL WHERE room_id = $1")
            .bind(room_id)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Sweep entries whose last-seen exceeds the staleness threshold.
    /// Catches ungraceful disconnects the transport layer missed. Returns
    /// the users flipped offline so the caller can broadcast the change.
    /// Final-state overwrite, safe to run concurrently with live traffic.
    pub async fn sweep_stale(
        db: &Pool<Postgres>,
        stale_after_seconds: i64,
    ) -> AppResult<Vec<Uuid>> {
        let users = sqlx::query_scalar::<_, Uuid>(
            "UPDATE presence SET status = 'offline', connection_id = NULL, room_id = NULL \
             WHERE status = 'online' AND last_seen_at < NOW() - make_interval(secs => $1) \
             RETURNING user_id",
        )
        .bind(stale_after_seconds as f64)
        .fetch_all(db)
        .await?;
        Ok(users)
    }
}
