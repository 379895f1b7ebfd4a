use crate::error::{AppError, AppResult};
use crate::models::room::{Room, RoomKind};
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

pub struct RoomService;

impl RoomService {
    /// Create-or-load a room. Joining an unknown room id creates it with the
    /// joiner as creator; joining an existing one is a no-op on the room row.
    /// Never errors on an unknown room.
    pub async fn ensure_room(
        db: &Pool<Postgres>,
        room_id: Uuid,
        kind: RoomKind,
        creator: Uuid,
    ) -> AppResult<Room> {
        sqlx::query(
            "INSERT INTO rooms (id, name, kind, created_by) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(room_id)
        .bind(room_id.to_string())
        .bind(kind.as_str())
        .bind(creator)
        .execute(db)
        .await?;

        Self::get_room(db, room_id)
            .await?
            .ok_or_else(|| AppError::NotFound("room".into()))
    }

    pub async fn get_room(db: &Pool<Postgres>, room_id: Uuid) -> AppResult<Option<Room>> {
        let row = sqlx::query(
            "SELECT id, name, kind, created_by, created_at FROM rooms WHERE id = $1",
        )
        .bind(room_id)
        .fetch_optional(db)
        .await?;

        Ok(row.map(|r| Room {
            id: r.get("id"),
            name: r.get("name"),
            kind: RoomKind::from_str(r.get::<String, _>("kind").as_str()),
            created_by: r.get("created_by"),
            created_at: r.get("created_at"),
        }))
    }

    /// Append a user to the durable participant set. Idempotent; an already
    /// present participant is not duplicated.
    pub async fn add_participant(
        db: &Pool<Postgres>,
        room_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO room_participants (room_id, user_id) VALUES ($1, $2) \
             ON CONFLICT (room_id, user_id) DO NOTHING",
        )
        .bind(room_id)
        .bind(user_id)
        .execute(db)
        .await?;
        Ok(())
    }

    pub async fn is_participant(
        db: &Pool<Postgres>,
        room_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<bool> {
        let rec = sqlx::query(
            "SELECT 1 AS one FROM room_participants WHERE room_id = $1 AND user_id = $2 LIMIT 1",
        )
        .bind(room_id)
        .bind(user_id)
        .fetch_optional(db)
        .await?;
        Ok(rec.is_some())
    }

    /// Durable participant ids of a room, connected or not.
    pub async fn participants(db: &Pool<Postgres>, room_id: Uuid) -> AppResult<Vec<Uuid>> {
        let rows = sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM room_participants WHERE room_id = $1",
        )
        .bind(room_id)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    /// Delete a room and, via cascade, its participants and messages.
    /// Callers enforce that only the creator or an elevated role gets here.
    pub async fn delete_room(db: &Pool<Postgres>, room_id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM rooms WHERE id = $1")
            .bind(room_id)
            .execute(db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("room".into()));
        }
        Ok(())
    }
}
