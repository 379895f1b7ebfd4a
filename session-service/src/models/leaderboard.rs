use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Materialized ranking row, recomputed by the leaderboard job and read-only
/// everywhere else.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LeaderboardEntry {
    pub user_id: Uuid,
    pub display_name: String,
    pub period: String,
    pub specialty: String,
    pub exams_taken: i64,
    pub average_score: f64,
    pub rank: i64,
}
