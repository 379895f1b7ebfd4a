use crate::error::AppResult;
use crate::models::leaderboard::LeaderboardEntry;
use sqlx::{Pool, Postgres};

pub const PERIODS: [&str; 4] = ["daily", "weekly", "monthly", "all"];

/// Synthetic specialty bucket aggregating every exam regardless of subject.
pub const SPECIALTY_ALL: &str = "all";

fn period_interval(period: &str) -> Option<&'static str> {
    match period {
        "daily" => Some("1 day"),
        "weekly" => Some("7 days"),
        "monthly" => Some("30 days"),
        _ => None,
    }
}

pub struct LeaderboardService;

impl LeaderboardService {
    /// Recompute the materialized ranking rows for one period: per-specialty
    /// buckets (exams without a specialty aggregate under 'general') plus
    /// the cross-specialty 'all' bucket. Replaces the period's rows
    /// wholesale; readers between the two statements see the previous
    /// snapshot or an empty one, never a mix of periods.
    pub async fn recompute_period(db: &Pool<Postgres>, period: &str) -> AppResult<()> {
        let window_filter = match period_interval(period) {
            Some(interval) => format!("WHERE r.completed_at > NOW() - INTERVAL '{interval}'"),
            None => String::new(),
        };

        sqlx::query("DELETE FROM leaderboard_entries WHERE period = $1")
            .bind(period)
            .execute(db)
            .await?;

        let insert = format!(
            "INSERT INTO leaderboard_entries \
               (user_id, display_name, period, specialty, exams_taken, average_score, rank) \
             SELECT user_id, display_name, $1, specialty, exams_taken, average_score, \
                    RANK() OVER (PARTITION BY specialty ORDER BY average_score DESC, exams_taken DESC) \
             FROM ( \
               SELECT r.user_id, \
                      COALESCE(u.display_name, 'unknown') AS display_name, \
                      buckets.specialty, \
                      COUNT(*) AS exams_taken, \
                      AVG(r.score_percent) AS average_score \
               FROM exam_results r \
               JOIN exams e ON e.id = r.exam_id \
               LEFT JOIN users u ON u.id = r.user_id \
               CROSS JOIN LATERAL ( \
                 VALUES (COALESCE(e.specialty, 'general')), ('{all}') \
               ) AS buckets(specialty) \
               {window} \
               GROUP BY r.user_id, u.display_name, buckets.specialty \
             ) ranked",
            all = SPECIALTY_ALL,
            window = window_filter,
        );

        sqlx::query(&insert).bind(period).execute(db).await?;
        Ok(())
    }

    pub async fn recompute_all(db: &Pool<Postgres>) -> AppResult<()> {
        for period in PERIODS {
            Self::recompute_period(db, period).await?;
        }
        Ok(())
    }

    /// Ranked top-N for a period/specialty bucket.
    pub async fn top(
        db: &Pool<Postgres>,
        period: &str,
        specialty: &str,
        limit: i64,
    ) -> AppResult<Vec<LeaderboardEntry>> {
        let entries = sqlx::query_as::<_, LeaderboardEntry>(
            "SELECT user_id, display_name, period, specialty, exams_taken, average_score, rank \
             FROM leaderboard_entries \
             WHERE period = $1 AND specialty = $2 \
             ORDER BY rank ASC, user_id ASC \
             LIMIT $3",
        )
        .bind(period)
        .bind(specialty)
        .bind(limit)
        .fetch_all(db)
        .await?;
        Ok(entries)
    }
}
