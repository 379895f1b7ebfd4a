use crate::error::{AppError, AppResult};
use crate::models::exam::{ExamResult, ExamSession, SessionStatus};
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

/// Exam metadata read from the collaborator store. The answer key is only
/// ever read server-side; clients never see or supply correctness.
pub struct Exam {
    pub id: Uuid,
    pub title: String,
    pub specialty: Option<String>,
    pub duration_seconds: i32,
    pub answer_key: serde_json::Value,
}

pub struct ExamService;

impl ExamService {
    pub async fn get_exam(db: &Pool<Postgres>, exam_id: Uuid) -> AppResult<Exam> {
        let row = sqlx::query(
            "SELECT id, title, specialty, duration_seconds, answer_key FROM exams WHERE id = $1",
        )
        .bind(exam_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound("exam".into()))?;

        Ok(Exam {
            id: row.get("id"),
            title: row.get("title"),
            specialty: row.get("specialty"),
            duration_seconds: row.get("duration_seconds"),
            answer_key: row.get("answer_key"),
        })
    }

    /// Join an exam: creates the session with the full time budget, or
    /// re-attaches to an already-active one (idempotent, no timer reset).
    /// Returns the session and whether it was resumed.
    pub async fn join(
        db: &Pool<Postgres>,
        exam: &Exam,
        user_id: Uuid,
    ) -> AppResult<(ExamSession, bool)> {
        let inserted = sqlx::query(
            "INSERT INTO exam_sessions (exam_id, user_id, current_question, time_remaining_seconds, answers, status) \
             VALUES ($1, $2, 0, $3, '[]'::jsonb, 'active') \
             ON CONFLICT (exam_id, user_id) DO NOTHING",
        )
        .bind(exam.id)
        .bind(user_id)
        .bind(exam.duration_seconds)
        .execute(db)
        .await?
        .rows_affected();

        let session = Self::get_session(db, exam.id, user_id)
            .await?
            .ok_or(AppError::Internal)?;

        if session.status == SessionStatus::Completed {
            return Err(AppError::BadRequest("exam session already completed".into()));
        }

        Ok((session, inserted == 0))
    }

    pub async fn get_session(
        db: &Pool<Postgres>,
        exam_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Option<ExamSession>> {
        let row = sqlx::query(
            "SELECT exam_id, user_id, current_question, time_remaining_seconds, answers, status, last_activity_at \
             FROM exam_sessions WHERE exam_id = $1 AND user_id = $2",
        )
        .bind(exam_id)
        .bind(user_id)
        .fetch_optional(db)
        .await?;

        Ok(row.map(|r| ExamSession {
            exam_id: r.get("exam_id"),
            user_id: r.get("user_id"),
            current_question: r.get("current_question"),
            time_remaining_seconds: r.get("time_remaining_seconds"),
            answers: r.get("answers"),
            status: SessionStatus::from_str(r.get::<String, _>("status").as_str()),
            last_activity_at: r.get("last_activity_at"),
        }))
    }

    /// Overwriting progress update, accepted only while the session is
    /// active. Last update wins; there is no merge.
    pub async fn save_progress(
        db: &Pool<Postgres>,
        exam_id: Uuid,
        user_id: Uuid,
        current_question: i32,
        time_remaining: i32,
        answers: &serde_json::Value,
    ) -> AppResult<()> {
        if !answers.is_array() {
            return Err(AppError::BadRequest("answers must be an array".into()));
        }

        let updated = sqlx::query(
            "UPDATE exam_sessions \
             SET current_question = $3, time_remaining_seconds = $4, answers = $5, last_activity_at = NOW() \
             WHERE exam_id = $1 AND user_id = $2 AND status = 'active'",
        )
        .bind(exam_id)
        .bind(user_id)
        .bind(current_question)
        .bind(time_remaining)
        .bind(answers)
        .execute(db)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(Self::rejection_for_missing_active(db, exam_id, user_id).await?);
        }
        Ok(())
    }

    /// Complete the session exactly once.
    ///
    /// The status flip is a guarded single-statement update, so a second
    /// completion attempt loses at the store and is rejected regardless of
    /// interleaving. Scoring always uses the answer key fetched fresh from
    /// the exams table.
    pub async fn complete(
        db: &Pool<Postgres>,
        exam: &Exam,
        user_id: Uuid,
    ) -> AppResult<ExamResult> {
        let row = sqlx::query(
            "UPDATE exam_sessions \
             SET status = 'completed', completed_at = NOW(), last_activity_at = NOW() \
             WHERE exam_id = $1 AND user_id = $2 AND status = 'active' \
             RETURNING answers",
        )
        .bind(exam.id)
        .bind(user_id)
        .fetch_optional(db)
        .await?;

        let answers: serde_json::Value = match row {
            Some(r) => r.get("answers"),
            None => return Err(Self::rejection_for_missing_active(db, exam.id, user_id).await?),
        };

        let (correct_count, total_questions) = score_answers(&exam.answer_key, &answers);
        let score_percent = if total_questions == 0 {
            0.0
        } else {
            correct_count as f64 * 100.0 / total_questions as f64
        };

        let completed_at = sqlx::query_scalar::<_, chrono::DateTime<chrono::Utc>>(
            "INSERT INTO exam_results (exam_id, user_id, correct_count, total_questions, score_percent) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING completed_at",
        )
        .bind(exam.id)
        .bind(user_id)
        .bind(correct_count)
        .bind(total_questions)
        .bind(score_percent)
        .fetch_one(db)
        .await?;

        Ok(ExamResult {
            exam_id: exam.id,
            user_id,
            correct_count,
            total_questions,
            score_percent,
            completed_at,
        })
    }

    /// A progress or complete command found no active session: either the
    /// session never existed or it already completed. Both are explicit
    /// rejections, never silent success.
    async fn rejection_for_missing_active(
        db: &Pool<Postgres>,
        exam_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<AppError> {
        Ok(match Self::get_session(db, exam_id, user_id).await? {
            Some(_) => AppError::BadRequest("exam session already completed".into()),
            None => AppError::NotFound("no exam session for this exam".into()),
        })
    }
}

/// Compare a sparse, index-addressed answer list against the key.
/// Returns (correct, total). Anything that is not an exact value match at
/// the key's index, including a missing or null slot, counts as incorrect.
pub fn score_answers(answer_key: &serde_json::Value, answers: &serde_json::Value) -> (i32, i32) {
    let key = match answer_key.as_array() {
        Some(key) => key,
        None => return (0, 0),
    };
    let given = answers.as_array().map(|a| a.as_slice()).unwrap_or(&[]);

    let correct = key
        .iter()
        .enumerate()
        .filter(|(i, expected)| {
            given
                .get(*i)
                .map(|answer| !answer.is_null() && answer == *expected)
                .unwrap_or(false)
        })
        .count();

    (correct as i32, key.len() as i32)
}
