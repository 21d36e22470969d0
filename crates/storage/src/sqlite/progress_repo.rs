use chrono::Utc;
use course_core::model::{EnrollmentKey, EnrollmentProgress, LectureRef};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{
    answers_to_json, breakdown_to_json, key_from_row, key_to_i64, lecture_ref_to_i64,
    map_attempt_row, map_lecture_row, ser, u64_to_i64, version_from_i64,
};
use crate::repository::{
    NewQuizAttempt, ProgressRepository, QuizAttemptRecord, StorageError,
};

fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn get_progress(
        &self,
        key: EnrollmentKey,
    ) -> Result<Option<EnrollmentProgress>, StorageError> {
        let (learner_id, course_id) = key_to_i64(key)?;

        let Some(row) = sqlx::query(
            r"
                SELECT learner_id, course_id, version, is_completed, completed_at, retired_at
                FROM enrollment_progress
                WHERE learner_id = ?1 AND course_id = ?2
            ",
        )
        .bind(learner_id)
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?
        else {
            return Ok(None);
        };

        let lecture_rows = sqlx::query(
            r"
                SELECT
                    module_index, lecture_index, completed, watched_percentage,
                    quiz_attempts, completed_at, quiz_score, quiz_total_points,
                    quiz_percentage, quiz_passed, quiz_breakdown, quiz_answers,
                    quiz_submitted_at
                FROM lecture_progress
                WHERE learner_id = ?1 AND course_id = ?2
                ORDER BY module_index ASC, lecture_index ASC
            ",
        )
        .bind(learner_id)
        .bind(course_id)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut lectures = Vec::with_capacity(lecture_rows.len());
        for lecture_row in &lecture_rows {
            lectures.push(map_lecture_row(lecture_row)?);
        }

        Ok(Some(EnrollmentProgress::from_persisted(
            key_from_row(&row)?,
            version_from_i64(row.try_get("version").map_err(ser)?)?,
            row.try_get("is_completed").map_err(ser)?,
            row.try_get("completed_at").map_err(ser)?,
            row.try_get("retired_at").map_err(ser)?,
            lectures,
        )))
    }

    #[allow(clippy::too_many_lines)]
    async fn commit_progress(
        &self,
        progress: &EnrollmentProgress,
        attempt: Option<&NewQuizAttempt>,
    ) -> Result<u64, StorageError> {
        let (learner_id, course_id) = key_to_i64(progress.key())?;
        let expected = progress.version();
        let next = expected + 1;
        let now = Utc::now();

        let mut tx = self.pool.begin().await.map_err(conn)?;

        let affected = if expected == 0 {
            sqlx::query(
                r"
                    INSERT INTO enrollment_progress (
                        learner_id, course_id, version, overall_progress_percent,
                        is_completed, completed_at, retired_at, updated_at
                    )
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    ON CONFLICT(learner_id, course_id) DO NOTHING
                ",
            )
            .bind(learner_id)
            .bind(course_id)
            .bind(u64_to_i64("version", next)?)
            .bind(i64::from(progress.overall_progress_percent()))
            .bind(progress.is_completed())
            .bind(progress.completed_at())
            .bind(progress.retired_at())
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(conn)?
            .rows_affected()
        } else {
            sqlx::query(
                r"
                    UPDATE enrollment_progress SET
                        version = ?3,
                        overall_progress_percent = ?4,
                        is_completed = ?5,
                        completed_at = ?6,
                        retired_at = ?7,
                        updated_at = ?8
                    WHERE learner_id = ?1 AND course_id = ?2 AND version = ?9
                ",
            )
            .bind(learner_id)
            .bind(course_id)
            .bind(u64_to_i64("version", next)?)
            .bind(i64::from(progress.overall_progress_percent()))
            .bind(progress.is_completed())
            .bind(progress.completed_at())
            .bind(progress.retired_at())
            .bind(now)
            .bind(u64_to_i64("version", expected)?)
            .execute(&mut *tx)
            .await
            .map_err(conn)?
            .rows_affected()
        };

        if affected == 0 {
            // dropping the transaction rolls it back
            return Err(StorageError::Conflict);
        }

        for (at, entry) in progress.lecture_entries() {
            let (module_index, lecture_index) = lecture_ref_to_i64(at)?;
            let quiz = entry.quiz_result();
            sqlx::query(
                r"
                    INSERT INTO lecture_progress (
                        learner_id, course_id, module_index, lecture_index, completed,
                        watched_percentage, quiz_attempts, completed_at, quiz_score,
                        quiz_total_points, quiz_percentage, quiz_passed, quiz_breakdown,
                        quiz_answers, quiz_submitted_at
                    )
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                    ON CONFLICT(learner_id, course_id, module_index, lecture_index) DO UPDATE SET
                        completed = excluded.completed,
                        watched_percentage = excluded.watched_percentage,
                        quiz_attempts = excluded.quiz_attempts,
                        completed_at = excluded.completed_at,
                        quiz_score = excluded.quiz_score,
                        quiz_total_points = excluded.quiz_total_points,
                        quiz_percentage = excluded.quiz_percentage,
                        quiz_passed = excluded.quiz_passed,
                        quiz_breakdown = excluded.quiz_breakdown,
                        quiz_answers = excluded.quiz_answers,
                        quiz_submitted_at = excluded.quiz_submitted_at
                ",
            )
            .bind(learner_id)
            .bind(course_id)
            .bind(module_index)
            .bind(lecture_index)
            .bind(entry.completed())
            .bind(i64::from(entry.watched_percentage()))
            .bind(i64::from(entry.quiz_attempts()))
            .bind(entry.completed_at())
            .bind(quiz.map(|q| i64::from(q.score)))
            .bind(quiz.map(|q| i64::from(q.total_points)))
            .bind(quiz.map(|q| q.percentage))
            .bind(quiz.map(|q| q.passed))
            .bind(quiz.map(|q| breakdown_to_json(&q.breakdown)).transpose()?)
            .bind(quiz.map(|q| answers_to_json(&q.submitted_answers)).transpose()?)
            .bind(quiz.map(|q| q.submitted_at))
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        if let Some(attempt) = attempt {
            let (module_index, lecture_index) = lecture_ref_to_i64(attempt.at)?;
            let result = &attempt.result;
            sqlx::query(
                r"
                    INSERT INTO quiz_attempts (
                        learner_id, course_id, module_index, lecture_index, score,
                        total_points, percentage, passed, breakdown, answers, submitted_at
                    )
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                ",
            )
            .bind(learner_id)
            .bind(course_id)
            .bind(module_index)
            .bind(lecture_index)
            .bind(i64::from(result.score))
            .bind(i64::from(result.total_points))
            .bind(result.percentage)
            .bind(result.passed)
            .bind(breakdown_to_json(&result.breakdown)?)
            .bind(answers_to_json(&result.submitted_answers)?)
            .bind(result.submitted_at)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;
        Ok(next)
    }

    async fn list_quiz_attempts(
        &self,
        key: EnrollmentKey,
        at: LectureRef,
        limit: u32,
    ) -> Result<Vec<QuizAttemptRecord>, StorageError> {
        let (learner_id, course_id) = key_to_i64(key)?;
        let (module_index, lecture_index) = lecture_ref_to_i64(at)?;

        let rows = sqlx::query(
            r"
                SELECT
                    id, module_index, lecture_index, score, total_points, percentage,
                    passed, breakdown, answers, submitted_at
                FROM quiz_attempts
                WHERE learner_id = ?1 AND course_id = ?2
                  AND module_index = ?3 AND lecture_index = ?4
                ORDER BY submitted_at DESC, id DESC
                LIMIT ?5
            ",
        )
        .bind(learner_id)
        .bind(course_id)
        .bind(module_index)
        .bind(lecture_index)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_attempt_row(&row)?);
        }
        Ok(out)
    }
}
