use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs the versioned schema migrations.
///
/// Version 1 creates enrollment progress, per-lecture progress, and the quiz
/// attempt audit log.
#[allow(clippy::too_many_lines)]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS enrollment_progress (
                    learner_id INTEGER NOT NULL,
                    course_id INTEGER NOT NULL,
                    version INTEGER NOT NULL CHECK (version > 0),
                    overall_progress_percent INTEGER NOT NULL
                        CHECK (overall_progress_percent BETWEEN 0 AND 100),
                    is_completed INTEGER NOT NULL CHECK (is_completed IN (0, 1)),
                    completed_at TEXT,
                    retired_at TEXT,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (learner_id, course_id)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS lecture_progress (
                    learner_id INTEGER NOT NULL,
                    course_id INTEGER NOT NULL,
                    module_index INTEGER NOT NULL CHECK (module_index >= 0),
                    lecture_index INTEGER NOT NULL CHECK (lecture_index >= 0),
                    completed INTEGER NOT NULL CHECK (completed IN (0, 1)),
                    watched_percentage INTEGER NOT NULL
                        CHECK (watched_percentage BETWEEN 0 AND 100),
                    quiz_attempts INTEGER NOT NULL CHECK (quiz_attempts >= 0),
                    completed_at TEXT,
                    quiz_score INTEGER,
                    quiz_total_points INTEGER,
                    quiz_percentage REAL,
                    quiz_passed INTEGER,
                    quiz_breakdown TEXT,
                    quiz_answers TEXT,
                    quiz_submitted_at TEXT,
                    PRIMARY KEY (learner_id, course_id, module_index, lecture_index),
                    FOREIGN KEY (learner_id, course_id)
                        REFERENCES enrollment_progress(learner_id, course_id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS quiz_attempts (
                    id INTEGER PRIMARY KEY,
                    learner_id INTEGER NOT NULL,
                    course_id INTEGER NOT NULL,
                    module_index INTEGER NOT NULL,
                    lecture_index INTEGER NOT NULL,
                    score INTEGER NOT NULL CHECK (score >= 0),
                    total_points INTEGER NOT NULL CHECK (total_points > 0),
                    percentage REAL NOT NULL,
                    passed INTEGER NOT NULL CHECK (passed IN (0, 1)),
                    breakdown TEXT NOT NULL,
                    answers TEXT NOT NULL,
                    submitted_at TEXT NOT NULL,
                    FOREIGN KEY (learner_id, course_id)
                        REFERENCES enrollment_progress(learner_id, course_id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_quiz_attempts_lecture_submitted
                    ON quiz_attempts (learner_id, course_id, module_index, lecture_index, submitted_at);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_enrollment_progress_course_completed
                    ON enrollment_progress (course_id, is_completed);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
    }

    Ok(())
}
