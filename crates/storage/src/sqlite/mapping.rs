use course_core::model::{
    Answers, CourseId, EnrollmentKey, LearnerId, LectureProgress, LectureRef, QuizResult,
};
use sqlx::Row;

use crate::repository::{QuizAttemptRecord, StorageError};

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn u64_to_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn usize_to_i64(field: &'static str, v: usize) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

fn i64_to_usize(field: &'static str, v: i64) -> Result<usize, StorageError> {
    usize::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

fn u8_from_i64(field: &'static str, v: i64) -> Result<u8, StorageError> {
    u8::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

/// Binds `(learner_id, course_id)` as two `i64` columns.
pub(crate) fn key_to_i64(key: EnrollmentKey) -> Result<(i64, i64), StorageError> {
    Ok((
        u64_to_i64("learner_id", key.learner_id.value())?,
        u64_to_i64("course_id", key.course_id.value())?,
    ))
}

pub(crate) fn key_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<EnrollmentKey, StorageError> {
    let learner = i64_to_u64("learner_id", row.try_get("learner_id").map_err(ser)?)?;
    let course = i64_to_u64("course_id", row.try_get("course_id").map_err(ser)?)?;
    Ok(EnrollmentKey::new(LearnerId::new(learner), CourseId::new(course)))
}

pub(crate) fn lecture_ref_to_i64(at: LectureRef) -> Result<(i64, i64), StorageError> {
    Ok((
        usize_to_i64("module_index", at.module)?,
        usize_to_i64("lecture_index", at.lecture)?,
    ))
}

fn lecture_ref_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<LectureRef, StorageError> {
    Ok(LectureRef::new(
        i64_to_usize("module_index", row.try_get("module_index").map_err(ser)?)?,
        i64_to_usize("lecture_index", row.try_get("lecture_index").map_err(ser)?)?,
    ))
}

pub(crate) fn version_from_i64(v: i64) -> Result<u64, StorageError> {
    i64_to_u64("version", v)
}

/// Breakdown and answers are stored as JSON text columns.
pub(crate) fn breakdown_to_json(breakdown: &[bool]) -> Result<String, StorageError> {
    serde_json::to_string(breakdown).map_err(ser)
}

pub(crate) fn answers_to_json(answers: &Answers) -> Result<String, StorageError> {
    serde_json::to_string(answers).map_err(ser)
}

fn breakdown_from_json(raw: &str) -> Result<Vec<bool>, StorageError> {
    serde_json::from_str(raw).map_err(ser)
}

fn answers_from_json(raw: &str) -> Result<Answers, StorageError> {
    serde_json::from_str(raw).map_err(ser)
}

/// Stored quiz result columns on `lecture_progress`, all `NULL` when no
/// result has been recorded.
fn map_stored_quiz_result(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<Option<QuizResult>, StorageError> {
    let Some(score) = row.try_get::<Option<i64>, _>("quiz_score").map_err(ser)? else {
        return Ok(None);
    };
    let total_points: i64 = row
        .try_get::<Option<i64>, _>("quiz_total_points")
        .map_err(ser)?
        .ok_or_else(|| StorageError::Serialization("missing quiz_total_points".into()))?;
    let percentage: f64 = row
        .try_get::<Option<f64>, _>("quiz_percentage")
        .map_err(ser)?
        .ok_or_else(|| StorageError::Serialization("missing quiz_percentage".into()))?;
    let passed: bool = row
        .try_get::<Option<bool>, _>("quiz_passed")
        .map_err(ser)?
        .ok_or_else(|| StorageError::Serialization("missing quiz_passed".into()))?;
    let breakdown: String = row
        .try_get::<Option<String>, _>("quiz_breakdown")
        .map_err(ser)?
        .ok_or_else(|| StorageError::Serialization("missing quiz_breakdown".into()))?;
    let answers: String = row
        .try_get::<Option<String>, _>("quiz_answers")
        .map_err(ser)?
        .ok_or_else(|| StorageError::Serialization("missing quiz_answers".into()))?;
    let submitted_at = row
        .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>("quiz_submitted_at")
        .map_err(ser)?
        .ok_or_else(|| StorageError::Serialization("missing quiz_submitted_at".into()))?;

    Ok(Some(QuizResult {
        score: u32_from_i64("quiz_score", score)?,
        total_points: u32_from_i64("quiz_total_points", total_points)?,
        percentage,
        passed,
        breakdown: breakdown_from_json(&breakdown)?,
        submitted_answers: answers_from_json(&answers)?,
        submitted_at,
    }))
}

/// Maps a `lecture_progress` row to `(module_index, LectureProgress)`.
pub(crate) fn map_lecture_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<(usize, LectureProgress), StorageError> {
    let at = lecture_ref_from_row(row)?;
    let watched = u8_from_i64(
        "watched_percentage",
        row.try_get::<i64, _>("watched_percentage").map_err(ser)?,
    )?;
    let attempts = u32_from_i64(
        "quiz_attempts",
        row.try_get::<i64, _>("quiz_attempts").map_err(ser)?,
    )?;

    let entry = LectureProgress::from_persisted(
        at.lecture,
        row.try_get("completed").map_err(ser)?,
        watched,
        map_stored_quiz_result(row)?,
        attempts,
        row.try_get("completed_at").map_err(ser)?,
    );
    Ok((at.module, entry))
}

pub(crate) fn map_attempt_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<QuizAttemptRecord, StorageError> {
    let breakdown: String = row.try_get("breakdown").map_err(ser)?;
    let answers: String = row.try_get("answers").map_err(ser)?;
    Ok(QuizAttemptRecord {
        id: row.try_get("id").map_err(ser)?,
        at: lecture_ref_from_row(row)?,
        result: QuizResult {
            score: u32_from_i64("score", row.try_get("score").map_err(ser)?)?,
            total_points: u32_from_i64("total_points", row.try_get("total_points").map_err(ser)?)?,
            percentage: row.try_get("percentage").map_err(ser)?,
            passed: row.try_get("passed").map_err(ser)?,
            breakdown: breakdown_from_json(&breakdown)?,
            submitted_answers: answers_from_json(&answers)?,
            submitted_at: row.try_get("submitted_at").map_err(ser)?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answers_json_keeps_integer_keys() {
        let answers = Answers::from([(0, 2), (10, 1)]);
        let raw = answers_to_json(&answers).unwrap();
        assert_eq!(answers_from_json(&raw).unwrap(), answers);
    }

    #[test]
    fn negative_values_are_rejected() {
        assert!(version_from_i64(-1).is_err());
        assert!(u8_from_i64("watched_percentage", 300).is_err());
    }
}
