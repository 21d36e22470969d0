use async_trait::async_trait;
use course_core::model::{EnrollmentKey, EnrollmentProgress, LectureRef, QuizResult};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Quiz attempt to append to the audit log in the same commit.
#[derive(Debug, Clone, PartialEq)]
pub struct NewQuizAttempt {
    pub at: LectureRef,
    pub result: QuizResult,
}

/// Persisted quiz attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuizAttemptRecord {
    pub id: i64,
    pub at: LectureRef,
    pub result: QuizResult,
}

/// Repository contract for enrollment progress.
///
/// Writes are compare-and-swap on `EnrollmentProgress::version`, so two
/// sessions working on the same enrollment can never interleave.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Fetch the progress record for an enrollment.
    ///
    /// Returns `Ok(None)` when nothing has been stored yet. Aggregates on the
    /// returned record are not refreshed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be read.
    async fn get_progress(
        &self,
        key: EnrollmentKey,
    ) -> Result<Option<EnrollmentProgress>, StorageError>;

    /// Atomically persist `progress` (and an optional quiz attempt) if the
    /// stored version still equals `progress.version()`. Version 0 means the
    /// record must not exist yet.
    ///
    /// Returns the new version.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if another writer got there first.
    async fn commit_progress(
        &self,
        progress: &EnrollmentProgress,
        attempt: Option<&NewQuizAttempt>,
    ) -> Result<u64, StorageError>;

    /// List quiz attempts for one lecture, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the attempts cannot be read.
    async fn list_quiz_attempts(
        &self,
        key: EnrollmentKey,
        at: LectureRef,
        limit: u32,
    ) -> Result<Vec<QuizAttemptRecord>, StorageError>;
}

#[derive(Default)]
struct InMemoryState {
    progress: HashMap<EnrollmentKey, EnrollmentProgress>,
    attempts: Vec<(EnrollmentKey, QuizAttemptRecord)>,
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn get_progress(
        &self,
        key: EnrollmentKey,
    ) -> Result<Option<EnrollmentProgress>, StorageError> {
        let guard = self
            .state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.progress.get(&key).cloned())
    }

    async fn commit_progress(
        &self,
        progress: &EnrollmentProgress,
        attempt: Option<&NewQuizAttempt>,
    ) -> Result<u64, StorageError> {
        let mut guard = self
            .state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let key = progress.key();
        let stored = guard.progress.get(&key).map_or(0, EnrollmentProgress::version);
        if stored != progress.version() {
            return Err(StorageError::Conflict);
        }

        let version = stored + 1;
        guard
            .progress
            .insert(key, progress.clone().with_version(version));
        if let Some(attempt) = attempt {
            let id = i64::try_from(guard.attempts.len() + 1)
                .map_err(|_| StorageError::Serialization("attempt id overflow".into()))?;
            guard.attempts.push((
                key,
                QuizAttemptRecord {
                    id,
                    at: attempt.at,
                    result: attempt.result.clone(),
                },
            ));
        }
        Ok(version)
    }

    async fn list_quiz_attempts(
        &self,
        key: EnrollmentKey,
        at: LectureRef,
        limit: u32,
    ) -> Result<Vec<QuizAttemptRecord>, StorageError> {
        let guard = self
            .state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard
            .attempts
            .iter()
            .rev()
            .filter(|(k, record)| *k == key && record.at == at)
            .take(limit as usize)
            .map(|(_, record)| record.clone())
            .collect())
    }
}

/// Repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub progress: Arc<dyn ProgressRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let progress: Arc<dyn ProgressRepository> = Arc::new(InMemoryRepository::new());
        Self { progress }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use course_core::model::{CourseContent, CourseId, LearnerId, Lecture, LectureKind, Module};
    use course_core::progression;
    use course_core::time::fixed_now;

    fn key() -> EnrollmentKey {
        EnrollmentKey::new(LearnerId::new(1), CourseId::new(1))
    }

    fn content() -> CourseContent {
        CourseContent::new(vec![Module::new(
            "M",
            vec![
                Lecture::new("A", LectureKind::Video),
                Lecture::new("B", LectureKind::Text),
            ],
        )])
    }

    #[tokio::test]
    async fn commit_bumps_version_and_round_trips() {
        let repo = InMemoryRepository::new();
        let fresh = EnrollmentProgress::new(key());
        let done =
            progression::complete_lecture(&content(), &fresh, LectureRef::FIRST, 100, fixed_now())
                .unwrap()
                .progress;

        let version = repo.commit_progress(&done, None).await.unwrap();
        assert_eq!(version, 1);

        let stored = repo.get_progress(key()).await.unwrap().unwrap();
        assert_eq!(stored.version(), 1);
        assert!(stored.is_lecture_completed(LectureRef::FIRST));
    }

    #[tokio::test]
    async fn stale_version_is_a_conflict() {
        let repo = InMemoryRepository::new();
        let fresh = EnrollmentProgress::new(key());
        repo.commit_progress(&fresh, None).await.unwrap();

        let err = repo.commit_progress(&fresh, None).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict));
    }

    #[tokio::test]
    async fn missing_progress_is_none() {
        let repo = InMemoryRepository::new();
        assert!(repo.get_progress(key()).await.unwrap().is_none());
        assert!(
            repo.list_quiz_attempts(key(), LectureRef::FIRST, 10)
                .await
                .unwrap()
                .is_empty()
        );
    }
}
