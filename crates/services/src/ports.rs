//! Collaborators the progression engine talks to, plus in-process adapters.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::debug;

use course_core::model::{
    CertificateId, CourseContent, CourseId, EnrollmentKey, LearnerId, LectureRef,
};

use crate::progression::ProgressSnapshot;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Failures reported by collaborators.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CollaboratorError {
    #[error("course {0} is unknown to the catalog")]
    UnknownCourse(CourseId),
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
}

//
// ─── PORTS ─────────────────────────────────────────────────────────────────────
//

/// Read-only source of course structure.
#[async_trait]
pub trait ContentCatalog: Send + Sync {
    /// # Errors
    ///
    /// Returns `CollaboratorError::UnknownCourse` when the course does not exist.
    async fn course_content(&self, course: CourseId)
    -> Result<Arc<CourseContent>, CollaboratorError>;
}

/// Answers whether a learner may currently make progress in a course.
#[async_trait]
pub trait EnrollmentService: Send + Sync {
    /// # Errors
    ///
    /// Returns `CollaboratorError` if the enrollment source cannot be queried.
    async fn is_actively_enrolled(
        &self,
        learner: LearnerId,
        course: CourseId,
    ) -> Result<bool, CollaboratorError>;
}

/// Handed to the certificate issuer once a course is finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CompletionRecord {
    pub learner_id: LearnerId,
    pub course_id: CourseId,
    pub completed_at: DateTime<Utc>,
}

#[async_trait]
pub trait CertificateIssuer: Send + Sync {
    /// # Errors
    ///
    /// Returns `CollaboratorError` if the certificate could not be issued.
    async fn issue_certificate(
        &self,
        record: &CompletionRecord,
    ) -> Result<CertificateId, CollaboratorError>;
}

/// What caused a progress change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressCause {
    LectureCompleted { at: LectureRef },
    QuizSubmitted { at: LectureRef, passed: bool },
    WatchProgress { at: LectureRef },
    CourseCompleted,
    EnrollmentRetired,
}

/// Emitted after every committed progress change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressChanged {
    pub learner_id: LearnerId,
    pub course_id: CourseId,
    pub cause: ProgressCause,
    pub snapshot: ProgressSnapshot,
}

/// Receives progress notifications. Delivery problems stay inside the sink.
pub trait ProgressSink: Send + Sync {
    fn publish(&self, event: ProgressChanged);
}

//
// ─── SINKS ─────────────────────────────────────────────────────────────────────
//

/// Drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn publish(&self, _event: ProgressChanged) {}
}

/// Fans events out over a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    sender: broadcast::Sender<ProgressChanged>,
}

impl BroadcastSink {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressChanged> {
        self.sender.subscribe()
    }
}

impl ProgressSink for BroadcastSink {
    fn publish(&self, event: ProgressChanged) {
        if self.sender.send(event).is_err() {
            debug!("progress event dropped: no subscribers");
        }
    }
}

//
// ─── IN-PROCESS ADAPTERS ───────────────────────────────────────────────────────
//

/// Catalog backed by a map, for tests and embedded use.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    courses: HashMap<CourseId, Arc<CourseContent>>,
}

impl InMemoryCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_course(mut self, course: CourseId, content: CourseContent) -> Self {
        self.courses.insert(course, Arc::new(content));
        self
    }

    pub fn course_ids(&self) -> impl Iterator<Item = CourseId> + '_ {
        self.courses.keys().copied()
    }
}

#[async_trait]
impl ContentCatalog for InMemoryCatalog {
    async fn course_content(
        &self,
        course: CourseId,
    ) -> Result<Arc<CourseContent>, CollaboratorError> {
        self.courses
            .get(&course)
            .cloned()
            .ok_or(CollaboratorError::UnknownCourse(course))
    }
}

/// Mutable set of active enrollments.
#[derive(Debug, Clone, Default)]
pub struct EnrollmentRoster {
    active: Arc<Mutex<HashSet<EnrollmentKey>>>,
}

impl EnrollmentRoster {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Roster with the given enrollments already active.
    #[must_use]
    pub fn with_enrollments(keys: impl IntoIterator<Item = EnrollmentKey>) -> Self {
        Self {
            active: Arc::new(Mutex::new(keys.into_iter().collect())),
        }
    }

    /// # Errors
    ///
    /// Returns `CollaboratorError::Unavailable` if the roster lock is poisoned.
    pub fn enroll(&self, key: EnrollmentKey) -> Result<(), CollaboratorError> {
        self.lock()?.insert(key);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `CollaboratorError::Unavailable` if the roster lock is poisoned.
    pub fn unenroll(&self, key: EnrollmentKey) -> Result<(), CollaboratorError> {
        self.lock()?.remove(&key);
        Ok(())
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashSet<EnrollmentKey>>, CollaboratorError> {
        self.active
            .lock()
            .map_err(|e| CollaboratorError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl EnrollmentService for EnrollmentRoster {
    async fn is_actively_enrolled(
        &self,
        learner: LearnerId,
        course: CourseId,
    ) -> Result<bool, CollaboratorError> {
        Ok(self.lock()?.contains(&EnrollmentKey::new(learner, course)))
    }
}

/// Mints certificate ids locally.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalCertificateIssuer;

#[async_trait]
impl CertificateIssuer for LocalCertificateIssuer {
    async fn issue_certificate(
        &self,
        _record: &CompletionRecord,
    ) -> Result<CertificateId, CollaboratorError> {
        Ok(CertificateId::generate())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> EnrollmentKey {
        EnrollmentKey::new(LearnerId::new(1), CourseId::new(2))
    }

    #[tokio::test]
    async fn roster_tracks_enrollments() {
        let roster = EnrollmentRoster::new();
        let k = key();
        assert!(
            !roster
                .is_actively_enrolled(k.learner_id, k.course_id)
                .await
                .unwrap()
        );

        roster.enroll(k).unwrap();
        assert!(
            roster
                .is_actively_enrolled(k.learner_id, k.course_id)
                .await
                .unwrap()
        );

        roster.unenroll(k).unwrap();
        assert!(
            !roster
                .is_actively_enrolled(k.learner_id, k.course_id)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn catalog_reports_unknown_courses() {
        let catalog = InMemoryCatalog::new();
        let err = catalog.course_content(CourseId::new(5)).await.unwrap_err();
        assert_eq!(err, CollaboratorError::UnknownCourse(CourseId::new(5)));
    }

    #[test]
    fn cause_serializes_with_a_type_tag() {
        let cause = ProgressCause::QuizSubmitted {
            at: LectureRef::new(0, 1),
            passed: false,
        };
        let json = serde_json::to_value(cause).unwrap();
        assert_eq!(json["type"], "quiz_submitted");
        assert_eq!(json["passed"], false);
        assert_eq!(json["at"]["lecture"], 1);
    }
}
