#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use course_core::model::{
    CertificateId, CourseContent, CourseId, EnrollmentKey, EnrollmentProgress, LearnerId, Lecture,
    LectureKind, LectureRef, Module, Question, Quiz,
};
use course_core::time::fixed_clock;
use services::{
    BroadcastSink, CertificateIssuer, CollaboratorError, CompletionRecord, EnrollmentRoster,
    InMemoryCatalog, LocalCertificateIssuer, ProgressionService,
};
use storage::repository::{
    InMemoryRepository, NewQuizAttempt, ProgressRepository, QuizAttemptRecord, StorageError,
};

pub const LEARNER: LearnerId = LearnerId::new(42);
pub const COURSE: CourseId = CourseId::new(7);
pub const VIDEO: LectureRef = LectureRef {
    module: 0,
    lecture: 0,
};
pub const QUIZ: LectureRef = LectureRef {
    module: 0,
    lecture: 1,
};
pub const TEXT: LectureRef = LectureRef {
    module: 1,
    lecture: 0,
};

pub fn key() -> EnrollmentKey {
    EnrollmentKey::new(LEARNER, COURSE)
}

/// module 0: [video, quiz (pass 70%, 2 questions x 10 points)], module 1: [text]
pub fn course() -> CourseContent {
    let quiz = Quiz::new(
        vec![
            Question::new("First?", vec!["a".into(), "b".into()], 0, 10),
            Question::new("Second?", vec!["a".into(), "b".into()], 1, 10),
        ],
        70,
    );
    CourseContent::new(vec![
        Module::new(
            "Getting started",
            vec![
                Lecture::new("Welcome", LectureKind::Video).with_duration(4),
                Lecture::new("Checkpoint", LectureKind::Quiz).with_quiz(quiz),
            ],
        ),
        Module::new(
            "Going further",
            vec![Lecture::new("Reading", LectureKind::Text)],
        ),
    ])
}

pub struct FailingIssuer;

#[async_trait]
impl CertificateIssuer for FailingIssuer {
    async fn issue_certificate(
        &self,
        _record: &CompletionRecord,
    ) -> Result<CertificateId, CollaboratorError> {
        Err(CollaboratorError::Unavailable("issuer offline".into()))
    }
}

/// Repository that reports a conflict for the first `remaining` commits.
pub struct ConflictingRepository {
    pub inner: InMemoryRepository,
    remaining: AtomicU32,
    pub commits_seen: AtomicU32,
}

impl ConflictingRepository {
    pub fn new(inner: InMemoryRepository, conflicts: u32) -> Self {
        Self {
            inner,
            remaining: AtomicU32::new(conflicts),
            commits_seen: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl ProgressRepository for ConflictingRepository {
    async fn get_progress(
        &self,
        key: EnrollmentKey,
    ) -> Result<Option<EnrollmentProgress>, StorageError> {
        self.inner.get_progress(key).await
    }

    async fn commit_progress(
        &self,
        progress: &EnrollmentProgress,
        attempt: Option<&NewQuizAttempt>,
    ) -> Result<u64, StorageError> {
        self.commits_seen.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StorageError::Conflict);
        }
        self.inner.commit_progress(progress, attempt).await
    }

    async fn list_quiz_attempts(
        &self,
        key: EnrollmentKey,
        at: LectureRef,
        limit: u32,
    ) -> Result<Vec<QuizAttemptRecord>, StorageError> {
        self.inner.list_quiz_attempts(key, at, limit).await
    }
}

pub struct Harness {
    pub service: Arc<ProgressionService>,
    pub repo: InMemoryRepository,
    pub roster: EnrollmentRoster,
    pub sink: BroadcastSink,
}

pub fn harness() -> Harness {
    harness_with_issuer(Arc::new(LocalCertificateIssuer))
}

pub fn harness_with_issuer(issuer: Arc<dyn CertificateIssuer>) -> Harness {
    let repo = InMemoryRepository::new();
    let roster = EnrollmentRoster::with_enrollments([key()]);
    let sink = BroadcastSink::new(64);
    let catalog = InMemoryCatalog::new().with_course(COURSE, course());
    let service = ProgressionService::new(
        fixed_clock(),
        Arc::new(repo.clone()),
        Arc::new(catalog),
        Arc::new(roster.clone()),
        issuer,
        Arc::new(sink.clone()),
    );
    Harness {
        service: Arc::new(service),
        repo,
        roster,
        sink,
    }
}
