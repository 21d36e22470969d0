use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use course_core::model::{
    Answers, CourseContent, CourseId, EnrollmentKey, EnrollmentProgress, LearnerId, LectureRef,
};
use course_core::progression::{self, Transition};
use course_core::unlock::{self, UnlockMap};
use course_core::{Clock, ProgressError};
use storage::repository::{NewQuizAttempt, ProgressRepository, QuizAttemptRecord, StorageError};

use super::snapshot::{CourseCompletion, ProgressSnapshot, QuizSubmission};
use crate::config::ProgressionConfig;
use crate::error::ProgressionError;
use crate::ports::{
    CertificateIssuer, CompletionRecord, ContentCatalog, EnrollmentService, ProgressCause,
    ProgressChanged, ProgressSink,
};

//
// ─── MUTATIONS ─────────────────────────────────────────────────────────────────
//

/// A computed transition waiting to be committed.
struct Mutation<T> {
    transition: Transition,
    attempt: Option<NewQuizAttempt>,
    output: T,
}

impl Mutation<()> {
    fn plain(transition: Transition) -> Self {
        Self {
            transition,
            attempt: None,
            output: (),
        }
    }
}

struct Applied<T> {
    snapshot: ProgressSnapshot,
    committed: bool,
    output: T,
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Coordinates progress changes for enrolled learners.
///
/// Every mutation loads the stored progress, applies a pure transition from
/// `course_core::progression`, and commits it with a version check. Conflicting
/// writers are resolved by re-reading and re-applying, so concurrent requests
/// for the same enrollment never lose updates.
pub struct ProgressionService {
    clock: Clock,
    config: ProgressionConfig,
    progress: Arc<dyn ProgressRepository>,
    catalog: Arc<dyn ContentCatalog>,
    enrollment: Arc<dyn EnrollmentService>,
    certificates: Arc<dyn CertificateIssuer>,
    sink: Arc<dyn ProgressSink>,
}

impl ProgressionService {
    #[must_use]
    pub fn new(
        clock: Clock,
        progress: Arc<dyn ProgressRepository>,
        catalog: Arc<dyn ContentCatalog>,
        enrollment: Arc<dyn EnrollmentService>,
        certificates: Arc<dyn CertificateIssuer>,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            clock,
            config: ProgressionConfig::default(),
            progress,
            catalog,
            enrollment,
            certificates,
            sink,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: ProgressionConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the clock (usually for deterministic testing).
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Mark a lecture as completed.
    ///
    /// Completing an already completed lecture returns the current snapshot
    /// without writing or emitting anything.
    ///
    /// # Errors
    ///
    /// - `NotEnrolled` if the learner is not actively enrolled.
    /// - `Progress` for unknown or locked lectures, and for lectures whose
    ///   quiz has not been passed yet.
    /// - `Storage` if the write keeps conflicting or fails.
    pub async fn complete_lecture(
        &self,
        learner: LearnerId,
        course: CourseId,
        at: LectureRef,
        watched_percentage: u8,
    ) -> Result<ProgressSnapshot, ProgressionError> {
        let key = EnrollmentKey::new(learner, course);
        self.ensure_enrolled(key).await?;
        let content = self.content(course).await?;

        let applied = self
            .mutate(key, &content, |content, current, now| {
                let transition =
                    progression::complete_lecture(content, current, at, watched_percentage, now)?;
                Ok(Mutation::plain(transition))
            })
            .await?;

        if applied.committed {
            info!(%key, %at, "lecture completed");
            self.publish(key, ProgressCause::LectureCompleted { at }, &applied.snapshot);
        }
        Ok(applied.snapshot)
    }

    /// Grade a quiz submission and record the result.
    ///
    /// Every graded submission is stored and emitted, passing or not. A pass
    /// also completes the lecture.
    ///
    /// # Errors
    ///
    /// - `NotEnrolled` if the learner is not actively enrolled.
    /// - `Progress` if the lecture has no quiz, is locked, or the submission
    ///   is incomplete.
    /// - `Storage` if the write keeps conflicting or fails.
    pub async fn submit_quiz(
        &self,
        learner: LearnerId,
        course: CourseId,
        at: LectureRef,
        answers: &Answers,
    ) -> Result<QuizSubmission, ProgressionError> {
        let key = EnrollmentKey::new(learner, course);
        self.ensure_enrolled(key).await?;
        let content = self.content(course).await?;

        let applied = self
            .mutate(key, &content, |content, current, now| {
                let (transition, result) =
                    progression::submit_quiz(content, current, at, answers, now)?;
                Ok(Mutation {
                    transition,
                    attempt: Some(NewQuizAttempt {
                        at,
                        result: result.clone(),
                    }),
                    output: result,
                })
            })
            .await?;

        let result = applied.output;
        info!(
            %key,
            %at,
            score = result.score,
            total_points = result.total_points,
            passed = result.passed,
            "quiz graded"
        );
        self.publish(
            key,
            ProgressCause::QuizSubmitted {
                at,
                passed: result.passed,
            },
            &applied.snapshot,
        );
        Ok(QuizSubmission {
            result,
            snapshot: applied.snapshot,
        })
    }

    /// Finalize the course and request a certificate.
    ///
    /// The completion is committed before the issuer is called; an issuer
    /// failure is logged and reported as `certificate_id: None`.
    ///
    /// # Errors
    ///
    /// - `NotEnrolled` if the learner is not actively enrolled.
    /// - `Progress` if the course is already completed, has no lectures, or
    ///   still has open lectures.
    /// - `Storage` if the write keeps conflicting or fails.
    pub async fn complete_course(
        &self,
        learner: LearnerId,
        course: CourseId,
    ) -> Result<CourseCompletion, ProgressionError> {
        let key = EnrollmentKey::new(learner, course);
        self.ensure_enrolled(key).await?;
        let content = self.content(course).await?;

        let applied = self
            .mutate(key, &content, |content, current, now| {
                let transition = progression::complete_course(content, current, now)?;
                Ok(Mutation {
                    transition,
                    attempt: None,
                    output: now,
                })
            })
            .await?;

        info!(%key, "course completed");
        self.publish(key, ProgressCause::CourseCompleted, &applied.snapshot);

        let record = CompletionRecord {
            learner_id: learner,
            course_id: course,
            completed_at: applied.snapshot.progress.completed_at().unwrap_or(applied.output),
        };
        let certificate_id = match self.certificates.issue_certificate(&record).await {
            Ok(id) => {
                info!(%key, certificate = %id, "certificate issued");
                Some(id)
            }
            Err(err) => {
                warn!(%key, error = %err, "certificate issuance failed; completion kept");
                None
            }
        };

        Ok(CourseCompletion {
            record,
            certificate_id,
            snapshot: applied.snapshot,
        })
    }

    /// Raise the watched percentage of a lecture.
    ///
    /// Lower values than the stored one change nothing. A video lecture
    /// without a quiz that reaches 100% is completed.
    ///
    /// # Errors
    ///
    /// - `NotEnrolled` if the learner is not actively enrolled.
    /// - `Progress` for unknown or locked lectures.
    /// - `Storage` if the write keeps conflicting or fails.
    pub async fn record_watch_progress(
        &self,
        learner: LearnerId,
        course: CourseId,
        at: LectureRef,
        watched_percentage: u8,
    ) -> Result<ProgressSnapshot, ProgressionError> {
        let key = EnrollmentKey::new(learner, course);
        self.ensure_enrolled(key).await?;
        let content = self.content(course).await?;

        let applied = self
            .mutate(key, &content, |content, current, now| {
                let transition = progression::record_watch_progress(
                    content,
                    current,
                    at,
                    watched_percentage,
                    now,
                )?;
                let completed_now = !current.is_lecture_completed(at)
                    && transition.progress.is_lecture_completed(at);
                Ok(Mutation {
                    transition,
                    attempt: None,
                    output: completed_now,
                })
            })
            .await?;

        if applied.committed {
            let cause = if applied.output {
                info!(%key, %at, "lecture completed by watching");
                ProgressCause::LectureCompleted { at }
            } else {
                ProgressCause::WatchProgress { at }
            };
            self.publish(key, cause, &applied.snapshot);
        }
        Ok(applied.snapshot)
    }

    /// Stamp the stored progress as retired after the learner unenrolls.
    ///
    /// Runs without an enrollment check. Enrollments with nothing stored, or
    /// already retired, are left untouched.
    ///
    /// # Errors
    ///
    /// - `Collaborator` if the course is unknown.
    /// - `Storage` if the write keeps conflicting or fails.
    pub async fn retire_enrollment(
        &self,
        learner: LearnerId,
        course: CourseId,
    ) -> Result<ProgressSnapshot, ProgressionError> {
        let key = EnrollmentKey::new(learner, course);
        let content = self.content(course).await?;

        let applied = self
            .mutate(key, &content, |content, current, now| {
                if current.version() == 0 {
                    return Ok(Mutation::plain(progression::refresh(content, current)?));
                }
                let (next, changed) = progression::retire(current, now);
                let transition = progression::refresh(content, &next)?;
                Ok(Mutation::plain(Transition {
                    changed,
                    ..transition
                }))
            })
            .await?;

        if applied.committed {
            info!(%key, "enrollment retired");
            self.publish(key, ProgressCause::EnrollmentRetired, &applied.snapshot);
        }
        Ok(applied.snapshot)
    }

    /// Unlock flag for every lecture of the course.
    ///
    /// # Errors
    ///
    /// - `NotEnrolled` if the learner is not actively enrolled.
    /// - `Collaborator` or `Storage` if inputs cannot be loaded.
    pub async fn unlock_map(
        &self,
        learner: LearnerId,
        course: CourseId,
    ) -> Result<UnlockMap, ProgressionError> {
        let key = EnrollmentKey::new(learner, course);
        self.ensure_enrolled(key).await?;
        let content = self.content(course).await?;
        let current = self.load_progress(key).await?;
        Ok(unlock::unlock_map(&content, &current))
    }

    /// Current progress with recomputed aggregates.
    ///
    /// # Errors
    ///
    /// - `NotEnrolled` if the learner is not actively enrolled.
    /// - `Progress` (`EmptyCourse`) for a course without lectures.
    /// - `Collaborator` or `Storage` if inputs cannot be loaded.
    pub async fn progress_snapshot(
        &self,
        learner: LearnerId,
        course: CourseId,
    ) -> Result<ProgressSnapshot, ProgressionError> {
        let key = EnrollmentKey::new(learner, course);
        self.ensure_enrolled(key).await?;
        let content = self.content(course).await?;
        let current = self.load_progress(key).await?;
        let transition = progression::refresh(&content, &current)?;
        Ok(ProgressSnapshot::new(&content, transition))
    }

    /// Graded attempts for one quiz, newest first.
    ///
    /// # Errors
    ///
    /// - `NotEnrolled` if the learner is not actively enrolled.
    /// - `Progress` if the lecture does not exist or has no quiz.
    /// - `Collaborator` or `Storage` if inputs cannot be loaded.
    pub async fn quiz_attempts(
        &self,
        learner: LearnerId,
        course: CourseId,
        at: LectureRef,
        limit: u32,
    ) -> Result<Vec<QuizAttemptRecord>, ProgressionError> {
        let key = EnrollmentKey::new(learner, course);
        self.ensure_enrolled(key).await?;
        let content = self.content(course).await?;
        content.quiz(at).map_err(ProgressError::from)?;
        Ok(self.progress.list_quiz_attempts(key, at, limit).await?)
    }

    //
    // ─── HELPERS ───────────────────────────────────────────────────────────────
    //

    async fn ensure_enrolled(&self, key: EnrollmentKey) -> Result<(), ProgressionError> {
        if self
            .enrollment
            .is_actively_enrolled(key.learner_id, key.course_id)
            .await?
        {
            Ok(())
        } else {
            debug!(%key, "rejected: not enrolled");
            Err(ProgressionError::NotEnrolled)
        }
    }

    async fn content(&self, course: CourseId) -> Result<Arc<CourseContent>, ProgressionError> {
        Ok(self.catalog.course_content(course).await?)
    }

    async fn load_progress(&self, key: EnrollmentKey) -> Result<EnrollmentProgress, ProgressionError> {
        Ok(self
            .progress
            .get_progress(key)
            .await?
            .unwrap_or_else(|| EnrollmentProgress::new(key)))
    }

    /// Apply `apply` to the latest stored progress and commit the result.
    ///
    /// On a version conflict the progress is re-read and `apply` runs again,
    /// up to `max_write_attempts` times in total.
    async fn mutate<T, F>(
        &self,
        key: EnrollmentKey,
        content: &CourseContent,
        apply: F,
    ) -> Result<Applied<T>, ProgressionError>
    where
        F: Fn(&CourseContent, &EnrollmentProgress, DateTime<Utc>) -> Result<Mutation<T>, ProgressError>,
    {
        let mut attempt = 1;
        loop {
            let current = self.load_progress(key).await?;
            let mutation = apply(content, &current, self.clock.now())?;
            if !mutation.transition.changed {
                debug!(%key, "no change to commit");
                return Ok(Applied {
                    snapshot: ProgressSnapshot::new(content, mutation.transition),
                    committed: false,
                    output: mutation.output,
                });
            }

            match self
                .progress
                .commit_progress(&mutation.transition.progress, mutation.attempt.as_ref())
                .await
            {
                Ok(version) => {
                    debug!(%key, version, "progress committed");
                    let Mutation {
                        mut transition,
                        output,
                        ..
                    } = mutation;
                    transition.progress = transition.progress.with_version(version);
                    return Ok(Applied {
                        snapshot: ProgressSnapshot::new(content, transition),
                        committed: true,
                        output,
                    });
                }
                Err(StorageError::Conflict) if attempt < self.config.max_write_attempts => {
                    warn!(%key, attempt, "progress write conflicted; retrying");
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn publish(&self, key: EnrollmentKey, cause: ProgressCause, snapshot: &ProgressSnapshot) {
        self.sink.publish(ProgressChanged {
            learner_id: key.learner_id,
            course_id: key.course_id,
            cause,
            snapshot: snapshot.clone(),
        });
    }
}
