//! State transitions applied to a learner's progress.
//!
//! Every transition checks all of its preconditions against the current
//! progress, then returns an updated copy with aggregates recomputed. The
//! input is never touched, so a failed transition leaves nothing behind.

use chrono::{DateTime, Utc};

use crate::aggregate::aggregate;
use crate::completion::is_course_complete;
use crate::error::ProgressError;
use crate::grading::grade;
use crate::model::{
    Answers, CourseContent, EnrollmentProgress, LectureKind, LectureRef, QuizResult,
};
use crate::unlock::is_unlocked;

/// Result of applying one transition.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub progress: EnrollmentProgress,
    /// False when the transition was a no-op and nothing needs persisting.
    pub changed: bool,
    /// Every lecture is done but the course has not been finalized yet.
    pub ready_to_complete: bool,
}

impl Transition {
    fn new(content: &CourseContent, progress: EnrollmentProgress, changed: bool) -> Self {
        let ready_to_complete = !progress.is_completed() && is_course_complete(content, &progress);
        Self {
            progress,
            changed,
            ready_to_complete,
        }
    }
}

/// Recompute derived percentages for a freshly loaded record.
///
/// # Errors
///
/// Returns `ProgressError::Aggregate` for a course without lectures.
pub fn refresh(
    content: &CourseContent,
    progress: &EnrollmentProgress,
) -> Result<Transition, ProgressError> {
    let mut next = progress.clone();
    next.apply_aggregate(&aggregate(content, &next)?);
    Ok(Transition::new(content, next, false))
}

fn ensure_unlocked(
    content: &CourseContent,
    progress: &EnrollmentProgress,
    at: LectureRef,
) -> Result<(), ProgressError> {
    if is_unlocked(content, progress, at)? {
        Ok(())
    } else {
        Err(ProgressError::NotUnlocked { at })
    }
}

fn finish(
    content: &CourseContent,
    mut next: EnrollmentProgress,
    changed: bool,
) -> Result<Transition, ProgressError> {
    next.apply_aggregate(&aggregate(content, &next)?);
    Ok(Transition::new(content, next, changed))
}

/// Mark a lecture as completed.
///
/// Completing an already completed lecture is a no-op (`changed == false`).
///
/// # Errors
///
/// - `InvalidReference` if `at` does not exist.
/// - `NotUnlocked` if the lecture is still locked.
/// - `LectureHasUngradedQuiz` if the lecture owns a quiz without a passing result.
pub fn complete_lecture(
    content: &CourseContent,
    progress: &EnrollmentProgress,
    at: LectureRef,
    watched_percentage: u8,
    now: DateTime<Utc>,
) -> Result<Transition, ProgressError> {
    let lecture = content.lecture(at)?;
    if progress.is_lecture_completed(at) {
        return refresh(content, progress);
    }
    ensure_unlocked(content, progress, at)?;
    let passed = progress.lecture(at).is_some_and(|l| l.has_passed_quiz());
    if lecture.has_quiz() && !passed {
        return Err(ProgressError::LectureHasUngradedQuiz { at });
    }

    let mut next = progress.clone();
    let entry = next.lecture_mut(at);
    entry.raise_watched(watched_percentage);
    entry.mark_completed(now);
    finish(content, next, true)
}

/// Grade a quiz submission and store the result, replacing any earlier one.
///
/// A passing result also completes the lecture as fully watched. A failing
/// result never un-completes a lecture that was already done.
///
/// # Errors
///
/// - `InvalidReference` if `at` does not exist or has no quiz.
/// - `NotUnlocked` if the lecture is still locked.
/// - `Grade` for incomplete submissions or malformed quizzes.
pub fn submit_quiz(
    content: &CourseContent,
    progress: &EnrollmentProgress,
    at: LectureRef,
    answers: &Answers,
    now: DateTime<Utc>,
) -> Result<(Transition, QuizResult), ProgressError> {
    let quiz = content.quiz(at)?;
    ensure_unlocked(content, progress, at)?;
    let result = grade(quiz, answers, now)?;

    let mut next = progress.clone();
    let entry = next.lecture_mut(at);
    entry.record_quiz_result(result.clone());
    if result.passed {
        entry.raise_watched(100);
        entry.mark_completed(now);
    }
    Ok((finish(content, next, true)?, result))
}

/// Raise the watched percentage of a lecture.
///
/// A video lecture without a quiz that reaches 100% watched becomes completed.
///
/// # Errors
///
/// - `InvalidReference` if `at` does not exist.
/// - `NotUnlocked` if the lecture is still locked.
pub fn record_watch_progress(
    content: &CourseContent,
    progress: &EnrollmentProgress,
    at: LectureRef,
    watched_percentage: u8,
    now: DateTime<Utc>,
) -> Result<Transition, ProgressError> {
    let lecture = content.lecture(at)?;
    ensure_unlocked(content, progress, at)?;

    let mut next = progress.clone();
    let entry = next.lecture_mut(at);
    entry.raise_watched(watched_percentage);
    if entry.watched_percentage() == 100 && lecture.kind == LectureKind::Video && !lecture.has_quiz()
    {
        entry.mark_completed(now);
    }
    let changed = next.lecture(at) != progress.lecture(at);
    if !changed {
        return refresh(content, progress);
    }
    finish(content, next, true)
}

/// Finalize the course once every lecture is completed.
///
/// # Errors
///
/// - `AlreadyCompleted` if the course was finalized before.
/// - `Aggregate` for a course without lectures.
/// - `CourseNotReady` while any lecture is still open.
pub fn complete_course(
    content: &CourseContent,
    progress: &EnrollmentProgress,
    now: DateTime<Utc>,
) -> Result<Transition, ProgressError> {
    if progress.is_completed() {
        return Err(ProgressError::AlreadyCompleted);
    }
    aggregate(content, progress)?;
    if !is_course_complete(content, progress) {
        return Err(ProgressError::CourseNotReady);
    }

    let mut next = progress.clone();
    next.finalize(now);
    finish(content, next, true)
}

/// Stamp the record as retired after the learner unenrolls.
#[must_use]
pub fn retire(progress: &EnrollmentProgress, now: DateTime<Utc>) -> (EnrollmentProgress, bool) {
    let mut next = progress.clone();
    next.retire(now);
    let changed = next.retired_at() != progress.retired_at();
    (next, changed)
}
