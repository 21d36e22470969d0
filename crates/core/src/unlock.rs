//! Sequential unlocking of lectures.
//!
//! A lecture opens once the lecture before it is completed; the first lecture
//! of a module follows the last lecture of the previous module. `(0, 0)` is
//! always open.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::{ContentError, CourseContent, EnrollmentProgress, LectureRef};

/// Unlock flag for every lecture in the course.
pub type UnlockMap = BTreeMap<LectureRef, bool>;

/// Sub-state of an unlocked lecture that owns a quiz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuizState {
    NoQuiz,
    NotAttempted,
    Failed,
    Passed,
}

/// Where a lecture sits in the `Locked → Unlocked → Completed` progression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LectureAccess {
    Locked,
    Unlocked(QuizState),
    Completed,
}

impl LectureAccess {
    #[must_use]
    pub fn is_accessible(self) -> bool {
        !matches!(self, LectureAccess::Locked)
    }
}

/// The lecture that gates `at`, or `None` for the very first lecture.
///
/// Empty modules are skipped so they never block the course.
fn predecessor(content: &CourseContent, at: LectureRef) -> Option<LectureRef> {
    if at.lecture > 0 {
        return Some(LectureRef::new(at.module, at.lecture - 1));
    }
    (0..at.module).rev().find_map(|module| {
        content
            .last_lecture_index(module)
            .map(|lecture| LectureRef::new(module, lecture))
    })
}

/// Whether the learner may open the lecture at `at`.
///
/// # Errors
///
/// Returns `ContentError` if `at` does not exist in `content`.
pub fn is_unlocked(
    content: &CourseContent,
    progress: &EnrollmentProgress,
    at: LectureRef,
) -> Result<bool, ContentError> {
    content.lecture(at)?;
    Ok(predecessor(content, at).is_none_or(|prev| progress.is_lecture_completed(prev)))
}

/// Unlock flags for all lectures, keyed by position.
#[must_use]
pub fn unlock_map(content: &CourseContent, progress: &EnrollmentProgress) -> UnlockMap {
    content
        .lecture_refs()
        .map(|at| {
            let open =
                predecessor(content, at).is_none_or(|prev| progress.is_lecture_completed(prev));
            (at, open)
        })
        .collect()
}

/// Full access state of one lecture, including the quiz sub-state.
///
/// # Errors
///
/// Returns `ContentError` if `at` does not exist in `content`.
pub fn lecture_access(
    content: &CourseContent,
    progress: &EnrollmentProgress,
    at: LectureRef,
) -> Result<LectureAccess, ContentError> {
    let lecture = content.lecture(at)?;
    if progress.is_lecture_completed(at) {
        return Ok(LectureAccess::Completed);
    }
    if !is_unlocked(content, progress, at)? {
        return Ok(LectureAccess::Locked);
    }
    if lecture.quiz.is_none() {
        return Ok(LectureAccess::Unlocked(QuizState::NoQuiz));
    }
    let state = match progress.lecture(at).and_then(|l| l.quiz_result()) {
        None => QuizState::NotAttempted,
        Some(result) if result.passed => QuizState::Passed,
        Some(_) => QuizState::Failed,
    };
    Ok(LectureAccess::Unlocked(state))
}

/// First lecture the learner can open but has not completed yet.
#[must_use]
pub fn next_lecture(content: &CourseContent, progress: &EnrollmentProgress) -> Option<LectureRef> {
    let unlocks = unlock_map(content, progress);
    unlocks
        .into_iter()
        .find(|(at, open)| *open && !progress.is_lecture_completed(*at))
        .map(|(at, _)| at)
}
