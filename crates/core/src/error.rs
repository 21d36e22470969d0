use std::fmt;

use thiserror::Error;

use crate::aggregate::AggregateError;
use crate::grading::GradeError;
use crate::model::{ContentError, LectureRef};

/// Errors raised by progression transitions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("invalid reference: {0}")]
    InvalidReference(#[from] ContentError),

    #[error("lecture {at} is locked")]
    NotUnlocked { at: LectureRef },

    #[error("lecture {at} needs a passing quiz result before it can be completed")]
    LectureHasUngradedQuiz { at: LectureRef },

    #[error("course still has lectures to complete")]
    CourseNotReady,

    #[error("course is already completed")]
    AlreadyCompleted,

    #[error(transparent)]
    Grade(#[from] GradeError),

    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

/// Coarse classification of every failure the engine can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidReference,
    NotEnrolled,
    NotUnlocked,
    IncompleteSubmission,
    MalformedQuiz,
    LectureHasUngradedQuiz,
    CourseNotReady,
    AlreadyCompleted,
    EmptyCourse,
    /// Persistence failed or kept conflicting.
    Storage,
    /// A collaborator (catalog, enrollment, issuer) failed.
    Collaborator,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidReference => "invalid_reference",
            Self::NotEnrolled => "not_enrolled",
            Self::NotUnlocked => "not_unlocked",
            Self::IncompleteSubmission => "incomplete_submission",
            Self::MalformedQuiz => "malformed_quiz",
            Self::LectureHasUngradedQuiz => "lecture_has_ungraded_quiz",
            Self::CourseNotReady => "course_not_ready",
            Self::AlreadyCompleted => "already_completed",
            Self::EmptyCourse => "empty_course",
            Self::Storage => "storage",
            Self::Collaborator => "collaborator",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ProgressError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidReference(_) | Self::Grade(GradeError::UnexpectedAnswer { .. }) => {
                ErrorKind::InvalidReference
            }
            Self::NotUnlocked { .. } => ErrorKind::NotUnlocked,
            Self::LectureHasUngradedQuiz { .. } => ErrorKind::LectureHasUngradedQuiz,
            Self::CourseNotReady => ErrorKind::CourseNotReady,
            Self::AlreadyCompleted => ErrorKind::AlreadyCompleted,
            Self::Grade(GradeError::IncompleteSubmission { .. }) => ErrorKind::IncompleteSubmission,
            Self::Grade(GradeError::MalformedQuiz) => ErrorKind::MalformedQuiz,
            Self::Aggregate(AggregateError::EmptyCourse) => ErrorKind::EmptyCourse,
        }
    }
}
