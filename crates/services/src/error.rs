//! Shared error types for the services crate.

use thiserror::Error;

use course_core::{ErrorKind, ProgressError};
use storage::repository::StorageError;

use crate::ports::CollaboratorError;

/// Errors emitted by `ProgressionService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressionError {
    #[error("learner is not actively enrolled in this course")]
    NotEnrolled,
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}

impl ProgressionError {
    /// Classify the failure for callers that only care about its kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotEnrolled => ErrorKind::NotEnrolled,
            Self::Progress(err) => err.kind(),
            Self::Storage(_) => ErrorKind::Storage,
            Self::Collaborator(CollaboratorError::UnknownCourse(_)) => ErrorKind::InvalidReference,
            Self::Collaborator(_) => ErrorKind::Collaborator,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use course_core::model::{CourseId, LectureRef};

    #[test]
    fn kind_maps_every_layer() {
        assert_eq!(ProgressionError::NotEnrolled.kind(), ErrorKind::NotEnrolled);
        assert_eq!(
            ProgressionError::from(ProgressError::NotUnlocked {
                at: LectureRef::new(1, 0)
            })
            .kind(),
            ErrorKind::NotUnlocked
        );
        assert_eq!(
            ProgressionError::from(StorageError::Conflict).kind(),
            ErrorKind::Storage
        );
        assert_eq!(
            ProgressionError::from(CollaboratorError::UnknownCourse(CourseId::new(9))).kind(),
            ErrorKind::InvalidReference
        );
        assert_eq!(
            ProgressionError::from(CollaboratorError::Unavailable("down".into())).kind(),
            ErrorKind::Collaborator
        );
    }
}
