use serde::Serialize;

use course_core::model::{CertificateId, CourseContent, EnrollmentProgress, LectureRef, QuizResult};
use course_core::progression::Transition;
use course_core::unlock::next_lecture;

use crate::ports::CompletionRecord;

/// Progress with fresh aggregates, as handed to callers and sinks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub progress: EnrollmentProgress,
    /// Every lecture is done and `complete_course` would succeed.
    pub ready_to_complete: bool,
    /// First lecture that is unlocked but not yet completed.
    pub next_lecture: Option<LectureRef>,
}

impl ProgressSnapshot {
    pub(crate) fn new(content: &CourseContent, transition: Transition) -> Self {
        let next_lecture = next_lecture(content, &transition.progress);
        Self {
            progress: transition.progress,
            ready_to_complete: transition.ready_to_complete,
            next_lecture,
        }
    }
}

/// Outcome of `ProgressionService::submit_quiz`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuizSubmission {
    pub result: QuizResult,
    pub snapshot: ProgressSnapshot,
}

/// Outcome of `ProgressionService::complete_course`.
///
/// `certificate_id` is `None` when the issuer failed; the completion itself
/// stays committed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseCompletion {
    pub record: CompletionRecord,
    pub certificate_id: Option<CertificateId>,
    pub snapshot: ProgressSnapshot,
}
