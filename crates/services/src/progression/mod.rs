mod service;
mod snapshot;

pub use service::ProgressionService;
pub use snapshot::{CourseCompletion, ProgressSnapshot, QuizSubmission};
