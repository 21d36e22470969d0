mod course;
mod ids;
mod progress;

pub use course::{ContentError, CourseContent, Lecture, LectureKind, LectureRef, Module, Question, Quiz};
pub use ids::{CertificateId, CourseId, EnrollmentKey, LearnerId, ParseIdError};
pub use progress::{Answers, EnrollmentProgress, LectureProgress, ModuleProgress, QuizResult};
