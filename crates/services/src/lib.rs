#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod ports;
pub mod progression;

pub use course_core::Clock;

pub use config::ProgressionConfig;
pub use error::ProgressionError;
pub use ports::{
    BroadcastSink, CertificateIssuer, CollaboratorError, CompletionRecord, ContentCatalog,
    EnrollmentRoster, EnrollmentService, InMemoryCatalog, LocalCertificateIssuer, NoopSink,
    ProgressCause, ProgressChanged, ProgressSink,
};
pub use progression::{CourseCompletion, ProgressSnapshot, ProgressionService, QuizSubmission};
