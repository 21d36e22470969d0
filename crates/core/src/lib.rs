#![forbid(unsafe_code)]

pub mod aggregate;
pub mod completion;
pub mod error;
pub mod grading;
pub mod model;
pub mod progression;
pub mod time;
pub mod unlock;

pub use error::{ErrorKind, ProgressError};
pub use time::Clock;
