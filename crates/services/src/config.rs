use std::env;

const DEFAULT_MAX_WRITE_ATTEMPTS: u32 = 3;

/// Tunables for `ProgressionService`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressionConfig {
    /// How many times a write is attempted before a version conflict is
    /// surfaced to the caller. Never below 1.
    pub max_write_attempts: u32,
}

impl Default for ProgressionConfig {
    fn default() -> Self {
        Self {
            max_write_attempts: DEFAULT_MAX_WRITE_ATTEMPTS,
        }
    }
}

impl ProgressionConfig {
    /// Read overrides from `PROGRESS_MAX_WRITE_ATTEMPTS`.
    ///
    /// Missing or unparsable values fall back to the default.
    #[must_use]
    pub fn from_env() -> Self {
        let max_write_attempts = env::var("PROGRESS_MAX_WRITE_ATTEMPTS")
            .ok()
            .and_then(|raw| raw.trim().parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_WRITE_ATTEMPTS);
        Self::default().with_max_write_attempts(max_write_attempts)
    }

    #[must_use]
    pub fn with_max_write_attempts(mut self, attempts: u32) -> Self {
        self.max_write_attempts = attempts.max(1);
        self
    }
}
