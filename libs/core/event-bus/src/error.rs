//! Bus errors and their retry classification
//!
//! - **Transient**: temporary failure, retried with exponential backoff
//! - **Permanent**: retrying cannot help, dead-lettered immediately
//! - **RateLimited**: downstream throttling, retried with a longer backoff

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Transient,
    Permanent,
    RateLimited,
}

impl ErrorCategory {
    pub fn max_retries(&self) -> u32 {
        match self {
            ErrorCategory::Transient => 3,
            ErrorCategory::Permanent => 0,
            ErrorCategory::RateLimited => 5,
        }
    }

    fn base_delay_ms(&self) -> u64 {
        match self {
            ErrorCategory::Transient => 500,
            ErrorCategory::Permanent => 0,
            ErrorCategory::RateLimited => 5_000,
        }
    }

    fn max_delay_ms(&self) -> u64 {
        match self {
            ErrorCategory::Transient => 10_000,
            ErrorCategory::Permanent => 0,
            ErrorCategory::RateLimited => 120_000,
        }
    }

    /// Delay before the `retry_count`-th redelivery
    pub fn backoff_delay_ms(&self, retry_count: u32) -> u64 {
        if *self == ErrorCategory::Permanent {
            return 0;
        }
        (self.base_delay_ms() * 2u64.saturating_pow(retry_count)).min(self.max_delay_ms())
    }
}

#[derive(Error, Debug)]
pub enum BusError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Malformed event: {0}")]
    Malformed(String),

    #[error("Handler error: {message}")]
    Handler {
        message: String,
        category: ErrorCategory,
    },
}

impl BusError {
    pub fn transient(message: impl Into<String>) -> Self {
        BusError::Handler {
            message: message.into(),
            category: ErrorCategory::Transient,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        BusError::Handler {
            message: message.into(),
            category: ErrorCategory::Permanent,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        BusError::Handler {
            message: message.into(),
            category: ErrorCategory::RateLimited,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            BusError::Redis(_) => ErrorCategory::Transient,
            BusError::Malformed(_) => ErrorCategory::Permanent,
            BusError::Handler { category, .. } => *category,
        }
    }

    /// Whether a message that already failed `retry_count` times gets another attempt
    pub fn should_retry(&self, retry_count: u32) -> bool {
        let category = self.category();
        category != ErrorCategory::Permanent && retry_count < category.max_retries()
    }

    pub(crate) fn is_nogroup(&self) -> bool {
        matches!(self, BusError::Redis(e) if e.to_string().contains("NOGROUP"))
    }
}

impl From<serde_json::Error> for BusError {
    fn from(err: serde_json::Error) -> Self {
        BusError::Malformed(err.to_string())
    }
}
