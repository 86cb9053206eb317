//! Classified failure descriptions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad category of a stream or transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    /// Connectivity or service availability.
    Network,
    /// Access rules rejected the operation.
    Permission,
    /// The operation or its data was invalid.
    Data,
    /// Credentials expired or were rejected.
    Auth,
    /// Anything else.
    Unknown,
}

impl ErrorCategory {
    /// Categories that require manual intervention and are never retried.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Permission | Self::Auth)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Network => "network",
            Self::Permission => "permission",
            Self::Data => "data",
            Self::Auth => "auth",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Structured description of one error occurrence.
///
/// Built once by the classifier and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResult {
    category: ErrorCategory,
    user_message: String,
    technical_message: String,
    retryable: bool,
    retry_delay_ms: u64,
}

impl ErrorResult {
    /// Create an error result.
    pub fn new(
        category: ErrorCategory,
        user_message: impl Into<String>,
        technical_message: impl Into<String>,
        retryable: bool,
        retry_delay_ms: u64,
    ) -> Self {
        Self {
            category,
            user_message: user_message.into(),
            technical_message: technical_message.into(),
            retryable,
            retry_delay_ms,
        }
    }

    /// Failure category.
    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    /// Message suitable for showing to staff.
    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    /// Message for logs.
    pub fn technical_message(&self) -> &str {
        &self.technical_message
    }

    /// Whether the classifier considers this failure transient.
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// Base retry delay in milliseconds, before backoff.
    pub fn retry_delay_ms(&self) -> u64 {
        self.retry_delay_ms
    }
}

impl fmt::Display for ErrorResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.category, self.technical_message)
    }
}
