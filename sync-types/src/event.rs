//! Events delivered by the remote table stream.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TypesError;
use crate::table::TablePayload;

/// One event from the remote keyed collection.
///
/// Events for the same key arrive in causal order; events for different
/// keys may interleave arbitrarily.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemoteEvent {
    /// A child appeared under the watched path.
    Added {
        /// External id of the child.
        key: String,
        /// Raw status string, if the payload carried one.
        raw_status: Option<String>,
    },
    /// An existing child was rewritten.
    Changed {
        /// External id of the child.
        key: String,
        /// Raw status string, if the payload carried one.
        raw_status: Option<String>,
    },
    /// A child was deleted.
    Removed {
        /// External id of the child.
        key: String,
    },
    /// The remote side terminated the subscription.
    Cancelled {
        /// Why the stream was cancelled.
        error: StreamError,
    },
}

impl RemoteEvent {
    /// Build an `Added` event from a decoded payload.
    pub fn added(key: impl Into<String>, payload: &TablePayload) -> Self {
        Self::Added {
            key: key.into(),
            raw_status: payload.status.clone(),
        }
    }

    /// Build a `Changed` event from a decoded payload.
    pub fn changed(key: impl Into<String>, payload: &TablePayload) -> Self {
        Self::Changed {
            key: key.into(),
            raw_status: payload.status.clone(),
        }
    }

    /// Build a `Removed` event.
    pub fn removed(key: impl Into<String>) -> Self {
        Self::Removed { key: key.into() }
    }

    /// Build a `Cancelled` event.
    pub fn cancelled(code: StreamErrorCode, message: impl Into<String>) -> Self {
        Self::Cancelled {
            error: StreamError::new(code, message),
        }
    }

    /// External id this event refers to, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Added { key, .. } | Self::Changed { key, .. } | Self::Removed { key } => {
                Some(key)
            }
            Self::Cancelled { .. } => None,
        }
    }

    /// Whether this event ends the subscription.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Error attached to a cancelled subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamError {
    /// Remote error code.
    pub code: StreamErrorCode,
    /// Remote diagnostic message.
    pub message: String,
}

impl StreamError {
    /// Create a stream error.
    pub fn new(code: StreamErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.code, self.code.as_i32(), self.message)
    }
}

/// Error codes reported by the remote stream service.
///
/// Numeric values match the service's own constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", from = "i32")]
pub enum StreamErrorCode {
    /// The server reported a generic operation failure.
    OperationFailed,
    /// Security rules rejected the read.
    PermissionDenied,
    /// The connection dropped mid-operation.
    Disconnected,
    /// The auth token expired.
    ExpiredToken,
    /// The auth token is malformed or revoked.
    InvalidToken,
    /// The client gave up after its own internal retries.
    MaxRetries,
    /// A concurrent `set` replaced the data.
    OverriddenBySet,
    /// The service is temporarily unavailable.
    Unavailable,
    /// Application code threw while handling an event.
    UserCodeException,
    /// The network request failed.
    NetworkError,
    /// Any code not listed above.
    Unknown(i32),
}

impl StreamErrorCode {
    /// Numeric value as sent by the service.
    pub fn as_i32(&self) -> i32 {
        match self {
            Self::OperationFailed => -2,
            Self::PermissionDenied => -3,
            Self::Disconnected => -4,
            Self::ExpiredToken => -6,
            Self::InvalidToken => -7,
            Self::MaxRetries => -8,
            Self::OverriddenBySet => -9,
            Self::Unavailable => -10,
            Self::UserCodeException => -11,
            Self::NetworkError => -24,
            Self::Unknown(code) => *code,
        }
    }

    /// Canonical upper-snake name, `UNKNOWN` for unlisted codes.
    pub fn name(&self) -> &'static str {
        match self {
            Self::OperationFailed => "OPERATION_FAILED",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::Disconnected => "DISCONNECTED",
            Self::ExpiredToken => "EXPIRED_TOKEN",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::MaxRetries => "MAX_RETRIES",
            Self::OverriddenBySet => "OVERRIDDEN_BY_SET",
            Self::Unavailable => "UNAVAILABLE",
            Self::UserCodeException => "USER_CODE_EXCEPTION",
            Self::NetworkError => "NETWORK_ERROR",
            Self::Unknown(_) => "UNKNOWN",
        }
    }
}

impl From<i32> for StreamErrorCode {
    fn from(code: i32) -> Self {
        match code {
            -2 => Self::OperationFailed,
            -3 => Self::PermissionDenied,
            -4 => Self::Disconnected,
            -6 => Self::ExpiredToken,
            -7 => Self::InvalidToken,
            -8 => Self::MaxRetries,
            -9 => Self::OverriddenBySet,
            -10 => Self::Unavailable,
            -11 => Self::UserCodeException,
            -24 => Self::NetworkError,
            other => Self::Unknown(other),
        }
    }
}

impl From<StreamErrorCode> for i32 {
    fn from(code: StreamErrorCode) -> Self {
        code.as_i32()
    }
}

impl FromStr for StreamErrorCode {
    type Err = TypesError;

    /// Accepts a canonical name (any case) or a signed number.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(code) = trimmed.parse::<i32>() {
            return Ok(Self::from(code));
        }
        match trimmed.to_ascii_uppercase().as_str() {
            "OPERATION_FAILED" => Ok(Self::OperationFailed),
            "PERMISSION_DENIED" => Ok(Self::PermissionDenied),
            "DISCONNECTED" => Ok(Self::Disconnected),
            "EXPIRED_TOKEN" => Ok(Self::ExpiredToken),
            "INVALID_TOKEN" => Ok(Self::InvalidToken),
            "MAX_RETRIES" => Ok(Self::MaxRetries),
            "OVERRIDDEN_BY_SET" => Ok(Self::OverriddenBySet),
            "UNAVAILABLE" => Ok(Self::Unavailable),
            "USER_CODE_EXCEPTION" => Ok(Self::UserCodeException),
            "NETWORK_ERROR" => Ok(Self::NetworkError),
            _ => Err(TypesError::UnknownErrorCode(trimmed.to_string())),
        }
    }
}

impl fmt::Display for StreamErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
