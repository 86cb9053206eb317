//! Error types for tablesync-types.

use thiserror::Error;

/// Errors raised while decoding tablesync data.
#[derive(Debug, Error)]
pub enum TypesError {
    /// Child payload was not valid JSON for a table record
    #[error("invalid table payload: {0}")]
    Payload(#[source] serde_json::Error),

    /// Error code name not recognized
    #[error("unknown stream error code: {0}")]
    UnknownErrorCode(String),
}
