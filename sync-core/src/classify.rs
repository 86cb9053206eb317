//! Classification of stream errors and transport failures.
//!
//! Every failure that can end a subscription is turned into an
//! [`ErrorResult`] here, so the retry logic only ever looks at a category,
//! a retryable flag and a base delay.

use tablesync_types::{ErrorCategory, ErrorResult, StreamError, StreamErrorCode};

/// Classify the error attached to a cancelled subscription.
///
/// A missing error is treated as an unknown, retryable failure.
pub fn classify(error: Option<&StreamError>) -> ErrorResult {
    match error {
        Some(err) => classify_stream_error(err.code, &err.message),
        None => {
            tracing::warn!("Received cancellation without an error");
            ErrorResult::new(
                ErrorCategory::Unknown,
                "An unknown error occurred.",
                "Null stream error received",
                true,
                2000,
            )
        }
    }
}

/// Classify a remote stream error code.
pub fn classify_stream_error(code: StreamErrorCode, message: &str) -> ErrorResult {
    tracing::error!("Stream error: {} ({}) - {}", code, code.as_i32(), message);

    use ErrorCategory::*;
    let (category, user, prefix, retryable, delay) = match code {
        StreamErrorCode::NetworkError => (
            Network,
            "No internet connection. Check your connection and try again.",
            "Network error",
            true,
            3000,
        ),
        StreamErrorCode::PermissionDenied => (
            Permission,
            "Access denied. You may not have permission to read this data.",
            "Permission denied",
            false,
            0,
        ),
        StreamErrorCode::Unavailable => (
            Network,
            "The server is unavailable. Please try again shortly.",
            "Service unavailable",
            true,
            5000,
        ),
        StreamErrorCode::OperationFailed => (
            Data,
            "The operation failed. Please try again.",
            "Operation failed",
            true,
            2000,
        ),
        StreamErrorCode::ExpiredToken => (
            Auth,
            "Your session has expired. Please log in again.",
            "Token expired",
            false,
            0,
        ),
        StreamErrorCode::InvalidToken => (
            Auth,
            "Authentication is invalid. Please log in again.",
            "Invalid token",
            false,
            0,
        ),
        StreamErrorCode::MaxRetries => (
            Network,
            "The connection is unstable. Check your internet connection.",
            "Max retries exceeded",
            true,
            5000,
        ),
        StreamErrorCode::OverriddenBySet => (
            Data,
            "The data was changed by someone else. Refresh and try again.",
            "Data overridden",
            true,
            1000,
        ),
        StreamErrorCode::UserCodeException => (
            Data,
            "An error occurred while processing data.",
            "User code exception",
            true,
            2000,
        ),
        StreamErrorCode::Disconnected | StreamErrorCode::Unknown(_) => {
            return ErrorResult::new(
                Unknown,
                "An unknown error occurred. Please try again.",
                format!("Unknown error ({}): {}", code.as_i32(), message),
                true,
                3000,
            );
        }
    };

    ErrorResult::new(category, user, format!("{}: {}", prefix, message), retryable, delay)
}

/// Classify a failure that did not come from the stream itself, based on
/// the name of its type.
///
/// Matching is by substring so that `ConnectTimeoutError`, `NetworkError`
/// and `UnknownHostException` all land in the network category.
pub fn classify_failure(type_name: &str, message: &str) -> ErrorResult {
    tracing::error!("Failure: {} - {}", type_name, message);

    let has = |needles: &[&str]| needles.iter().any(|n| type_name.contains(n));

    if has(&["Network", "Timeout", "Elapsed", "UnknownHost", "Connect"]) {
        return ErrorResult::new(
            ErrorCategory::Network,
            "Network problem. Check your internet connection.",
            format!("Network exception: {}", message),
            true,
            3000,
        );
    }

    if has(&["Security", "Permission"]) {
        return ErrorResult::new(
            ErrorCategory::Permission,
            "Access denied. Check the app's security settings.",
            format!("Security exception: {}", message),
            false,
            0,
        );
    }

    if has(&["IllegalArgument", "IllegalState", "InvalidData"]) {
        return ErrorResult::new(
            ErrorCategory::Data,
            "The data is invalid. Please check your input.",
            format!("Invalid data exception: {}", message),
            false,
            0,
        );
    }

    ErrorResult::new(
        ErrorCategory::Unknown,
        "A system error occurred. Try again or restart the app.",
        format!("Unknown exception: {}", message),
        true,
        3000,
    )
}

/// Classify any error value by its concrete Rust type name.
pub fn classify_error<E: std::error::Error>(error: &E) -> ErrorResult {
    classify_failure(short_type_name::<E>(), &error.to_string())
}

/// Last path segment of a type name, without generic arguments.
fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Message shown when a subscribe attempt is skipped or the link degrades.
pub fn network_error_message(available: bool) -> &'static str {
    if available {
        "The connection is unstable. Check your signal quality."
    } else {
        "No internet connection. Check your Wi-Fi or mobile data."
    }
}
