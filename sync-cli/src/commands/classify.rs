//! Classify a remote error code.

use anyhow::{Context, Result};
use std::time::Duration;
use tablesync_client::SyncConfig;
use tablesync_core::{classify_stream_error, RetryPolicy};
use tablesync_types::{ErrorResult, StreamErrorCode};

/// Run the classify command.
pub fn run(code: &str, message: &str, attempts: u32, config: &SyncConfig) -> Result<()> {
    let code: StreamErrorCode = code
        .parse()
        .with_context(|| format!("Unrecognized error code '{}'", code))?;
    let result = classify_stream_error(code, message);

    println!("=== tablesync classify ===");
    println!();
    println!("Code:       {} ({})", code, code.as_i32());
    println!("Category:   {}", result.category());
    println!("Retryable:  {}", result.is_retryable());
    println!("Base delay: {} ms", result.retry_delay_ms());
    println!("User:       {}", result.user_message());
    println!("Technical:  {}", result.technical_message());
    println!();
    println!("Backoff:");
    for (n, delay) in schedule(&result, &config.retry.policy(), attempts)
        .iter()
        .enumerate()
    {
        match delay {
            Some(delay) => println!("  failure {}: retry in {} ms", n + 1, delay.as_millis()),
            None => println!("  failure {}: give up", n + 1),
        }
    }

    Ok(())
}

/// Retry decision for each of `failures` consecutive failures.
///
/// Stops after the first `None`, which means no further retry.
pub fn schedule(result: &ErrorResult, policy: &RetryPolicy, failures: u32) -> Vec<Option<Duration>> {
    let mut out = Vec::new();
    for attempt in 0..failures {
        if policy.should_retry(Some(result), attempt) {
            out.push(Some(policy.next_delay(attempt, result.retry_delay_ms())));
        } else {
            out.push(None);
            break;
        }
    }
    out
}
