//! Exponential backoff schedule for upstream gRPC retries.

use std::time::Duration;

use tonic::Code;

/// Total attempts per call, including the first.
pub const RETRY_MAX_ATTEMPTS: u32 = 3;

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(1);
const BACKOFF_MULTIPLIER: f64 = 1.3;

/// Delay before the given retry attempt (attempt 1 = first retry).
pub fn retry_backoff(attempt: u32) -> Duration {
    let factor = BACKOFF_MULTIPLIER.powi(attempt.saturating_sub(1) as i32);
    let delay = INITIAL_BACKOFF.as_secs_f64() * factor;
    Duration::from_secs_f64(delay.min(MAX_BACKOFF.as_secs_f64()))
}

/// Status codes worth another attempt.
pub fn is_retryable(code: Code) -> bool {
    matches!(
        code,
        Code::Unavailable | Code::ResourceExhausted | Code::Internal
    )
}
