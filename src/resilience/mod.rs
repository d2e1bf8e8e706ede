//! Resilience helpers for upstream calls.
//!
//! # Design Decisions
//! - Retry policy lives in the invoker, not the transport: tonic has no
//!   service-config support, so the schedule is applied in-process
//! - Backoff is deterministic; the upstream keep-alive and connect timeout
//!   bound the worst case

pub mod backoff;

pub use backoff::{is_retryable, retry_backoff, RETRY_MAX_ATTEMPTS};
