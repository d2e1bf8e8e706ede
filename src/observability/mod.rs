//! Observability subsystem.
//!
//! # Design Decisions
//! - Structured logging via `tracing`, initialized in `main`
//! - Metrics are cheap (atomic increments) and optional; the Prometheus
//!   endpoint only starts when enabled in config

pub mod metrics;
