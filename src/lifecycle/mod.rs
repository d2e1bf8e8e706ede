//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:   load config → validate → connect store → snapshot → serve
//! Signals:   SIGTERM/SIGINT → cancel token → graceful shutdown
//! Shutdown:  stop accepting → drain (bounded) → stop watcher → close invokers
//! ```

pub mod signals;

pub use signals::shutdown_signal;
