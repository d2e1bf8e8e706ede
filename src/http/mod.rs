//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware layers)
//!     → middleware/cors.rs (preflight + response headers)
//!     → gateway handler (match → select → compose → invoke)
//!     → response.rs (uniform JSON envelope, status mapping)
//! ```

pub mod middleware;
pub mod response;
pub mod server;

pub use server::{build_router, AppState};
