//! HTTP/gRPC transcoding subsystem.
//!
//! # Data Flow
//! ```text
//! Route installation:
//!     MethodDescriptor → rule.rs (google.api.http extension)
//!     → HttpRule { method, path template, body field }
//!     → template converted to tree syntax (:param / *wildcard)
//!
//! Request time:
//!     path params + query + body → payload.rs
//!     → canonical JSON object handed to the invoker
//! ```

pub mod payload;
pub mod rule;

pub use payload::{compose_payload, PayloadError};
pub use rule::{extract_http_rules, template_to_tree_path, HttpRule};
