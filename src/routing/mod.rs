//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Discovery event (service + instances + descriptors)
//!     → registry.rs (pool reconciliation, first-sight route installation)
//!     → tree.rs (radix tree keyed by /[METHOD]/cleanedPath)
//!
//! Incoming Request (method, path)
//!     → registry.rs lookup → Route + captured params
//!     → pool.rs round-robin → invoker for one live instance
//! ```
//!
//! # Design Decisions
//! - First writer wins on path collisions across services
//! - Routes install on the first descriptor-bearing event and leave en bloc
//!   when the service is deleted
//! - Invoker construction and teardown happen outside the pool lock

pub mod pool;
pub mod registry;
pub mod tree;

pub use pool::{PoolError, ServicePool};
pub use registry::{normalize_key, Route, RouteRegistry};
pub use tree::{RouteTree, TreeError};
