//! Dynamic HTTP to gRPC gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────┐
//!                      │                  GATEWAY                     │
//!                      │                                              │
//!   Client Request     │  ┌─────────┐   ┌──────────┐   ┌──────────┐  │
//!   ──────────────────▶│  │  http   │──▶│ routing  │──▶│ invoker  │──┼──▶ gRPC Backend
//!                      │  │ server  │   │ registry │   │ (tonic)  │  │
//!                      │  └─────────┘   └────┬─────┘   └──────────┘  │
//!                      │                     │                       │
//!                      │               ┌─────┴──────┐                │
//!                      │               │ transcoder │                │
//!                      │               └────────────┘                │
//!                      │                                              │
//!                      │  ┌────────────────────────────────────────┐ │
//!                      │  │         Cross-Cutting Concerns         │ │
//!                      │  │  ┌────────┐ ┌──────────┐ ┌──────────┐  │ │
//!                      │  │  │ config │ │discovery │ │observa-  │  │ │
//!                      │  │  │        │ │ (etcd)   │ │ bility   │  │ │
//!                      │  │  └────────┘ └──────────┘ └──────────┘  │ │
//!                      │  │  ┌─────────────┐  ┌─────────────────┐  │ │
//!                      │  │  │ resilience  │  │    lifecycle    │  │ │
//!                      │  │  └─────────────┘  └─────────────────┘  │ │
//!                      │  └────────────────────────────────────────┘ │
//!                      └──────────────────────────────────────────────┘
//! ```
//!
//! Backends publish a serialized `FileDescriptorSet` plus live instances in
//! etcd; the gateway mirrors both, materializes HTTP routes from
//! `google.api.http` annotations, and dispatches requests reflectively.
//! No per-service code generation, no restarts to pick up new routes.

// Core subsystems
pub mod config;
pub mod discovery;
pub mod http;
pub mod invoker;
pub mod routing;
pub mod transcoder;

// Cross-cutting concerns
pub mod gateway;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::GatewayConfig;
pub use gateway::Gateway;
