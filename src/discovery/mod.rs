//! Service discovery subsystem.
//!
//! # Data Flow
//! ```text
//! etcd prefix watch (metadata + instances)
//!     → watcher.rs (mirror both prefixes in memory)
//!     → ServiceEvent { Add | Update | Delete }
//!     → bounded channel (capacity 100, senders block when full)
//!     → event loop in gateway.rs applies events to the route registry
//! ```
//!
//! # Design Decisions
//! - Snapshot-first startup: existing keys are folded in silently, then one
//!   Add per known service is emitted before the watches begin
//! - Instance deletions re-query the full prefix to absorb coalesced events
//! - A malformed key or value never takes the watcher down; it is logged
//!   and dropped

pub mod watcher;

use std::collections::HashMap;

use prost_reflect::DescriptorPool;

pub use watcher::{Watcher, WatcherError};

/// One live backend instance of a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInstance {
    /// Host portion of the advertised address.
    pub host: String,
    /// Port portion of the advertised address.
    pub port: u16,
    /// "host:port", used as the invoker key.
    pub addr: String,
}

impl ServiceInstance {
    /// Parse an advertised "host:port" value. Returns None on malformed input.
    pub fn parse(value: &str) -> Option<Self> {
        let (host, port) = value.rsplit_once(':')?;
        if host.is_empty() {
            return None;
        }
        let port: u16 = port.parse().ok()?;
        Some(Self {
            host: host.to_string(),
            port,
            addr: value.to_string(),
        })
    }
}

/// Published description of a service: identity, labels, and its protobuf
/// schema as both raw bytes and the parsed descriptor pool.
#[derive(Debug, Clone)]
pub struct ServiceMetadata {
    pub service_name: String,
    pub version: String,
    pub labels: HashMap<String, String>,
    /// Serialized `FileDescriptorSet` as published by the backend.
    pub descriptor_bytes: Vec<u8>,
    /// Parsed form of `descriptor_bytes`; derived, always consistent with it.
    pub descriptors: DescriptorPool,
}

/// Snapshot delivered with every event: metadata plus the current instance set.
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    pub metadata: ServiceMetadata,
    pub instances: Vec<ServiceInstance>,
}

impl ServiceInfo {
    pub fn service_name(&self) -> &str {
        &self.metadata.service_name
    }
}

/// Kind of change a [`ServiceEvent`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Add,
    Update,
    Delete,
}

/// A coalesced change notification for one service.
#[derive(Debug, Clone)]
pub struct ServiceEvent {
    pub kind: EventKind,
    pub service: ServiceInfo,
}
