//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// HTTP listener configuration.
    pub http: HttpConfig,

    /// etcd discovery configuration.
    pub etcd: EtcdConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Listen address (e.g., "0.0.0.0:8080"; a bare ":8080" binds all interfaces).
    pub addr: String,

    /// Time budget for reading a request, in seconds.
    pub read_timeout_secs: u64,

    /// Time budget for writing a response, in seconds.
    pub write_timeout_secs: u64,

    /// Maximum accepted request header size in bytes.
    pub max_header_bytes: usize,

    /// Maximum accepted request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            addr: ":8080".to_string(),
            read_timeout_secs: 10,
            write_timeout_secs: 10,
            max_header_bytes: 1 << 20,
            max_body_bytes: 10 << 20,
        }
    }
}

impl HttpConfig {
    /// Listen address in the form the binder accepts.
    pub fn bind_address(&self) -> String {
        if self.addr.starts_with(':') {
            format!("0.0.0.0{}", self.addr)
        } else {
            self.addr.clone()
        }
    }

    /// Overall per-request time budget (read + write).
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs + self.write_timeout_secs)
    }
}

/// etcd discovery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EtcdConfig {
    /// etcd endpoints (e.g., ["localhost:2379"]).
    pub endpoints: Vec<String>,

    /// Dial timeout for the initial etcd connection, in seconds.
    pub dial_timeout_secs: u64,

    /// Key prefix under which services publish their metadata.
    pub service_metadata_prefix: String,

    /// Key prefix under which service instances register themselves.
    pub server_discovery_prefix: String,
}

impl Default for EtcdConfig {
    fn default() -> Self {
        Self {
            endpoints: vec!["localhost:2379".to_string()],
            dial_timeout_secs: 5,
            service_metadata_prefix: "/services/".to_string(),
            server_discovery_prefix: "/discovery/".to_string(),
        }
    }
}

impl EtcdConfig {
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.dial_timeout_secs)
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default log filter when RUST_LOG is not set.
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_addr: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_addr: "0.0.0.0:9090".to_string(),
        }
    }
}
