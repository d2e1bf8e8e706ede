//! Configuration validation logic.

use crate::config::schema::GatewayConfig;

/// Error type for configuration validation failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError(pub String);

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Validation error: {}", self.0)
    }
}

/// Validate a GatewayConfig for semantic correctness.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.http.addr.trim().is_empty() {
        errors.push(ValidationError("http.addr must not be empty".to_string()));
    }
    if config.http.max_body_bytes == 0 {
        errors.push(ValidationError("http.max_body_bytes must be > 0".to_string()));
    }
    if config.http.max_header_bytes == 0 {
        errors.push(ValidationError("http.max_header_bytes must be > 0".to_string()));
    }

    if config.etcd.endpoints.is_empty() {
        errors.push(ValidationError("etcd.endpoints must not be empty".to_string()));
    }
    if config.etcd.service_metadata_prefix.is_empty() {
        errors.push(ValidationError(
            "etcd.service_metadata_prefix must not be empty".to_string(),
        ));
    }
    if config.etcd.server_discovery_prefix.is_empty() {
        errors.push(ValidationError(
            "etcd.server_discovery_prefix must not be empty".to_string(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
