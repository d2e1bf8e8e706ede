//! Route registry: binds services to routes and invoker pools.
//!
//! # Responsibilities
//! - Maintain one `ServicePool` per discovered service
//! - Install routes from descriptors the first time a service is seen
//! - Remove a service's routes en bloc when it is deleted
//! - Serve concurrent route lookups for the request pipeline
//!
//! # Design Decisions
//! - Check, tree insert, and index updates share one exclusive lock, so a
//!   lookup sees a route and its indexes together or not at all
//! - Path collisions across services: the first writer wins, later claims
//!   are silently ignored

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use prost_reflect::MethodDescriptor;
use thiserror::Error;
use tracing::{info, warn};

use crate::discovery::ServiceInfo;
use crate::routing::pool::ServicePool;
use crate::routing::tree::RouteTree;
use crate::transcoder::{extract_http_rules, template_to_tree_path, HttpRule};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid service info")]
    InvalidService,
}

/// A materialized HTTP binding for one RPC method.
#[derive(Debug, Clone)]
pub struct Route {
    pub service_name: String,
    pub method_name: String,
    /// "pkg.Service/Method", the gRPC request path without the leading slash.
    pub full_method: String,
    pub method: MethodDescriptor,
    pub rule: HttpRule,
}

struct RegistryInner {
    pools: HashMap<String, Arc<ServicePool>>,
    /// service name → set of normalized keys it owns.
    route_index: HashMap<String, HashSet<String>>,
    /// every normalized key present in the tree.
    path_index: HashSet<String>,
}

/// Concurrent route store consulted on every request.
pub struct RouteRegistry {
    tree: RouteTree<Arc<Route>>,
    inner: RwLock<RegistryInner>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self {
            tree: RouteTree::new(),
            inner: RwLock::new(RegistryInner {
                pools: HashMap::new(),
                route_index: HashMap::new(),
                path_index: HashSet::new(),
            }),
        }
    }

    /// Apply an Add/Update event: reconcile the instance pool, and on first
    /// sight of the service install its routes from the descriptors.
    pub fn register_service(&self, service: &ServiceInfo) -> Result<(), RegistryError> {
        let name = service.service_name().trim();
        if name.is_empty() {
            return Err(RegistryError::InvalidService);
        }

        let (pool, needs_routes) = {
            let mut inner = self.inner.write().unwrap();
            let pool = inner
                .pools
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(ServicePool::new(name)))
                .clone();
            let needs_routes = inner
                .route_index
                .get(name)
                .map_or(true, |keys| keys.is_empty());
            (pool, needs_routes)
        };

        let first_descriptors = pool.reconcile(&service.metadata, &service.instances);

        if !needs_routes {
            return Ok(());
        }
        let Some(descriptors) = first_descriptors else {
            // No instance produced a connection yet; a later event retries.
            info!(service = %name, "Skipping route registration, no descriptors available yet");
            return Ok(());
        };

        for descriptor_service in descriptors.services() {
            for method in descriptor_service.methods() {
                for rule in extract_http_rules(&method) {
                    let key = normalize_key(&rule.method, &template_to_tree_path(&rule.path));

                    let mut inner = self.inner.write().unwrap();
                    if inner.path_index.contains(&key) {
                        // Same service re-registering, or another service's
                        // claim: the first writer keeps the path.
                        continue;
                    }
                    let route = Arc::new(Route {
                        service_name: name.to_string(),
                        method_name: method.name().to_string(),
                        full_method: format!(
                            "{}/{}",
                            descriptor_service.full_name(),
                            method.name()
                        ),
                        method: method.clone(),
                        rule: rule.clone(),
                    });
                    if let Err(e) = self.tree.insert(&key, route) {
                        warn!(service = %name, key = %key, error = %e, "Failed to insert route");
                        continue;
                    }
                    info!(
                        method = %rule.method,
                        path = %rule.path,
                        target = %format!("{}/{}", descriptor_service.full_name(), method.name()),
                        "Registered route"
                    );
                    inner
                        .route_index
                        .entry(name.to_string())
                        .or_default()
                        .insert(key.clone());
                    inner.path_index.insert(key);
                }
            }
        }

        Ok(())
    }

    /// Apply a Delete event: drop the service's routes, pool, and invokers.
    pub fn unregister_service(&self, service: &ServiceInfo) -> Result<(), RegistryError> {
        let name = service.service_name().trim();
        if name.is_empty() {
            return Err(RegistryError::InvalidService);
        }

        let pool = {
            let mut inner = self.inner.write().unwrap();
            if let Some(keys) = inner.route_index.remove(name) {
                for key in &keys {
                    self.tree.remove(key);
                    inner.path_index.remove(key);
                }
            }
            inner.pools.remove(name)
        };
        if let Some(pool) = pool {
            pool.shutdown();
        }
        info!(service = %name, "Removed service");
        Ok(())
    }

    /// Match a request against the tree.
    pub fn lookup(
        &self,
        method: &str,
        path: &str,
    ) -> Option<(Arc<Route>, HashMap<String, String>)> {
        self.tree.lookup(&normalize_key(method, path))
    }

    /// The invoker pool of a service, if the service is known.
    pub fn pool(&self, service_name: &str) -> Option<Arc<ServicePool>> {
        self.inner.read().unwrap().pools.get(service_name).cloned()
    }

    /// True when a normalized key is installed. Mostly useful to observers.
    pub fn has_path(&self, key: &str) -> bool {
        self.inner.read().unwrap().path_index.contains(key)
    }

    /// Close every invoker in every pool.
    pub fn close(&self) {
        let pools: Vec<Arc<ServicePool>> = {
            let inner = self.inner.read().unwrap();
            inner.pools.values().cloned().collect()
        };
        for pool in pools {
            pool.shutdown();
        }
    }
}

impl Default for RouteRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Canonical tree key for a (method, path) pair: `/[METHOD]/cleanedPath`.
pub fn normalize_key(method: &str, path: &str) -> String {
    let method = method.trim().to_ascii_uppercase();
    format!("/[{}]{}", method, clean_path(path.trim()))
}

/// Lexical path cleaning: strip query and fragment, collapse repeated
/// slashes, resolve `.` and `..`, force a leading slash, drop the trailing
/// slash unless the path is "/".
fn clean_path(path: &str) -> String {
    let mut p = path;
    if let Some(i) = p.find('?') {
        p = &p[..i];
    }
    if let Some(i) = p.find('#') {
        p = &p[..i];
    }

    let mut stack: Vec<&str> = Vec::new();
    for segment in p.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            other => stack.push(other),
        }
    }
    if stack.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", stack.join("/"))
    }
}
