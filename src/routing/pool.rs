//! Per-service invoker pool with round-robin selection.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use prost_reflect::DescriptorPool;
use thiserror::Error;
use tracing::{debug, warn};

use crate::discovery::{ServiceInstance, ServiceMetadata};
use crate::invoker::GrpcInvoker;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("no available instances")]
    NoInstances,

    #[error("no invoker available for service {0}")]
    NoInvokers(String),
}

struct PoolInner {
    /// Invokers keyed by "host:port".
    invokers: HashMap<String, Arc<GrpcInvoker>>,
    instances: Vec<ServiceInstance>,
}

/// The set of invokers for one service, with rotation state.
pub struct ServicePool {
    service_name: String,
    counter: AtomicU64,
    inner: RwLock<PoolInner>,
}

impl ServicePool {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            counter: AtomicU64::new(0),
            inner: RwLock::new(PoolInner {
                invokers: HashMap::new(),
                instances: Vec::new(),
            }),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Round-robin selection: advance the counter, then scan at most one
    /// full cycle for an instance that has a live invoker.
    pub fn next_invoker(&self) -> Result<Arc<GrpcInvoker>, PoolError> {
        let inner = self.inner.read().unwrap();
        if inner.instances.is_empty() {
            return Err(PoolError::NoInstances);
        }

        let start = self.counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        let n = inner.instances.len() as u64;
        for i in 0..n {
            let idx = (start.wrapping_add(i) % n) as usize;
            if let Some(invoker) = inner.invokers.get(&inner.instances[idx].addr) {
                return Ok(invoker.clone());
            }
        }
        Err(PoolError::NoInvokers(self.service_name.clone()))
    }

    /// Bring the pool in line with a new instance list. Missing invokers are
    /// built (failures are logged and skipped), invokers for vanished
    /// addresses are unlinked and closed after the lock is released.
    ///
    /// Returns the descriptor pool used for the first invoker built during
    /// this call, if any; the registry uses it to install routes on first
    /// sight of the service.
    pub fn reconcile(
        &self,
        metadata: &ServiceMetadata,
        instances: &[ServiceInstance],
    ) -> Option<DescriptorPool> {
        let existing: HashSet<String> = {
            let inner = self.inner.read().unwrap();
            inner.invokers.keys().cloned().collect()
        };

        let mut created: HashMap<String, Arc<GrpcInvoker>> = HashMap::new();
        let mut first_descriptors = None;
        for instance in instances {
            if existing.contains(&instance.addr) || created.contains_key(&instance.addr) {
                continue;
            }
            match GrpcInvoker::connect(&instance.addr, metadata.descriptors.clone()) {
                Ok(invoker) => {
                    if first_descriptors.is_none() {
                        first_descriptors = Some(metadata.descriptors.clone());
                    }
                    created.insert(instance.addr.clone(), Arc::new(invoker));
                }
                Err(e) => {
                    warn!(
                        service = %self.service_name,
                        addr = %instance.addr,
                        error = %e,
                        "Failed to create invoker"
                    );
                }
            }
        }

        let alive: HashSet<&str> = instances.iter().map(|i| i.addr.as_str()).collect();
        let mut unlinked = Vec::new();
        {
            let mut inner = self.inner.write().unwrap();
            inner.instances = instances.to_vec();
            inner.invokers.extend(created);

            let gone: Vec<String> = inner
                .invokers
                .keys()
                .filter(|addr| !alive.contains(addr.as_str()))
                .cloned()
                .collect();
            for addr in gone {
                if let Some(invoker) = inner.invokers.remove(&addr) {
                    unlinked.push(invoker);
                }
            }
        }

        for invoker in unlinked {
            debug!(service = %self.service_name, addr = %invoker.address(), "Instance gone");
            invoker.close();
        }

        first_descriptors
    }

    /// Close every invoker and forget all instances.
    pub fn shutdown(&self) {
        let drained: Vec<Arc<GrpcInvoker>> = {
            let mut inner = self.inner.write().unwrap();
            inner.instances.clear();
            inner.invokers.drain().map(|(_, inv)| inv).collect()
        };
        for invoker in drained {
            invoker.close();
        }
    }

    /// Current invoker addresses, for reconciliation checks.
    pub fn invoker_addrs(&self) -> Vec<String> {
        let inner = self.inner.read().unwrap();
        inner.invokers.keys().cloned().collect()
    }

    /// Current instance count.
    pub fn instance_count(&self) -> usize {
        self.inner.read().unwrap().instances.len()
    }
}
