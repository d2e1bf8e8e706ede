//! etcd mirror and event source.
//!
//! Two prefixes are mirrored in memory:
//! - `<metadata_prefix><service>` → JSON metadata with a base64
//!   `FileDescriptorSet`
//! - `<discovery_prefix><service>/<instance_id>` → literal "host:port"
//!
//! Startup folds the existing snapshot in silently, then emits one `Add`
//! per known service before the long-lived watches take over.

use std::collections::HashMap;

use etcd_client::{Client, ConnectOptions, EventType, GetOptions, WatchOptions};
use prost_reflect::DescriptorPool;
use serde::Deserialize;
use serde_with::serde_as;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::EtcdConfig;
use crate::discovery::{EventKind, ServiceEvent, ServiceInfo, ServiceInstance, ServiceMetadata};

/// Event channel capacity; senders block when the consumer falls behind.
pub const EVENT_BUFFER: usize = 100;

#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("etcd error: {0}")]
    Etcd(#[from] etcd_client::Error),

    #[error("failed to unmarshal service metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("failed to unmarshal descriptor set: {0}")]
    Descriptor(#[from] prost_reflect::DescriptorError),
}

/// Wire form of a metadata key's value.
#[serde_as]
#[derive(Debug, Deserialize)]
struct MetadataRecord {
    #[serde(default)]
    service_name: String,
    #[serde_as(as = "serde_with::base64::Base64")]
    #[serde(default)]
    descriptor_data: Vec<u8>,
    #[serde(default)]
    version: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Default)]
struct MirrorState {
    metadata: HashMap<String, ServiceMetadata>,
    instances: HashMap<String, Vec<ServiceInstance>>,
    initial_loading: bool,
}

#[derive(Clone, Copy)]
enum PrefixKind {
    Metadata,
    Instances,
}

/// Watches the coordination store and emits coalesced service events.
pub struct Watcher {
    client: Client,
    metadata_prefix: String,
    discovery_prefix: String,
    state: Mutex<MirrorState>,
    events_tx: mpsc::Sender<ServiceEvent>,
    cancel: CancellationToken,
}

impl Watcher {
    /// Connect to etcd. Fails fast when the store is unreachable within the
    /// dial timeout.
    pub async fn connect(
        config: &EtcdConfig,
    ) -> Result<(Arc<Self>, mpsc::Receiver<ServiceEvent>), WatcherError> {
        let options = ConnectOptions::new().with_connect_timeout(config.dial_timeout());
        let client = Client::connect(&config.endpoints, Some(options)).await?;
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);

        let watcher = Arc::new(Self {
            client,
            metadata_prefix: config.service_metadata_prefix.clone(),
            discovery_prefix: config.server_discovery_prefix.clone(),
            state: Mutex::new(MirrorState::default()),
            events_tx,
            cancel: CancellationToken::new(),
        });
        Ok((watcher, events_rx))
    }

    /// Load the store snapshot, emit the initial `Add` events, and start the
    /// two prefix watches.
    pub async fn start(self: &Arc<Self>) -> Result<(), WatcherError> {
        self.load_existing().await?;

        for (prefix, kind) in [
            (self.metadata_prefix.clone(), PrefixKind::Metadata),
            (self.discovery_prefix.clone(), PrefixKind::Instances),
        ] {
            let watcher = Arc::clone(self);
            tokio::spawn(watcher.watch_prefix(prefix, kind));
        }
        Ok(())
    }

    /// Stop both watches. The event channel closes once the watch tasks exit
    /// and the watcher itself is dropped.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    async fn load_existing(&self) -> Result<(), WatcherError> {
        self.state.lock().await.initial_loading = true;

        let mut client = self.client.clone();
        let prefix = GetOptions::new().with_prefix();

        let response = client
            .get(self.metadata_prefix.as_str(), Some(prefix.clone()))
            .await?;
        for kv in response.kvs() {
            if let Ok(key) = kv.key_str() {
                self.apply_metadata_put(key, kv.value()).await;
            }
        }

        let response = client
            .get(self.discovery_prefix.as_str(), Some(prefix))
            .await?;
        for kv in response.kvs() {
            if let (Ok(key), Ok(value)) = (kv.key_str(), kv.value_str()) {
                self.apply_instance_put(key, value).await;
            }
        }

        let initial: Vec<ServiceInfo> = {
            let mut state = self.state.lock().await;
            state.initial_loading = false;
            state
                .metadata
                .values()
                .map(|metadata| ServiceInfo {
                    metadata: metadata.clone(),
                    instances: state
                        .instances
                        .get(&metadata.service_name)
                        .cloned()
                        .unwrap_or_default(),
                })
                .collect()
        };
        info!(services = initial.len(), "Initial service snapshot loaded");
        for service in initial {
            self.emit(EventKind::Add, service).await;
        }
        Ok(())
    }

    async fn watch_prefix(self: Arc<Self>, prefix: String, kind: PrefixKind) {
        let mut client = self.client.clone();
        let (_watch_handle, mut stream) = match client
            .watch(prefix.as_str(), Some(WatchOptions::new().with_prefix()))
            .await
        {
            Ok(pair) => pair,
            Err(e) => {
                error!(prefix = %prefix, error = %e, "Failed to start watch");
                return;
            }
        };

        loop {
            let response = tokio::select! {
                _ = self.cancel.cancelled() => break,
                message = stream.message() => match message {
                    Ok(Some(response)) => response,
                    Ok(None) => {
                        debug!(prefix = %prefix, "Watch stream closed");
                        break;
                    }
                    Err(e) => {
                        warn!(prefix = %prefix, error = %e, "Watch error");
                        continue;
                    }
                },
            };

            for event in response.events() {
                let Some(kv) = event.kv() else { continue };
                let Ok(key) = kv.key_str() else { continue };

                match (kind, event.event_type()) {
                    (PrefixKind::Metadata, EventType::Put) => {
                        self.apply_metadata_put(key, kv.value()).await;
                    }
                    (PrefixKind::Metadata, EventType::Delete) => {
                        self.apply_metadata_delete(key).await;
                    }
                    (PrefixKind::Instances, EventType::Put) => {
                        if let Ok(value) = kv.value_str() {
                            self.apply_instance_put(key, value).await;
                        }
                    }
                    (PrefixKind::Instances, EventType::Delete) => {
                        self.apply_instance_delete(key).await;
                    }
                }
            }
        }
    }

    async fn apply_metadata_put(&self, key: &str, value: &[u8]) {
        let Some(service_name) = metadata_service_name(&self.metadata_prefix, key) else {
            return;
        };
        let metadata = match parse_metadata(value) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(service = %service_name, error = %e, "Failed to parse service metadata");
                return;
            }
        };

        let mut state = self.state.lock().await;
        state.metadata.insert(service_name.clone(), metadata.clone());
        let instances = state
            .instances
            .get(&service_name)
            .cloned()
            .unwrap_or_default();
        if state.initial_loading {
            return;
        }
        self.emit(EventKind::Update, ServiceInfo { metadata, instances })
            .await;
    }

    async fn apply_metadata_delete(&self, key: &str) {
        let Some(service_name) = metadata_service_name(&self.metadata_prefix, key) else {
            return;
        };

        let mut state = self.state.lock().await;
        let Some(metadata) = state.metadata.remove(&service_name) else {
            return;
        };
        let instances = state
            .instances
            .get(&service_name)
            .cloned()
            .unwrap_or_default();
        // Instances still around: the service keeps serving, no event.
        if instances.is_empty() {
            self.emit(EventKind::Delete, ServiceInfo { metadata, instances })
                .await;
        }
    }

    async fn apply_instance_put(&self, key: &str, value: &str) {
        let Some(service_name) = instance_service_name(&self.discovery_prefix, key) else {
            return;
        };
        let Some(instance) = ServiceInstance::parse(value) else {
            warn!(value = %value, "Invalid service instance value format");
            return;
        };

        let mut state = self.state.lock().await;
        let list = state.instances.entry(service_name.clone()).or_default();
        match list.iter_mut().find(|i| i.addr == instance.addr) {
            Some(slot) => *slot = instance,
            None => list.push(instance),
        }
        let instances = list.clone();

        let Some(metadata) = state.metadata.get(&service_name).cloned() else {
            return;
        };
        if state.initial_loading {
            return;
        }
        self.emit(EventKind::Update, ServiceInfo { metadata, instances })
            .await;
    }

    /// Deleted instance keys may arrive coalesced, so the full prefix is
    /// re-queried to recompute the set instead of trusting the single key.
    async fn apply_instance_delete(&self, key: &str) {
        let Some(service_name) = instance_service_name(&self.discovery_prefix, key) else {
            return;
        };

        let mut state = self.state.lock().await;
        if !state.instances.contains_key(&service_name) {
            return;
        }

        let mut client = self.client.clone();
        let prefix = format!("{}{}/", self.discovery_prefix, service_name);
        let response = match client
            .get(prefix.as_str(), Some(GetOptions::new().with_prefix()))
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(service = %service_name, error = %e, "Failed to fetch instances");
                return;
            }
        };
        let instances: Vec<ServiceInstance> = response
            .kvs()
            .iter()
            .filter_map(|kv| kv.value_str().ok().and_then(ServiceInstance::parse))
            .collect();
        state
            .instances
            .insert(service_name.clone(), instances.clone());

        let Some(metadata) = state.metadata.get(&service_name).cloned() else {
            warn!(service = %service_name, "No metadata found for service");
            return;
        };
        if instances.is_empty() {
            self.emit(EventKind::Delete, ServiceInfo { metadata, instances })
                .await;
        } else {
            if state.initial_loading {
                return;
            }
            self.emit(EventKind::Update, ServiceInfo { metadata, instances })
                .await;
        }
    }

    async fn emit(&self, kind: EventKind, service: ServiceInfo) {
        if self
            .events_tx
            .send(ServiceEvent { kind, service })
            .await
            .is_err()
        {
            debug!("Event receiver dropped, discarding event");
        }
    }
}

fn parse_metadata(value: &[u8]) -> Result<ServiceMetadata, WatcherError> {
    let record: MetadataRecord = serde_json::from_slice(value)?;
    let descriptors = DescriptorPool::decode(record.descriptor_data.as_slice())?;
    Ok(ServiceMetadata {
        service_name: record.service_name,
        version: record.version,
        labels: record.metadata,
        descriptor_bytes: record.descriptor_data,
        descriptors,
    })
}

/// `<metadata_prefix><service_name>` → service name.
fn metadata_service_name(prefix: &str, key: &str) -> Option<String> {
    let rest = key.strip_prefix(prefix)?.trim_end_matches('/');
    if rest.is_empty() {
        None
    } else {
        Some(rest.to_string())
    }
}

/// `<discovery_prefix><service_name>/<instance_id>` → service name.
fn instance_service_name(prefix: &str, key: &str) -> Option<String> {
    let rest = key.strip_prefix(prefix)?;
    let name = rest.split('/').next().unwrap_or_default();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_key_extraction() {
        assert_eq!(
            metadata_service_name("/services/", "/services/user"),
            Some("user".to_string())
        );
        assert_eq!(
            metadata_service_name("/services/", "/services/user/"),
            Some("user".to_string())
        );
        assert_eq!(metadata_service_name("/services/", "/services/"), None);
        assert_eq!(metadata_service_name("/services/", "/other/user"), None);
    }

    #[test]
    fn instance_key_extraction() {
        assert_eq!(
            instance_service_name("/discovery/", "/discovery/user/i1"),
            Some("user".to_string())
        );
        assert_eq!(
            instance_service_name("/discovery/", "/discovery/user"),
            Some("user".to_string())
        );
        assert_eq!(instance_service_name("/discovery/", "/discovery/"), None);
        assert_eq!(instance_service_name("/discovery/", "/nope/user/i1"), None);
    }

    #[test]
    fn metadata_record_parses_base64_descriptor() {
        // empty FileDescriptorSet encodes to zero bytes, base64 ""
        let value = br#"{"service_name":"user","descriptor_data":"","version":"1.0","metadata":{"team":"core"}}"#;
        let metadata = parse_metadata(value).unwrap();
        assert_eq!(metadata.service_name, "user");
        assert_eq!(metadata.version, "1.0");
        assert_eq!(metadata.labels["team"], "core");
        assert_eq!(metadata.descriptors.files().count(), 0);
    }

    #[test]
    fn malformed_metadata_is_rejected() {
        assert!(parse_metadata(b"not json").is_err());
        assert!(parse_metadata(br#"{"descriptor_data":"%%%"}"#).is_err());
    }
}
