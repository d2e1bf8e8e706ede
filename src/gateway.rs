//! Top-level wiring: discovery events in, HTTP requests through.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::GatewayConfig;
use crate::discovery::{EventKind, ServiceEvent, Watcher, WatcherError};
use crate::http::{build_router, AppState};
use crate::lifecycle;
use crate::routing::RouteRegistry;

/// Time allowed for in-flight requests to drain after the stop signal.
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("failed to create watcher: {0}")]
    Watcher(#[from] WatcherError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The assembled gateway: registry, watcher, and HTTP front-end.
pub struct Gateway {
    config: GatewayConfig,
    registry: Arc<RouteRegistry>,
    watcher: Arc<Watcher>,
    events: mpsc::Receiver<ServiceEvent>,
    cancel: CancellationToken,
}

impl Gateway {
    /// Connect to the coordination store and assemble the gateway.
    /// An unreachable store is fatal here, before anything serves.
    pub async fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let (watcher, events) = Watcher::connect(&config.etcd).await?;
        Ok(Self {
            config,
            registry: Arc::new(RouteRegistry::new()),
            watcher,
            events,
            cancel: CancellationToken::new(),
        })
    }

    /// Load the snapshot, start serving, and run until a shutdown signal.
    pub async fn run(self) -> Result<(), GatewayError> {
        let Gateway {
            config,
            registry,
            watcher,
            mut events,
            cancel,
        } = self;

        watcher.start().await?;

        // One task serializes all registry mutations, so a Delete can never
        // overtake the Update it trails.
        let event_registry = registry.clone();
        let event_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = event_cancel.cancelled() => break,
                    event = events.recv() => {
                        let Some(event) = event else { break };
                        apply_event(&event_registry, event);
                    }
                }
            }
        });

        let listener = TcpListener::bind(config.http.bind_address()).await?;
        info!(addr = %config.http.bind_address(), "Starting HTTP gateway");
        info!(endpoints = ?config.etcd.endpoints, "Watching etcd endpoints");
        info!(
            metadata_prefix = %config.etcd.service_metadata_prefix,
            discovery_prefix = %config.etcd.server_discovery_prefix,
            "Watching service prefixes"
        );

        let state = AppState {
            registry: registry.clone(),
            http: config.http.clone(),
        };
        let app = build_router(&config.http, state);

        let signal_cancel = cancel.clone();
        tokio::spawn(async move {
            lifecycle::shutdown_signal().await;
            signal_cancel.cancel();
        });

        let drain = cancel.clone();
        let serve = std::future::IntoFuture::into_future(
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { drain.cancelled().await }),
        );
        tokio::pin!(serve);

        tokio::select! {
            result = &mut serve => result?,
            _ = cancel.cancelled() => {
                info!("Stopping HTTP gateway");
                match tokio::time::timeout(SHUTDOWN_DEADLINE, &mut serve).await {
                    Ok(result) => result?,
                    Err(_) => warn!("Graceful shutdown deadline exceeded, aborting open connections"),
                }
            }
        }

        watcher.stop();
        registry.close();
        info!("HTTP gateway stopped");
        Ok(())
    }

}

fn apply_event(registry: &RouteRegistry, event: ServiceEvent) {
    let service = event.service.service_name().to_string();
    let result = match event.kind {
        EventKind::Add | EventKind::Update => registry.register_service(&event.service),
        EventKind::Delete => registry.unregister_service(&event.service),
    };
    if let Err(e) = result {
        warn!(service = %service, kind = ?event.kind, error = %e, "Failed to apply service event");
    }
}
