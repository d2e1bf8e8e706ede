//! HTTP server setup and the gateway request pipeline.
//!
//! # Responsibilities
//! - Create the Axum router with the catch-all gateway handler
//! - Wire up middleware (CORS, timeout, tracing)
//! - Match request → select invoker → compose payload → invoke → encode
//!
//! # Design Decisions
//! - Headers are promoted to gRPC metadata with a fixed skip list; repeated
//!   values are kept, names are lowercased by the HTTP layer already
//! - The request future drives the upstream call, so a client disconnect
//!   cancels the backend RPC

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use serde_json::Value;
use tonic::metadata::{AsciiMetadataKey, AsciiMetadataValue, MetadataMap};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::HttpConfig;
use crate::http::middleware::cors_middleware;
use crate::http::response;
use crate::observability::metrics;
use crate::routing::RouteRegistry;
use crate::transcoder::compose_payload;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RouteRegistry>,
    pub http: HttpConfig,
}

/// Build the Axum router with all middleware layers.
pub fn build_router(config: &HttpConfig, state: AppState) -> Router {
    Router::new()
        .route("/", any(gateway_handler))
        .route("/{*path}", any(gateway_handler))
        .with_state(state)
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(cors_middleware))
}

/// Catch-all handler: every non-preflight request flows through here.
async fn gateway_handler(
    State(state): State<AppState>,
    request: Request<Body>,
) -> impl IntoResponse {
    let start = Instant::now();
    let method = request.method().as_str().to_string();

    let response = proxy(&state, request).await;

    metrics::record_request(&method, response.status().as_u16(), start);
    response
}

async fn proxy(state: &AppState, request: Request<Body>) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let query = request.uri().query().unwrap_or("").to_string();

    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    debug!(
        request_id = %request_id,
        method = %method,
        path = %path,
        "Routing request"
    );

    // 1. Match route
    let Some((route, path_params)) = state.registry.lookup(method.as_str(), &path) else {
        return response::envelope(
            StatusCode::NOT_FOUND,
            404,
            format!("No route found for {method} {path}"),
            Value::Null,
        );
    };

    // 2. Select a live instance
    let Some(pool) = state.registry.pool(&route.service_name) else {
        return response::envelope(
            StatusCode::SERVICE_UNAVAILABLE,
            503,
            format!("Service {} not available", route.service_name),
            Value::Null,
        );
    };
    let invoker = match pool.next_invoker() {
        Ok(invoker) => invoker,
        Err(e) => {
            warn!(request_id = %request_id, service = %route.service_name, error = %e, "No invoker");
            return response::envelope(
                StatusCode::SERVICE_UNAVAILABLE,
                503,
                "No available service instances",
                Value::Null,
            );
        }
    };

    // 3. Read the body (capped) and compose the gRPC payload
    let (parts, body) = request.into_parts();
    let skip_body = method == Method::GET || method == Method::DELETE;
    let body_bytes = if skip_body {
        None
    } else {
        match axum::body::to_bytes(body, state.http.max_body_bytes).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                return response::envelope(
                    StatusCode::BAD_REQUEST,
                    400,
                    format!("Failed to build request: failed to read body: {e}"),
                    Value::Null,
                );
            }
        }
    };
    let payload = match compose_payload(
        method.as_str(),
        &query,
        &path_params,
        body_bytes.as_deref(),
        &route.rule.body,
    ) {
        Ok(payload) => payload,
        Err(e) => {
            return response::envelope(
                StatusCode::BAD_REQUEST,
                400,
                format!("Failed to build request: {e}"),
                Value::Null,
            );
        }
    };

    // 4. Promote headers to outgoing gRPC metadata
    let metadata = promote_headers(&parts.headers);

    // 5. Invoke; this future is dropped on client disconnect, aborting the call
    match invoker.invoke(&route.full_method, &payload, metadata, None).await {
        Ok(body) => response::success(&body),
        Err(e) => {
            warn!(
                request_id = %request_id,
                method = %route.full_method,
                addr = %invoker.address(),
                error = %e,
                "Upstream call failed"
            );
            response::map_invoke_error(&e)
        }
    }
}

/// Hop-by-hop and content negotiation headers that never reach the backend.
/// HTTP/2 pseudo-headers (`:authority` and friends) never surface in the
/// header map, so the list starts at `host`.
const SKIPPED_HEADERS: [&str; 16] = [
    "host",
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "upgrade",
    "upgrade-insecure-requests",
    "content-length",
    "content-type",
    "user-agent",
    "accept",
    "accept-encoding",
    "accept-language",
    "origin",
    "referer",
    "te",
];

/// Copy forwardable request headers into gRPC metadata, keeping repeated
/// values. Values that are not valid metadata are dropped.
fn promote_headers(headers: &HeaderMap) -> MetadataMap {
    let mut metadata = MetadataMap::new();
    for (name, value) in headers {
        if SKIPPED_HEADERS.contains(&name.as_str()) {
            continue;
        }
        let Ok(key) = name.as_str().parse::<AsciiMetadataKey>() else {
            continue;
        };
        let Some(value) = value
            .to_str()
            .ok()
            .and_then(|v| v.parse::<AsciiMetadataValue>().ok())
        else {
            continue;
        };
        metadata.append(key, value);
    }
    metadata
}
