//! Cross-origin resource sharing.
//!
//! # Design Decisions
//! - A concrete Origin is echoed back with credentials allowed (and
//!   `Vary: Origin` so caches keep responses apart); otherwise `*`
//! - Requested headers are echoed with per-token whitespace trimmed,
//!   falling back to a fixed allow list
//! - Preflight requests short-circuit with 204

use axum::body::Body;
use axum::http::header::{HeaderMap, HeaderValue, ORIGIN, VARY};
use axum::http::{Method, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

const ALLOW_METHODS: &str = "GET,POST,PUT,PATCH,DELETE,OPTIONS";
const DEFAULT_ALLOW_HEADERS: &str = "Content-Type,Authorization,X-Requested-With,X-Csrf-Token";
const MAX_AGE_SECS: &str = "600";

pub async fn cors_middleware(request: Request<Body>, next: Next) -> Response {
    let origin = request.headers().get(ORIGIN).cloned();
    let requested_headers = request
        .headers()
        .get("access-control-request-headers")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if request.method() == Method::OPTIONS {
        let mut response = StatusCode::NO_CONTENT.into_response();
        apply_cors_headers(response.headers_mut(), origin.as_ref(), requested_headers.as_deref());
        return response;
    }

    let mut response = next.run(request).await;
    apply_cors_headers(response.headers_mut(), origin.as_ref(), requested_headers.as_deref());
    response
}

fn apply_cors_headers(
    headers: &mut HeaderMap,
    origin: Option<&HeaderValue>,
    requested_headers: Option<&str>,
) {
    match origin {
        Some(origin) => {
            headers.insert("access-control-allow-origin", origin.clone());
            headers.insert(VARY, HeaderValue::from_static("Origin"));
            headers.insert(
                "access-control-allow-credentials",
                HeaderValue::from_static("true"),
            );
        }
        None => {
            headers.insert(
                "access-control-allow-origin",
                HeaderValue::from_static("*"),
            );
        }
    }

    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static(ALLOW_METHODS),
    );

    let allow_headers = normalize_header_list(
        requested_headers
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_ALLOW_HEADERS),
    );
    if let Ok(value) = HeaderValue::from_str(&allow_headers) {
        headers.insert("access-control-allow-headers", value);
    }

    headers.insert(
        "access-control-max-age",
        HeaderValue::from_static(MAX_AGE_SECS),
    );
}

/// Trim whitespace around each comma-separated token, dropping empties.
fn normalize_header_list(list: &str) -> String {
    list.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}
