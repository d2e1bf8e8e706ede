//! Uniform JSON response envelope and gRPC status mapping.
//!
//! Every response the gateway produces, success or failure, carries the same
//! shape: `{ "code": <int>, "msg": <string>, "data": <json|null> }`. The
//! HTTP status is set independently of `code`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;
use tonic::Code;

use crate::invoker::InvokeError;

/// The envelope body.
#[derive(Debug, Serialize)]
pub struct Envelope {
    pub code: i64,
    pub msg: String,
    pub data: Value,
}

/// Render an envelope with an explicit HTTP status.
pub fn envelope(status: StatusCode, code: i64, msg: impl Into<String>, data: Value) -> Response {
    (
        status,
        Json(Envelope {
            code,
            msg: msg.into(),
            data,
        }),
    )
        .into_response()
}

/// Successful upstream call: HTTP 200, code 0, parsed response as data.
pub fn success(body: &[u8]) -> Response {
    envelope(StatusCode::OK, 0, "success", decode_response(body))
}

/// Parse the upstream payload; fall back to the raw text when it is not JSON.
fn decode_response(body: &[u8]) -> Value {
    match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(_) => Value::String(String::from_utf8_lossy(body).into_owned()),
    }
}

/// Map an invocation failure to an HTTP status and envelope. Upstream
/// statuses keep their gRPC numeric code and message; everything else is a
/// local failure reported as 500 / code -1.
pub fn map_invoke_error(error: &InvokeError) -> Response {
    match error {
        InvokeError::Upstream(status) => envelope(
            map_grpc_code(status.code()),
            status.code() as i64,
            status.message(),
            Value::Null,
        ),
        other => envelope(
            StatusCode::INTERNAL_SERVER_ERROR,
            -1,
            other.to_string(),
            Value::Null,
        ),
    }
}

/// gRPC status code → HTTP status code.
pub fn map_grpc_code(code: Code) -> StatusCode {
    match code {
        Code::Ok => StatusCode::OK,
        Code::Cancelled => StatusCode::REQUEST_TIMEOUT,
        Code::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
        Code::InvalidArgument => StatusCode::BAD_REQUEST,
        Code::DeadlineExceeded => StatusCode::REQUEST_TIMEOUT,
        Code::NotFound => StatusCode::NOT_FOUND,
        Code::AlreadyExists => StatusCode::CONFLICT,
        Code::PermissionDenied => StatusCode::FORBIDDEN,
        Code::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
        Code::FailedPrecondition => StatusCode::BAD_REQUEST,
        Code::Aborted => StatusCode::CONFLICT,
        Code::OutOfRange => StatusCode::BAD_REQUEST,
        Code::Unimplemented => StatusCode::NOT_IMPLEMENTED,
        Code::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        Code::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        Code::DataLoss => StatusCode::INTERNAL_SERVER_ERROR,
        Code::Unauthenticated => StatusCode::UNAUTHORIZED,
    }
}
