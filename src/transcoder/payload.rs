//! gRPC request payload composition.
//!
//! Builds the JSON object handed to the invoker out of the three HTTP
//! request surfaces: captured path parameters, query parameters, and the
//! body (subject to the binding's body field).

use std::collections::HashMap;

use serde_json::{Map, Value};
use thiserror::Error;

/// Failure modes of payload composition.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("failed to unmarshal body: {0}")]
    BadBody(#[source] serde_json::Error),

    #[error("failed to read body: {0}")]
    BadRead(String),
}

/// Compose the request payload.
///
/// Precedence on key collisions: body overrides query overrides path. The
/// body is ignored for GET and DELETE regardless of the binding. `body_field`
/// follows the `google.api.http` contract: `""` drops the body, `"*"` merges
/// it at the top level, any other name nests it under that key.
pub fn compose_payload(
    method: &str,
    query: &str,
    path_params: &HashMap<String, String>,
    body: Option<&[u8]>,
    body_field: &str,
) -> Result<Vec<u8>, PayloadError> {
    let mut request = Map::new();

    for (key, value) in path_params {
        request.insert(key.clone(), Value::String(value.clone()));
    }

    for (key, values) in collect_query(query) {
        let value = if values.len() == 1 {
            Value::String(values.into_iter().next().unwrap())
        } else {
            Value::Array(values.into_iter().map(Value::String).collect())
        };
        request.insert(key, value);
    }

    let skip_body = method.eq_ignore_ascii_case("GET") || method.eq_ignore_ascii_case("DELETE");
    if !skip_body {
        if let Some(body) = body.filter(|b| !b.is_empty()) {
            if body_field == "*" {
                let merged: Map<String, Value> =
                    serde_json::from_slice(body).map_err(PayloadError::BadBody)?;
                for (key, value) in merged {
                    request.insert(key, value);
                }
            } else if !body_field.is_empty() {
                let value: Value = serde_json::from_slice(body).map_err(PayloadError::BadBody)?;
                request.insert(body_field.to_string(), value);
            }
        }
    }

    Ok(Value::Object(request).to_string().into_bytes())
}

/// Parse the raw query string into ordered key/value groups.
fn collect_query(query: &str) -> Vec<(String, Vec<String>)> {
    let mut grouped: Vec<(String, Vec<String>)> = Vec::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        let key = key.into_owned();
        match grouped.iter_mut().find(|(k, _)| *k == key) {
            Some((_, values)) => values.push(value.into_owned()),
            None => grouped.push((key, vec![value.into_owned()])),
        }
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[test]
    fn path_and_query_only() {
        let mut params = HashMap::new();
        params.insert("id".to_string(), "123".to_string());

        let payload = compose_payload("GET", "verbose=true", &params, None, "").unwrap();
        assert_eq!(
            parse(&payload),
            serde_json::json!({"id": "123", "verbose": "true"})
        );
    }

    #[test]
    fn repeated_query_params_become_arrays() {
        let payload =
            compose_payload("GET", "tag=a&tag=b&one=x", &HashMap::new(), None, "").unwrap();
        assert_eq!(
            parse(&payload),
            serde_json::json!({"tag": ["a", "b"], "one": "x"})
        );
    }

    #[test]
    fn star_body_merges_and_overrides() {
        let body = br#"{"name":"Tom","age":18,"source":"body"}"#;
        let payload =
            compose_payload("POST", "source=web", &HashMap::new(), Some(body), "*").unwrap();
        assert_eq!(
            parse(&payload),
            serde_json::json!({"source": "body", "name": "Tom", "age": 18})
        );
    }

    #[test]
    fn named_body_nests_under_field() {
        let body = br#"{"name":"Tom"}"#;
        let payload =
            compose_payload("POST", "", &HashMap::new(), Some(body), "user").unwrap();
        assert_eq!(parse(&payload), serde_json::json!({"user": {"name": "Tom"}}));
    }

    #[test]
    fn empty_body_field_drops_body() {
        let body = br#"{"name":"Tom"}"#;
        let payload = compose_payload("POST", "a=1", &HashMap::new(), Some(body), "").unwrap();
        assert_eq!(parse(&payload), serde_json::json!({"a": "1"}));
    }

    #[test]
    fn get_and_delete_skip_body() {
        let body = br#"{"name":"Tom"}"#;
        for method in ["GET", "DELETE"] {
            let payload =
                compose_payload(method, "", &HashMap::new(), Some(body), "*").unwrap();
            assert_eq!(parse(&payload), serde_json::json!({}));
        }
    }

    #[test]
    fn invalid_body_is_rejected() {
        let err = compose_payload("POST", "", &HashMap::new(), Some(b"not json"), "*")
            .unwrap_err();
        assert!(matches!(err, PayloadError::BadBody(_)));
    }

    #[test]
    fn empty_body_is_valid() {
        let payload = compose_payload("POST", "q=1", &HashMap::new(), Some(b""), "*").unwrap();
        assert_eq!(parse(&payload), serde_json::json!({"q": "1"}));
    }

    #[test]
    fn composition_is_idempotent() {
        let mut params = HashMap::new();
        params.insert("id".to_string(), "5".to_string());
        let body = br#"{"x":1}"#;

        let first = compose_payload("POST", "y=2", &params, Some(body), "*").unwrap();
        let second = compose_payload("POST", "y=2", &params, Some(body), "*").unwrap();
        assert_eq!(first, second);
    }
}
