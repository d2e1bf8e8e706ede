//! HTTP binding extraction from protobuf method options.
//!
//! Backends annotate their RPCs with `google.api.http`; the extension
//! travels inside the published `FileDescriptorSet`, so it can be read
//! reflectively without generated code.

use prost_reflect::{DynamicMessage, MethodDescriptor, Value};

/// One HTTP binding of an RPC method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRule {
    /// HTTP verb: GET/POST/PUT/PATCH/DELETE or a custom kind.
    pub method: String,
    /// Path template as written in the annotation (e.g. "/v1/users/{id}").
    pub path: String,
    /// Body mapping: "" (none), "*" (merge top-level), or a field name.
    pub body: String,
}

const HTTP_EXTENSION: &str = "google.api.http";

/// Extract the ordered HTTP bindings of a method: the main binding first,
/// then any `additional_bindings` in declaration order. Methods without the
/// annotation yield no rules.
pub fn extract_http_rules(method: &MethodDescriptor) -> Vec<HttpRule> {
    let options = method.options();
    let Some(ext) = method.parent_pool().get_extension_by_name(HTTP_EXTENSION) else {
        return Vec::new();
    };
    if !options.has_extension(&ext) {
        return Vec::new();
    }
    let value = options.get_extension(&ext);
    let Some(rule) = value.as_message() else {
        return Vec::new();
    };

    let mut rules = Vec::new();
    if let Some(main) = parse_rule(rule) {
        rules.push(main);
    }
    if let Some(bindings) = rule.get_field_by_name("additional_bindings") {
        if let Some(list) = bindings.as_list() {
            for binding in list {
                if let Some(extra) = binding.as_message().and_then(parse_rule) {
                    rules.push(extra);
                }
            }
        }
    }
    rules
}

/// The pattern oneof: annotation field name to HTTP verb.
const PATTERNS: [(&str, &str); 5] = [
    ("get", "GET"),
    ("put", "PUT"),
    ("post", "POST"),
    ("delete", "DELETE"),
    ("patch", "PATCH"),
];

fn parse_rule(rule: &DynamicMessage) -> Option<HttpRule> {
    let body = string_field(rule, "body");

    for (field, verb) in PATTERNS {
        if rule.has_field_by_name(field) {
            return Some(HttpRule {
                method: verb.to_string(),
                path: string_field(rule, field),
                body,
            });
        }
    }

    if rule.has_field_by_name("custom") {
        let custom = rule.get_field_by_name("custom")?;
        let custom = custom.as_message()?;
        return Some(HttpRule {
            method: string_field(custom, "kind"),
            path: string_field(custom, "path"),
            body,
        });
    }

    None
}

fn string_field(message: &DynamicMessage, name: &str) -> String {
    message
        .get_field_by_name(name)
        .as_deref()
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Convert an annotation path template to the route tree's syntax:
/// `{name}` becomes a `:name` parameter and a trailing `{name=**}` becomes a
/// `*name` wildcard. Everything else passes through verbatim.
pub fn template_to_tree_path(template: &str) -> String {
    let segments: Vec<String> = template
        .split('/')
        .map(|seg| {
            let Some(inner) = seg.strip_prefix('{').and_then(|s| s.strip_suffix('}')) else {
                return seg.to_string();
            };
            match inner.split_once('=') {
                Some((name, "**")) => format!("*{name}"),
                Some((name, _)) => format!(":{name}"),
                None => format!(":{inner}"),
            }
        })
        .collect();
    segments.join("/")
}
