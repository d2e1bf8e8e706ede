//! Shared fixtures for integration tests.
//!
//! Builds serialized `FileDescriptorSet` payloads by hand, the same shape a
//! backend publishes after `protoc --include_imports`: the service file, the
//! `google.api` annotation files, and a minimal `descriptor.proto` stub that
//! carries the `MethodOptions` extension range.

#![allow(dead_code)]

use std::collections::HashMap;

use prost_reflect::DescriptorPool;

use pilot_gateway::discovery::{ServiceInfo, ServiceInstance, ServiceMetadata};

// ---- protobuf wire helpers ------------------------------------------------

fn varint(mut value: u64, out: &mut Vec<u8>) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
}

fn tag(field: u32, wire: u8, out: &mut Vec<u8>) {
    varint(((field as u64) << 3) | wire as u64, out);
}

fn put_varint(field: u32, value: u64, out: &mut Vec<u8>) {
    tag(field, 0, out);
    varint(value, out);
}

fn put_bytes(field: u32, bytes: &[u8], out: &mut Vec<u8>) {
    tag(field, 2, out);
    varint(bytes.len() as u64, out);
    out.extend_from_slice(bytes);
}

fn put_str(field: u32, value: &str, out: &mut Vec<u8>) {
    put_bytes(field, value.as_bytes(), out);
}

// ---- FieldDescriptorProto / DescriptorProto builders ----------------------

const LABEL_OPTIONAL: u64 = 1;
const LABEL_REPEATED: u64 = 3;
const TYPE_INT32: u64 = 5;
const TYPE_STRING: u64 = 9;
const TYPE_MESSAGE: u64 = 11;

struct Field {
    name: &'static str,
    number: u64,
    label: u64,
    r#type: u64,
    type_name: Option<&'static str>,
    oneof_index: Option<u64>,
}

impl Field {
    fn string(name: &'static str, number: u64) -> Self {
        Self {
            name,
            number,
            label: LABEL_OPTIONAL,
            r#type: TYPE_STRING,
            type_name: None,
            oneof_index: None,
        }
    }

    fn int32(name: &'static str, number: u64) -> Self {
        Self {
            r#type: TYPE_INT32,
            ..Self::string(name, number)
        }
    }

    fn message(name: &'static str, number: u64, type_name: &'static str) -> Self {
        Self {
            r#type: TYPE_MESSAGE,
            type_name: Some(type_name),
            ..Self::string(name, number)
        }
    }

    fn repeated(mut self) -> Self {
        self.label = LABEL_REPEATED;
        self
    }

    fn in_pattern_oneof(mut self) -> Self {
        self.oneof_index = Some(0);
        self
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_str(1, self.name, &mut out);
        put_varint(3, self.number, &mut out);
        put_varint(4, self.label, &mut out);
        put_varint(5, self.r#type, &mut out);
        if let Some(type_name) = self.type_name {
            put_str(6, type_name, &mut out);
        }
        if let Some(index) = self.oneof_index {
            put_varint(9, index, &mut out);
        }
        out
    }
}

fn message_type(name: &str, fields: &[Field], oneofs: &[&str]) -> Vec<u8> {
    let mut out = Vec::new();
    put_str(1, name, &mut out);
    for field in fields {
        put_bytes(2, &field.encode(), &mut out);
    }
    for oneof in oneofs {
        let mut decl = Vec::new();
        put_str(1, oneof, &mut decl);
        put_bytes(8, &decl, &mut out);
    }
    out
}

struct FileBuilder {
    out: Vec<u8>,
}

impl FileBuilder {
    fn new(name: &str, package: &str) -> Self {
        let mut out = Vec::new();
        put_str(1, name, &mut out);
        put_str(2, package, &mut out);
        Self { out }
    }

    fn dependency(mut self, name: &str) -> Self {
        put_str(3, name, &mut self.out);
        self
    }

    fn message(mut self, encoded: &[u8]) -> Self {
        put_bytes(4, encoded, &mut self.out);
        self
    }

    fn service(mut self, encoded: &[u8]) -> Self {
        put_bytes(6, encoded, &mut self.out);
        self
    }

    fn extension(mut self, field: &Field, extendee: &str) -> Self {
        let mut encoded = field.encode();
        put_str(2, extendee, &mut encoded);
        put_bytes(7, &encoded, &mut self.out);
        self
    }

    fn proto3(mut self) -> Self {
        put_str(12, "proto3", &mut self.out);
        self
    }

    fn build(self) -> Vec<u8> {
        self.out
    }
}

fn method(name: &str, input: &str, output: &str, options: Option<&[u8]>) -> Vec<u8> {
    let mut out = Vec::new();
    put_str(1, name, &mut out);
    put_str(2, input, &mut out);
    put_str(3, output, &mut out);
    if let Some(options) = options {
        put_bytes(4, options, &mut out);
    }
    out
}

fn service(name: &str, methods: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    put_str(1, name, &mut out);
    for m in methods {
        put_bytes(2, m, &mut out);
    }
    out
}

// ---- google.api fixture files ---------------------------------------------

const HTTP_EXTENSION_NUMBER: u32 = 72295728;

/// Minimal descriptor.proto: just MethodOptions with its extension range.
fn descriptor_proto_file() -> Vec<u8> {
    let mut range = Vec::new();
    put_varint(1, 1000, &mut range);
    put_varint(2, 536870912, &mut range);

    let mut message = Vec::new();
    put_str(1, "MethodOptions", &mut message);
    put_bytes(5, &range, &mut message);

    FileBuilder::new("google/protobuf/descriptor.proto", "google.protobuf")
        .message(&message)
        .build()
}

fn http_proto_file() -> Vec<u8> {
    let http_rule = message_type(
        "HttpRule",
        &[
            Field::string("selector", 1),
            Field::string("get", 2).in_pattern_oneof(),
            Field::string("put", 3).in_pattern_oneof(),
            Field::string("post", 4).in_pattern_oneof(),
            Field::string("delete", 5).in_pattern_oneof(),
            Field::string("patch", 6).in_pattern_oneof(),
            Field::string("body", 7),
            Field::message("custom", 8, ".google.api.CustomHttpPattern").in_pattern_oneof(),
            Field::message("additional_bindings", 11, ".google.api.HttpRule").repeated(),
            Field::string("response_body", 12),
        ],
        &["pattern"],
    );
    let custom_pattern = message_type(
        "CustomHttpPattern",
        &[Field::string("kind", 1), Field::string("path", 2)],
        &[],
    );

    FileBuilder::new("google/api/http.proto", "google.api")
        .message(&http_rule)
        .message(&custom_pattern)
        .proto3()
        .build()
}

fn annotations_proto_file() -> Vec<u8> {
    FileBuilder::new("google/api/annotations.proto", "google.api")
        .dependency("google/api/http.proto")
        .dependency("google/protobuf/descriptor.proto")
        .extension(
            &Field::message("http", HTTP_EXTENSION_NUMBER as u64, ".google.api.HttpRule"),
            ".google.protobuf.MethodOptions",
        )
        .proto3()
        .build()
}

/// Encoded `google.api.HttpRule` with one pattern and an optional body.
fn http_rule_bytes(pattern_field: u32, path: &str, body: &str, additional: &[Vec<u8>]) -> Vec<u8> {
    let mut rule = Vec::new();
    put_str(pattern_field, path, &mut rule);
    if !body.is_empty() {
        put_str(7, body, &mut rule);
    }
    for binding in additional {
        put_bytes(11, binding, &mut rule);
    }
    rule
}

fn method_options(rule: &[u8]) -> Vec<u8> {
    let mut options = Vec::new();
    put_bytes(HTTP_EXTENSION_NUMBER, rule, &mut options);
    options
}

// ---- fixture descriptor sets ----------------------------------------------

fn file_descriptor_set(files: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    for file in files {
        put_bytes(1, file, &mut out);
    }
    out
}

/// A user service with:
/// - `GetUser`: `GET /v1/users/{id}` plus an additional binding
///   `GET /internal/users/{id}`
/// - `CreateUser`: `POST /v1/users` with `body: "*"`
pub fn user_descriptor_set() -> Vec<u8> {
    let get_user_rule = http_rule_bytes(
        2,
        "/v1/users/{id}",
        "",
        &[http_rule_bytes(2, "/internal/users/{id}", "", &[])],
    );
    let create_user_rule = http_rule_bytes(4, "/v1/users", "*", &[]);

    let user_file = FileBuilder::new("sample/user.proto", "sample.user")
        .dependency("google/api/annotations.proto")
        .message(&message_type(
            "GetUserRequest",
            &[Field::string("id", 1)],
            &[],
        ))
        .message(&message_type(
            "CreateUserRequest",
            &[
                Field::string("name", 1),
                Field::int32("age", 2),
                Field::string("source", 3),
            ],
            &[],
        ))
        .message(&message_type(
            "User",
            &[
                Field::string("id", 1),
                Field::string("name", 2),
                Field::int32("age", 3),
            ],
            &[],
        ))
        .service(&service(
            "UserService",
            &[
                method(
                    "GetUser",
                    ".sample.user.GetUserRequest",
                    ".sample.user.User",
                    Some(&method_options(&get_user_rule)),
                ),
                method(
                    "CreateUser",
                    ".sample.user.CreateUserRequest",
                    ".sample.user.User",
                    Some(&method_options(&create_user_rule)),
                ),
            ],
        ))
        .proto3()
        .build();

    file_descriptor_set(&[
        descriptor_proto_file(),
        http_proto_file(),
        annotations_proto_file(),
        user_file,
    ])
}

/// A ping service claiming `GET /v1/ping`, parameterized by package so two
/// distinct services can claim the same path.
pub fn ping_descriptor_set(package: &'static str) -> Vec<u8> {
    let ping_rule = http_rule_bytes(2, "/v1/ping", "", &[]);

    let file_name = format!("sample/{}.proto", package.replace('.', "_"));
    let ping_file = FileBuilder::new(&file_name, package)
        .dependency("google/api/annotations.proto")
        .message(&message_type("PingRequest", &[], &[]))
        .message(&message_type(
            "PingReply",
            &[Field::string("message", 1)],
            &[],
        ))
        .service(&service(
            "PingService",
            &[method(
                "Ping",
                &format!(".{package}.PingRequest"),
                &format!(".{package}.PingReply"),
                Some(&method_options(&ping_rule)),
            )],
        ))
        .proto3()
        .build();

    file_descriptor_set(&[
        descriptor_proto_file(),
        http_proto_file(),
        annotations_proto_file(),
        ping_file,
    ])
}

// ---- discovery fixtures ---------------------------------------------------

pub fn service_info(name: &str, descriptor_set: &[u8], addrs: &[&str]) -> ServiceInfo {
    let descriptors =
        DescriptorPool::decode(descriptor_set).expect("fixture descriptor set must decode");
    ServiceInfo {
        metadata: ServiceMetadata {
            service_name: name.to_string(),
            version: "1.0".to_string(),
            labels: HashMap::new(),
            descriptor_bytes: descriptor_set.to_vec(),
            descriptors,
        },
        instances: addrs
            .iter()
            .map(|addr| ServiceInstance::parse(addr).expect("fixture instance address"))
            .collect(),
    }
}
