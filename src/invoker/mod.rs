//! Reflective gRPC invocation.
//!
//! # Responsibilities
//! - Own one multiplexed channel per backend address
//! - Resolve methods by fully-qualified name against the published descriptors
//! - Transcode JSON ⇄ protobuf through `DynamicMessage`
//! - Apply the upstream retry schedule and default call deadline
//!
//! # Design Decisions
//! - Channels connect lazily; construction never touches the network
//! - Response JSON keeps proto field names and emits default fields, so the
//!   envelope is stable across backend versions
//! - Upstream `Status` is returned unchanged; mapping to HTTP is the
//!   pipeline's concern

pub mod codec;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use http::uri::PathAndQuery;
use prost_reflect::{DescriptorPool, DynamicMessage, MethodDescriptor, SerializeOptions};
use thiserror::Error;
use tonic::metadata::MetadataMap;
use tonic::transport::{Channel, Endpoint};
use tonic::Status;
use tracing::debug;

use crate::invoker::codec::DynamicCodec;
use crate::resilience::{is_retryable, retry_backoff, RETRY_MAX_ATTEMPTS};

/// Per-call message cap in either direction.
const MAX_MESSAGE_SIZE: usize = 24 * 1024 * 1024;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);
const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(10);
/// Deadline attached when the caller supplies none.
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Failure modes of invoker construction and invocation.
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("invalid backend address {address}: {source}")]
    BadAddress {
        address: String,
        #[source]
        source: tonic::transport::Error,
    },

    #[error("method {0} not found in service descriptors")]
    MethodNotFound(String),

    #[error("failed to parse request payload: {0}")]
    BadPayload(#[source] serde_json::Error),

    #[error("failed to serialize response: {0}")]
    BadResponse(#[source] serde_json::Error),

    #[error(transparent)]
    Upstream(#[from] Status),
}

/// One gRPC connection plus descriptor source, bound to one backend address.
pub struct GrpcInvoker {
    channel: Channel,
    descriptors: DescriptorPool,
    address: String,
    closed: AtomicBool,
}

impl GrpcInvoker {
    /// Build an invoker for `address` ("host:port", plaintext). The channel
    /// is lazy: the first call performs the actual connect.
    pub fn connect(address: &str, descriptors: DescriptorPool) -> Result<Self, InvokeError> {
        let endpoint = Endpoint::from_shared(format!("http://{address}"))
            .map_err(|source| InvokeError::BadAddress {
                address: address.to_string(),
                source,
            })?
            .connect_timeout(CONNECT_TIMEOUT)
            .http2_keep_alive_interval(KEEPALIVE_INTERVAL)
            .keep_alive_timeout(KEEPALIVE_TIMEOUT)
            .keep_alive_while_idle(false)
            .tcp_nodelay(true);

        Ok(Self {
            channel: endpoint.connect_lazy(),
            descriptors,
            address: address.to_string(),
            closed: AtomicBool::new(false),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Invoke a unary method by fully-qualified name ("pkg.Service/Method")
    /// with a JSON payload. Returns the response as JSON with proto field
    /// names and default fields emitted.
    pub async fn invoke(
        &self,
        full_method: &str,
        payload: &[u8],
        metadata: MetadataMap,
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>, InvokeError> {
        let method = self
            .resolve_method(full_method)
            .ok_or_else(|| InvokeError::MethodNotFound(full_method.to_string()))?;

        let body: &[u8] = if payload.is_empty() { b"{}" } else { payload };
        let mut deserializer = serde_json::Deserializer::from_slice(body);
        let request = DynamicMessage::deserialize(method.input(), &mut deserializer)
            .map_err(InvokeError::BadPayload)?;
        deserializer.end().map_err(InvokeError::BadPayload)?;

        let path: PathAndQuery = format!("/{full_method}")
            .parse()
            .map_err(|_| InvokeError::MethodNotFound(full_method.to_string()))?;
        let codec = DynamicCodec::new(method.output());
        let deadline = timeout.unwrap_or(DEFAULT_CALL_TIMEOUT);

        let mut attempt = 0;
        let response = loop {
            attempt += 1;
            match self
                .dispatch(request.clone(), metadata.clone(), path.clone(), codec.clone(), deadline)
                .await
            {
                Ok(response) => break response,
                Err(status) if attempt < RETRY_MAX_ATTEMPTS && is_retryable(status.code()) => {
                    debug!(
                        method = full_method,
                        address = %self.address,
                        code = ?status.code(),
                        attempt,
                        "Retrying upstream call"
                    );
                    tokio::time::sleep(retry_backoff(attempt)).await;
                }
                Err(status) => return Err(status.into()),
            }
        };

        let mut buf = Vec::new();
        let mut serializer = serde_json::Serializer::new(&mut buf);
        response
            .serialize_with_options(
                &mut serializer,
                &SerializeOptions::new()
                    .skip_default_fields(false)
                    .use_proto_field_name(true),
            )
            .map_err(InvokeError::BadResponse)?;
        Ok(buf)
    }

    async fn dispatch(
        &self,
        request: DynamicMessage,
        metadata: MetadataMap,
        path: PathAndQuery,
        codec: DynamicCodec,
        deadline: Duration,
    ) -> Result<DynamicMessage, Status> {
        let mut grpc = tonic::client::Grpc::new(self.channel.clone())
            .max_decoding_message_size(MAX_MESSAGE_SIZE)
            .max_encoding_message_size(MAX_MESSAGE_SIZE);

        grpc.ready()
            .await
            .map_err(|e| Status::unavailable(format!("connection to {} failed: {e}", self.address)))?;

        let mut request = tonic::Request::new(request);
        *request.metadata_mut() = metadata;
        request.set_timeout(deadline);

        let response = grpc.unary(request, path, codec).await?;
        Ok(response.into_inner())
    }

    fn resolve_method(&self, full_method: &str) -> Option<MethodDescriptor> {
        let (service_name, method_name) = full_method.rsplit_once('/')?;
        self.descriptors
            .services()
            .find(|s| s.full_name() == service_name)?
            .methods()
            .find(|m| m.name() == method_name)
    }

    /// Release the connection. Idempotent; the transport shuts down once the
    /// last channel clone is dropped.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(address = %self.address, "Closing invoker");
        }
    }
}
