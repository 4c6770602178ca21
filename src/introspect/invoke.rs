//! Dynamic RPC invocation.
//!
//! Requests are read as a stream of JSON values, converted to
//! [`DynamicMessage`]s using reflected descriptors, and sent over the
//! call shape the method declares. Responses are printed as JSON with
//! default-valued fields included.

use std::fmt;
use std::io::Write;

use prost_reflect::{DeserializeOptions, DynamicMessage, MessageDescriptor, MethodDescriptor, SerializeOptions};
use tonic::codegen::http::uri::PathAndQuery;
use tonic::metadata::{MetadataMap, MetadataValue};
use tonic::transport::Channel;
use tonic::{Request, Status, Streaming};

use super::codec::DynamicCodec;
use super::{RpcError, SESSION_METADATA_KEY, SESSION_STRATEGY_METADATA_KEY};

/// How the server should pick a session when none is named.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SessionStrategy {
    Manual,
    Recent,
}

impl SessionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStrategy::Manual => "manual",
            SessionStrategy::Recent => "recent",
        }
    }
}

/// Session selectors sent as request metadata.
#[derive(Debug, Clone, Default)]
pub struct SessionSelector {
    pub session: Option<String>,
    pub strategy: Option<SessionStrategy>,
}

impl SessionSelector {
    fn apply(&self, metadata: &mut MetadataMap) -> Result<(), RpcError> {
        if let Some(session) = self.session.as_deref().filter(|s| !s.is_empty()) {
            let value = MetadataValue::try_from(session)
                .map_err(|_| RpcError::Input(format!("invalid session id {:?}", session)))?;
            metadata.insert(SESSION_METADATA_KEY, value);
        }
        if let Some(strategy) = self.strategy {
            metadata.insert(
                SESSION_STRATEGY_METADATA_KEY,
                MetadataValue::from_static(strategy.as_str()),
            );
        }
        Ok(())
    }
}

/// Counts and final status of one invocation.
#[derive(Debug)]
pub struct InvokeOutcome {
    pub sent: usize,
    pub received: usize,
    pub status: Option<Status>,
}

impl InvokeOutcome {
    pub fn is_success(&self) -> bool {
        self.status.is_none()
    }

    /// The status block printed after a failed call.
    pub fn error_report(&self) -> Option<String> {
        self.status.as_ref().map(|status| {
            format!(
                "ERROR:\n  Code: {:?}\n  Message: {}",
                status.code(),
                status.message()
            )
        })
    }
}

impl fmt::Display for InvokeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let noun = |n: usize, one: &'static str, many: &'static str| if n == 1 { one } else { many };
        write!(
            f,
            "Sent {} {} and received {} {}",
            self.sent,
            noun(self.sent, "request", "requests"),
            self.received,
            noun(self.received, "response", "responses")
        )
    }
}

/// Decode a whitespace-separated stream of JSON objects as `descriptor`.
///
/// Unknown fields are ignored.
pub fn parse_requests(
    descriptor: &MessageDescriptor,
    data: &str,
) -> Result<Vec<DynamicMessage>, RpcError> {
    let options = DeserializeOptions::new().deny_unknown_fields(false);
    serde_json::Deserializer::from_str(data)
        .into_iter::<serde_json::Value>()
        .map(|value| {
            let value = value.map_err(|e| RpcError::Input(e.to_string()))?;
            DynamicMessage::deserialize_with_options(descriptor.clone(), value, &options)
                .map_err(|e| RpcError::Input(e.to_string()))
        })
        .collect()
}

/// Render a response as pretty JSON, defaults included.
pub fn format_response(message: &DynamicMessage) -> Result<String, RpcError> {
    let options = SerializeOptions::new().skip_default_fields(false);
    let mut buf = Vec::new();
    let mut serializer = serde_json::Serializer::pretty(&mut buf);
    message
        .serialize_with_options(&mut serializer, &options)
        .map_err(|e| RpcError::Reflection(format!("failed to render response: {}", e)))?;
    String::from_utf8(buf).map_err(|e| RpcError::Reflection(e.to_string()))
}

/// Invoke `method` over `channel`, writing each response to `out` as it
/// arrives.
///
/// RPC failures are reported through [`InvokeOutcome::status`]; only
/// local problems (bad input, output errors, a dead channel) are `Err`.
pub async fn invoke<W: Write>(
    channel: Channel,
    method: &MethodDescriptor,
    data: &str,
    session: &SessionSelector,
    max_message_size: usize,
    out: &mut W,
) -> Result<InvokeOutcome, RpcError> {
    let mut requests = parse_requests(&method.input(), data)?;
    let client_streaming = method.is_client_streaming();
    if !client_streaming {
        match requests.len() {
            0 => requests.push(DynamicMessage::new(method.input())),
            1 => {}
            n => {
                return Err(RpcError::Input(format!(
                    "method {} is not client-streaming but {} requests were given",
                    method.full_name(),
                    n
                )))
            }
        }
    }
    let sent = requests.len();

    let path = format!("/{}/{}", method.parent_service().full_name(), method.name());
    let path = PathAndQuery::try_from(path)
        .map_err(|e| RpcError::Input(format!("invalid method path: {}", e)))?;
    let codec = DynamicCodec::new(method.output());

    let mut grpc = tonic::client::Grpc::new(channel)
        .max_decoding_message_size(max_message_size)
        .max_encoding_message_size(max_message_size);
    grpc.ready().await.map_err(|e| RpcError::Dial {
        address: path.to_string(),
        message: e.to_string(),
    })?;

    tracing::debug!(method = %method.full_name(), requests = sent, "Invoking method");

    let mut received = 0;
    let status = match (client_streaming, method.is_server_streaming()) {
        (false, false) => {
            let request = single_request(requests, session)?;
            match grpc.unary(request, path, codec).await {
                Ok(response) => {
                    write_response(out, response.get_ref())?;
                    received += 1;
                    None
                }
                Err(status) => Some(status),
            }
        }
        (true, false) => {
            let request = streaming_request(requests, session)?;
            match grpc.client_streaming(request, path, codec).await {
                Ok(response) => {
                    write_response(out, response.get_ref())?;
                    received += 1;
                    None
                }
                Err(status) => Some(status),
            }
        }
        (false, true) => {
            let request = single_request(requests, session)?;
            match grpc.server_streaming(request, path, codec).await {
                Ok(response) => drain(response.into_inner(), out, &mut received).await?,
                Err(status) => Some(status),
            }
        }
        (true, true) => {
            let request = streaming_request(requests, session)?;
            match grpc.streaming(request, path, codec).await {
                Ok(response) => drain(response.into_inner(), out, &mut received).await?,
                Err(status) => Some(status),
            }
        }
    };

    Ok(InvokeOutcome {
        sent,
        received,
        status,
    })
}

fn single_request(
    mut requests: Vec<DynamicMessage>,
    session: &SessionSelector,
) -> Result<Request<DynamicMessage>, RpcError> {
    let message = requests
        .pop()
        .ok_or_else(|| RpcError::Input("no request message".into()))?;
    let mut request = Request::new(message);
    session.apply(request.metadata_mut())?;
    Ok(request)
}

fn streaming_request(
    requests: Vec<DynamicMessage>,
    session: &SessionSelector,
) -> Result<Request<tokio_stream::Iter<std::vec::IntoIter<DynamicMessage>>>, RpcError> {
    let mut request = Request::new(tokio_stream::iter(requests));
    session.apply(request.metadata_mut())?;
    Ok(request)
}

async fn drain<W: Write>(
    mut stream: Streaming<DynamicMessage>,
    out: &mut W,
    received: &mut usize,
) -> Result<Option<Status>, RpcError> {
    loop {
        match stream.message().await {
            Ok(Some(message)) => {
                write_response(out, &message)?;
                *received += 1;
            }
            Ok(None) => return Ok(None),
            Err(status) => return Ok(Some(status)),
        }
    }
}

fn write_response<W: Write>(out: &mut W, message: &DynamicMessage) -> Result<(), RpcError> {
    writeln!(out, "{}", format_response(message)?)?;
    Ok(())
}
