//! Server reflection (v1) client and descriptor pool assembly.

use std::collections::{BTreeMap, HashSet};

use prost::Message;
use prost_reflect::DescriptorPool;
use prost_types::{FileDescriptorProto, FileDescriptorSet};
use tonic::transport::Channel;
use tonic_reflection::pb::v1::server_reflection_client::ServerReflectionClient;
use tonic_reflection::pb::v1::server_reflection_request::MessageRequest;
use tonic_reflection::pb::v1::server_reflection_response::MessageResponse;
use tonic_reflection::pb::v1::ServerReflectionRequest;

use super::RpcError;

pub struct ReflectionClient {
    inner: ServerReflectionClient<Channel>,
}

impl ReflectionClient {
    pub fn new(channel: Channel, max_message_size: usize) -> Self {
        Self {
            inner: ServerReflectionClient::new(channel)
                .max_decoding_message_size(max_message_size)
                .max_encoding_message_size(max_message_size),
        }
    }

    /// One request, one response, on a fresh reflection stream.
    async fn request(&mut self, request: MessageRequest) -> Result<MessageResponse, RpcError> {
        let request = ServerReflectionRequest {
            host: String::new(),
            message_request: Some(request),
        };
        let mut responses = self
            .inner
            .server_reflection_info(tokio_stream::once(request))
            .await?
            .into_inner();

        let response = responses
            .message()
            .await?
            .and_then(|r| r.message_response)
            .ok_or_else(|| RpcError::Reflection("empty reflection response".into()))?;

        match response {
            MessageResponse::ErrorResponse(e) => Err(RpcError::Reflection(format!(
                "{} (code {})",
                e.error_message, e.error_code
            ))),
            other => Ok(other),
        }
    }

    pub async fn list_services(&mut self) -> Result<Vec<String>, RpcError> {
        match self.request(MessageRequest::ListServices(String::new())).await? {
            MessageResponse::ListServicesResponse(list) => {
                Ok(list.service.into_iter().map(|s| s.name).collect())
            }
            _ => Err(unexpected("list_services")),
        }
    }

    async fn file_containing_symbol(&mut self, symbol: &str) -> Result<Vec<Vec<u8>>, RpcError> {
        let request = MessageRequest::FileContainingSymbol(symbol.to_string());
        match self.request(request).await {
            Ok(MessageResponse::FileDescriptorResponse(files)) => Ok(files.file_descriptor_proto),
            Ok(_) => Err(unexpected("file_containing_symbol")),
            Err(RpcError::Reflection(_)) => Err(RpcError::SymbolNotFound(symbol.to_string())),
            Err(e) => Err(e),
        }
    }

    async fn file_by_filename(&mut self, name: &str) -> Result<Vec<Vec<u8>>, RpcError> {
        match self.request(MessageRequest::FileByFilename(name.to_string())).await? {
            MessageResponse::FileDescriptorResponse(files) => Ok(files.file_descriptor_proto),
            _ => Err(unexpected("file_by_filename")),
        }
    }

    /// Pool holding the file that defines `symbol` and all its imports.
    ///
    /// Nested symbols (fields, enum values, methods) that the server does
    /// not index are looked up through their closest indexed parent.
    pub async fn pool_for_symbol(&mut self, symbol: &str) -> Result<DescriptorPool, RpcError> {
        let mut candidate = symbol;
        let encoded = loop {
            match self.file_containing_symbol(candidate).await {
                Ok(files) => break files,
                Err(RpcError::SymbolNotFound(_)) => match candidate.rsplit_once('.') {
                    Some((parent, _)) => candidate = parent,
                    None => return Err(RpcError::SymbolNotFound(symbol.to_string())),
                },
                Err(e) => return Err(e),
            }
        };

        let mut files = BTreeMap::new();
        decode_into(&mut files, encoded)?;

        // Fetch imports until closed.
        loop {
            let missing: Vec<String> = files
                .values()
                .flat_map(|f: &FileDescriptorProto| f.dependency.iter())
                .filter(|d| !files.contains_key(*d))
                .cloned()
                .collect();
            if missing.is_empty() {
                break;
            }
            for name in missing {
                if files.contains_key(&name) {
                    continue;
                }
                let encoded = self.file_by_filename(&name).await?;
                decode_into(&mut files, encoded)?;
                if !files.contains_key(&name) {
                    return Err(RpcError::Reflection(format!(
                        "server did not return imported file {}",
                        name
                    )));
                }
            }
        }

        build_pool(files)
    }
}

fn unexpected(request: &str) -> RpcError {
    RpcError::Reflection(format!("unexpected response to {}", request))
}

fn decode_into(
    files: &mut BTreeMap<String, FileDescriptorProto>,
    encoded: Vec<Vec<u8>>,
) -> Result<(), RpcError> {
    for bytes in encoded {
        let file = FileDescriptorProto::decode(bytes.as_slice())
            .map_err(|e| RpcError::Reflection(format!("invalid file descriptor: {}", e)))?;
        files.insert(file.name().to_string(), file);
    }
    Ok(())
}

/// Order files so every import precedes its importer, then build the pool.
fn build_pool(mut files: BTreeMap<String, FileDescriptorProto>) -> Result<DescriptorPool, RpcError> {
    let mut ordered = Vec::with_capacity(files.len());
    let mut placed = HashSet::new();
    let names: Vec<String> = files.keys().cloned().collect();
    for name in names {
        place(&name, &mut files, &mut placed, &mut ordered);
    }

    DescriptorPool::from_file_descriptor_set(FileDescriptorSet { file: ordered })
        .map_err(|e| RpcError::Reflection(format!("invalid descriptors: {}", e)))
}

fn place(
    name: &str,
    files: &mut BTreeMap<String, FileDescriptorProto>,
    placed: &mut HashSet<String>,
    ordered: &mut Vec<FileDescriptorProto>,
) {
    if !placed.insert(name.to_string()) {
        return;
    }
    let Some(file) = files.remove(name) else {
        return;
    };
    for dependency in &file.dependency {
        place(dependency, files, placed, ordered);
    }
    ordered.push(file);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, deps: &[&str], message: &str) -> FileDescriptorProto {
        FileDescriptorProto {
            name: Some(name.to_string()),
            package: Some("demo".to_string()),
            dependency: deps.iter().map(|d| d.to_string()).collect(),
            message_type: vec![prost_types::DescriptorProto {
                name: Some(message.to_string()),
                ..Default::default()
            }],
            syntax: Some("proto3".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_build_pool_orders_imports() {
        let mut files = BTreeMap::new();
        // "a.proto" sorts first but imports "b.proto".
        files.insert("a.proto".to_string(), file("a.proto", &["b.proto"], "A"));
        files.insert("b.proto".to_string(), file("b.proto", &[], "B"));

        let pool = build_pool(files).unwrap();
        assert!(pool.get_message_by_name("demo.A").is_some());
        assert!(pool.get_message_by_name("demo.B").is_some());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let mut files = BTreeMap::new();
        let err = decode_into(&mut files, vec![vec![0xff, 0xff, 0xff]]).unwrap_err();
        assert!(matches!(err, RpcError::Reflection(_)));
    }
}
