//! Listener binding for the RPC supervisor.
//!
//! # Responsibilities
//! - Bind a TCP listener for `host:port` addresses
//! - Bind a filesystem socket for `unix://<path>` addresses
//! - Refuse to reuse an existing socket path
//!
//! # Design Decisions
//! - An existing path is never removed; a stale socket is an operator
//!   decision, not something the supervisor cleans up on its own
//! - The socket file is removed by whoever owns the bound listener
//!   (see `server::supervisor`)

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::net::{TcpListener, UnixListener};

use crate::net::address::ServerAddress;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The socket path is already taken.
    #[error("socket path already exists: {}", .0.display())]
    SocketExists(PathBuf),

    /// Failed to bind to address.
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// `server.address` is neither `host:port` nor `unix://<path>`.
    #[error("invalid server address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    /// The RPC server failed after binding.
    #[error("server error: {0}")]
    Serve(String),
}

/// A bound listener of either transport.
#[derive(Debug)]
pub enum BoundListener {
    Tcp(TcpListener),
    Unix { listener: UnixListener, path: PathBuf },
}

impl BoundListener {
    /// Bind `address`.
    pub async fn bind(address: &ServerAddress) -> Result<Self, ListenerError> {
        let bind_error = |source| ListenerError::Bind {
            address: address.to_string(),
            source,
        };

        let listener = match address {
            ServerAddress::Tcp { host, port } => {
                let listener = TcpListener::bind((host.as_str(), *port))
                    .await
                    .map_err(bind_error)?;
                BoundListener::Tcp(listener)
            }
            ServerAddress::Unix(path) => {
                if path.exists() {
                    return Err(ListenerError::SocketExists(path.clone()));
                }
                let listener = UnixListener::bind(path).map_err(bind_error)?;
                BoundListener::Unix {
                    listener,
                    path: path.clone(),
                }
            }
        };

        tracing::info!(address = %listener.describe(), "Listener bound");
        Ok(listener)
    }

    /// The actual bound address, with the kernel-assigned port for `:0`.
    pub fn local_address(&self) -> ServerAddress {
        match self {
            BoundListener::Tcp(listener) => match listener.local_addr() {
                Ok(addr) => ServerAddress::Tcp {
                    host: addr.ip().to_string(),
                    port: addr.port(),
                },
                Err(_) => ServerAddress::Tcp {
                    host: String::new(),
                    port: 0,
                },
            },
            BoundListener::Unix { path, .. } => ServerAddress::Unix(path.clone()),
        }
    }

    pub fn socket_path(&self) -> Option<&Path> {
        match self {
            BoundListener::Tcp(_) => None,
            BoundListener::Unix { path, .. } => Some(path),
        }
    }

    fn describe(&self) -> String {
        self.local_address().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_bind_tcp_ephemeral_port() {
        let address: ServerAddress = "127.0.0.1:0".parse().unwrap();
        let listener = BoundListener::bind(&address).await.unwrap();
        match listener.local_address() {
            ServerAddress::Tcp { host, port } => {
                assert_eq!(host, "127.0.0.1");
                assert_ne!(port, 0);
            }
            other => panic!("unexpected address {}", other),
        }
        assert!(listener.socket_path().is_none());
    }

    #[tokio::test]
    async fn test_bind_unix_rejects_existing_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("runme.sock");
        let address = ServerAddress::Unix(path.clone());

        let listener = BoundListener::bind(&address).await.unwrap();
        assert_eq!(listener.socket_path(), Some(path.as_path()));
        assert!(path.exists());

        let err = BoundListener::bind(&address).await.unwrap_err();
        assert!(matches!(err, ListenerError::SocketExists(p) if p == path));
    }
}
