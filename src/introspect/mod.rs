//! Introspection client for a running server (`runme server grpcurl`).
//!
//! # Data Flow
//! ```text
//! --server-address / --tls-dir / --insecure
//!     → client.rs (dial TCP or filesystem socket, mutual TLS)
//!     → reflection.rs (ListServices, FileContainingSymbol → DescriptorPool)
//!     → describe.rs (proto-like text + JSON template)
//!     → invoke.rs (JSON in → DynamicMessage → codec.rs → JSON out)
//! ```
//!
//! # Design Decisions
//! - Zero-schema: every descriptor comes from the server's reflection service
//! - Defaults are emitted and unknown input fields tolerated

pub mod client;
pub mod codec;
pub mod describe;
pub mod invoke;
pub mod reflection;

use thiserror::Error;

use crate::error::ErrorKind;
use crate::net::TlsError;

pub use client::{Client, DialOptions};
pub use invoke::{InvokeOutcome, SessionSelector, SessionStrategy};

/// Metadata key carrying the target session id.
pub const SESSION_METADATA_KEY: &str = "runme-session";

/// Metadata key carrying the session selection strategy.
pub const SESSION_STRATEGY_METADATA_KEY: &str = "runme-session-strategy";

/// Errors of the introspection client.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("invalid server address {address:?}: {reason}")]
    Address { address: String, reason: String },

    #[error("failed to connect to {address}: {message}")]
    Dial { address: String, message: String },

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error("reflection failed: {0}")]
    Reflection(String),

    #[error("symbol not found: {0}")]
    SymbolNotFound(String),

    /// Request data could not be turned into messages.
    #[error("invalid request data: {0}")]
    Input(String),

    #[error("rpc failed with code {:?}: {}", .0.code(), .0.message())]
    Status(#[from] tonic::Status),

    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

impl RpcError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RpcError::Tls(_) => ErrorKind::TlsMaterial,
            RpcError::Address { .. } | RpcError::Input(_) | RpcError::SymbolNotFound(_) => {
                ErrorKind::Usage
            }
            RpcError::Output(_) => ErrorKind::Io,
            _ => ErrorKind::RpcFailure,
        }
    }
}
