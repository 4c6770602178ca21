//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! server.address
//!     → address.rs (host:port | unix://<path>, PID file location)
//!     → listener.rs (TCP or filesystem socket, existing path rejected)
//!
//! server.tls.{cert_file,key_file}
//!     → tls.rs (load → fresh? → reuse | regenerate)
//!     → ServerTlsConfig / ClientTlsConfig (mutual TLS)
//! ```
//!
//! # Design Decisions
//! - TLS is optional; plaintext when `server.tls.enabled = false`
//! - One self-signed pair authenticates both ends

pub mod address;
pub mod listener;
pub mod tls;

pub use address::{ServerAddress, PID_FILE_NAME, UNIX_SCHEME};
pub use listener::{BoundListener, ListenerError};
pub use tls::{load_client, load_or_generate, load_server, Generator, TlsError, TlsMaterial};
