//! Server address parsing.
//!
//! Two shapes are accepted: `unix://<path>` for a filesystem socket and
//! `host:port` for TCP.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Prefix that selects a filesystem socket.
pub const UNIX_SCHEME: &str = "unix://";

/// Name of the PID file written next to a filesystem socket.
pub const PID_FILE_NAME: &str = "runme.pid";

/// A parsed `server.address`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerAddress {
    /// `host:port`, kept verbatim so hostnames resolve at bind time.
    Tcp { host: String, port: u16 },
    /// Filesystem socket path.
    Unix(PathBuf),
}

/// Why an address string was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    EmptySocketPath,
    MissingPort,
    EmptyHost,
    InvalidPort(String),
}

impl fmt::Display for AddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressError::EmptySocketPath => write!(f, "socket path is empty"),
            AddressError::MissingPort => write!(f, "expected host:port or unix://<path>"),
            AddressError::EmptyHost => write!(f, "host is empty"),
            AddressError::InvalidPort(p) => write!(f, "invalid port {:?}", p),
        }
    }
}

impl std::error::Error for AddressError {}

impl FromStr for ServerAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(path) = s.strip_prefix(UNIX_SCHEME) {
            if path.is_empty() {
                return Err(AddressError::EmptySocketPath);
            }
            return Ok(ServerAddress::Unix(PathBuf::from(path)));
        }

        let (host, port) = s.rsplit_once(':').ok_or(AddressError::MissingPort)?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(AddressError::EmptyHost);
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| AddressError::InvalidPort(port.to_string()))?;

        Ok(ServerAddress::Tcp {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerAddress::Tcp { host, port } if host.contains(':') => write!(f, "[{}]:{}", host, port),
            ServerAddress::Tcp { host, port } => write!(f, "{}:{}", host, port),
            ServerAddress::Unix(path) => write!(f, "{}{}", UNIX_SCHEME, path.display()),
        }
    }
}

impl ServerAddress {
    /// Socket path for `unix://` addresses.
    pub fn socket_path(&self) -> Option<&Path> {
        match self {
            ServerAddress::Unix(path) => Some(path),
            ServerAddress::Tcp { .. } => None,
        }
    }

    /// Location of the PID file for `unix://` addresses.
    pub fn pid_file_path(&self) -> Option<PathBuf> {
        self.socket_path().map(|socket| {
            socket
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(PID_FILE_NAME)
        })
    }
}
