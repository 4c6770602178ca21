//! RPC supervisor: binds, serves, and tears down the gRPC endpoint.
//!
//! # Responsibilities
//! - Load or generate TLS material before any listener is bound
//! - Bind TCP or filesystem-socket listeners
//! - Serve hosted services plus health and reflection
//! - Write the PID file next to a filesystem socket; clean up on exit
//!
//! # Data Flow
//! ```text
//! Init ──bind()──▶ Bound ──serve()──▶ Serving ──token cancelled──▶ ShuttingDown ──▶ Done
//!        │ TLS load/generate           │ health = SERVING           │ drain in-flight RPCs
//!        │ listener bind               │ reflection                 │ PID file removed (if ours)
//!        │ PID file write              │ hosted services            │ socket removed
//! ```
//!
//! # Design Decisions
//! - State transitions are published on a watch channel
//! - The socket file is owned by a guard so every exit path removes it
//! - Message size limits are applied per service (tonic has no global limit)

use std::fmt;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::watch;
use tokio_stream::wrappers::{TcpListenerStream, UnixListenerStream};
use tokio_util::sync::CancellationToken;
use tonic::service::RoutesBuilder;
use tonic::transport::Server;
use tonic_health::ServingStatus;

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::net::tls::{load_or_generate_at, Generator, TlsError, TlsMaterial};
use crate::net::{BoundListener, ListenerError, ServerAddress};
use crate::server::hosted::HostedService;
use crate::server::pid_file::PidFile;

/// Lifecycle state of a supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Init,
    Bound,
    Serving,
    ShuttingDown,
    Done,
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SupervisorState::Init => "init",
            SupervisorState::Bound => "bound",
            SupervisorState::Serving => "serving",
            SupervisorState::ShuttingDown => "shutting_down",
            SupervisorState::Done => "done",
        };
        f.write_str(name)
    }
}

/// An unstarted RPC server.
pub struct Supervisor {
    config: ServerConfig,
    services: Vec<Arc<dyn HostedService>>,
    generator: Generator,
    state: Arc<watch::Sender<SupervisorState>>,
}

impl fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("address", &self.config.address)
            .field("tls", &self.config.tls.enabled)
            .field("services", &self.services.len())
            .field("state", &*self.state.borrow())
            .finish()
    }
}

impl Supervisor {
    pub fn new(config: ServerConfig) -> Self {
        let (state, _) = watch::channel(SupervisorState::Init);
        Self {
            config,
            services: Vec::new(),
            generator: Generator::default(),
            state: Arc::new(state),
        }
    }

    pub fn with_service(mut self, service: Arc<dyn HostedService>) -> Self {
        self.services.push(service);
        self
    }

    /// Use `generator` when TLS material has to be (re)generated.
    pub fn with_generator(mut self, generator: Generator) -> Self {
        self.generator = generator;
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn state(&self) -> watch::Receiver<SupervisorState> {
        self.state.subscribe()
    }

    /// Prepare TLS material and bind the listener.
    pub async fn bind(&self) -> Result<BoundSupervisor> {
        let address: ServerAddress =
            self.config
                .address
                .parse()
                .map_err(|e: crate::net::address::AddressError| ListenerError::InvalidAddress {
                    address: self.config.address.clone(),
                    reason: e.to_string(),
                })?;

        let tls = if self.config.tls.enabled {
            Some(self.load_tls().await?)
        } else {
            None
        };

        let listener = BoundListener::bind(&address).await?;
        let socket_guard = listener.socket_path().map(|p| SocketGuard(p.to_path_buf()));

        let pid_file = match PidFile::for_address(&address) {
            Some(pid_file) => {
                pid_file.write(process::id()).map_err(|e| {
                    Error::io(
                        format!("failed to write PID file {}", pid_file.path().display()),
                        e,
                    )
                })?;
                tracing::debug!(path = %pid_file.path().display(), pid = process::id(), "PID file written");
                Some(pid_file)
            }
            None => None,
        };

        self.state.send_replace(SupervisorState::Bound);

        Ok(BoundSupervisor {
            listener,
            tls,
            pid_file,
            socket_guard,
            services: self.services.clone(),
            max_message_size: self.config.max_message_size,
            state: self.state.clone(),
        })
    }

    async fn load_tls(&self) -> Result<TlsMaterial> {
        let (cert_file, key_file) = match (&self.config.tls.cert_file, &self.config.tls.key_file) {
            (Some(cert), Some(key)) => (cert.clone(), key.clone()),
            _ => {
                return Err(Error::Usage(
                    "server.tls is enabled but cert_file/key_file are not set".into(),
                ))
            }
        };

        let generator = self.generator;
        let material = tokio::task::spawn_blocking(move || {
            load_or_generate_at(&cert_file, &key_file, OffsetDateTime::now_utc(), &generator)
        })
        .await
        .map_err(|e| TlsError::Generate(e.to_string()))??;
        Ok(material)
    }
}

/// A supervisor with its listener bound, ready to serve.
pub struct BoundSupervisor {
    listener: BoundListener,
    tls: Option<TlsMaterial>,
    pid_file: Option<PidFile>,
    socket_guard: Option<SocketGuard>,
    services: Vec<Arc<dyn HostedService>>,
    max_message_size: usize,
    state: Arc<watch::Sender<SupervisorState>>,
}

impl BoundSupervisor {
    pub fn local_address(&self) -> ServerAddress {
        self.listener.local_address()
    }

    pub fn tls(&self) -> Option<&TlsMaterial> {
        self.tls.as_ref()
    }

    pub fn pid_file(&self) -> Option<&PidFile> {
        self.pid_file.as_ref()
    }

    /// Serve until `shutdown` is cancelled, then drain and clean up.
    pub async fn serve(self, shutdown: CancellationToken) -> Result<()> {
        let address = self.listener.local_address();
        let BoundSupervisor {
            listener,
            tls,
            pid_file,
            socket_guard,
            services,
            max_message_size,
            state,
        } = self;

        let result = if shutdown.is_cancelled() {
            tracing::info!(address = %address, "Shutdown requested before serving");
            drop(listener);
            Ok(())
        } else {
            serve_routes(
                listener,
                tls.as_ref(),
                &services,
                max_message_size,
                &address,
                state.clone(),
                shutdown,
            )
            .await
        };

        if let Some(pid_file) = &pid_file {
            match pid_file.remove_if_owned(process::id()) {
                Ok(true) => tracing::debug!(path = %pid_file.path().display(), "PID file removed"),
                Ok(false) => {}
                Err(e) => tracing::warn!(
                    path = %pid_file.path().display(),
                    error = %e,
                    "Failed to remove PID file"
                ),
            }
        }
        drop(socket_guard);

        state.send_replace(SupervisorState::Done);
        tracing::info!(address = %address, "Server stopped");
        result
    }
}

async fn serve_routes(
    listener: BoundListener,
    tls: Option<&TlsMaterial>,
    services: &[Arc<dyn HostedService>],
    max_message_size: usize,
    address: &ServerAddress,
    state: Arc<watch::Sender<SupervisorState>>,
    shutdown: CancellationToken,
) -> Result<()> {
    let (mut reporter, health) = tonic_health::server::health_reporter();
    reporter.set_service_status("", ServingStatus::Serving).await;

    let mut routes = RoutesBuilder::default();
    routes.add_service(
        health
            .max_decoding_message_size(max_message_size)
            .max_encoding_message_size(max_message_size),
    );

    // The reflection service describes itself by default.
    let mut reflection = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(tonic_health::pb::FILE_DESCRIPTOR_SET);

    for service in services {
        if let Some(descriptors) = service.file_descriptor_set() {
            reflection = reflection.register_encoded_file_descriptor_set(descriptors);
        }
        service.register(&mut routes, max_message_size);
        reporter
            .set_service_status(service.name(), ServingStatus::Serving)
            .await;
        tracing::debug!(service = service.name(), "Service registered");
    }

    let reflection = reflection.build_v1().map_err(serve_error)?;
    routes.add_service(
        reflection
            .max_decoding_message_size(max_message_size)
            .max_encoding_message_size(max_message_size),
    );

    let mut builder = Server::builder();
    if let Some(tls) = tls {
        builder = builder
            .tls_config(tls.server_tls_config())
            .map_err(serve_error)?;
    }
    let router = builder.add_routes(routes.routes());

    let shutdown_state = state.clone();
    let signal = async move {
        shutdown.cancelled().await;
        shutdown_state.send_replace(SupervisorState::ShuttingDown);
        tracing::info!("Shutting down server, draining in-flight requests");
    };

    state.send_replace(SupervisorState::Serving);
    tracing::info!(
        address = %address,
        tls = tls.is_some(),
        max_message_size = max_message_size,
        "Server listening"
    );

    let served = match listener {
        BoundListener::Tcp(listener) => {
            router
                .serve_with_incoming_shutdown(TcpListenerStream::new(listener), signal)
                .await
        }
        BoundListener::Unix { listener, .. } => {
            router
                .serve_with_incoming_shutdown(UnixListenerStream::new(listener), signal)
                .await
        }
    };
    served.map_err(serve_error)
}

fn serve_error(e: impl fmt::Display) -> Error {
    Error::from(ListenerError::Serve(e.to_string()))
}

/// Removes the filesystem socket when dropped.
struct SocketGuard(PathBuf);

impl Drop for SocketGuard {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.0) {
            Ok(()) => tracing::debug!(path = %self.0.display(), "Socket removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %self.0.display(), error = %e, "Failed to remove socket"),
        }
    }
}

/// Ask the server behind `address` to shut down by sending SIGINT to the
/// process recorded in its PID file. Returns the signalled pid.
pub fn stop(address: &ServerAddress) -> Result<u32> {
    let pid_file = PidFile::for_address(address).ok_or_else(|| {
        Error::Usage(format!(
            "stop requires a unix:// server address, got {}",
            address
        ))
    })?;

    let pid = pid_file
        .read()
        .map_err(|e| Error::io(format!("failed to read {}", pid_file.path().display()), e))?
        .ok_or_else(|| {
            Error::Usage(format!("no PID file at {}", pid_file.path().display()))
        })?;

    let raw = i32::try_from(pid)
        .map_err(|_| Error::Usage(format!("invalid PID {} in {}", pid, pid_file.path().display())))?;
    nix::sys::signal::kill(
        nix::unistd::Pid::from_raw(raw),
        nix::sys::signal::Signal::SIGINT,
    )
    .map_err(|errno| Error::io(format!("failed to signal process {}", pid), errno.into()))?;

    tracing::info!(pid = pid, address = %address, "Sent interrupt to server");
    Ok(pid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TlsConfig;
    use tempfile::TempDir;

    fn plaintext(address: String) -> ServerConfig {
        ServerConfig {
            address,
            tls: TlsConfig {
                enabled: false,
                cert_file: None,
                key_file: None,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_stop_requires_unix_address() {
        let address: ServerAddress = "localhost:7998".parse().unwrap();
        assert!(matches!(stop(&address), Err(Error::Usage(_))));
    }

    #[test]
    fn test_stop_without_pid_file() {
        let dir = TempDir::new().unwrap();
        let address = ServerAddress::Unix(dir.path().join("runme.sock"));
        assert!(matches!(stop(&address), Err(Error::Usage(_))));
    }

    #[tokio::test]
    async fn test_tls_enabled_without_paths() {
        let mut config = plaintext("127.0.0.1:0".into());
        config.tls.enabled = true;
        let err = Supervisor::new(config).bind().await.err().unwrap();
        assert!(matches!(err, Error::Usage(_)));
    }

    #[tokio::test]
    async fn test_unix_lifecycle_cleans_up() {
        let dir = TempDir::new().unwrap();
        let socket = dir.path().join("runme.sock");
        let config = plaintext(format!("unix://{}", socket.display()));

        let supervisor = Supervisor::new(config);
        let mut state = supervisor.state();
        assert_eq!(*state.borrow(), SupervisorState::Init);

        let bound = supervisor.bind().await.unwrap();
        assert_eq!(*state.borrow_and_update(), SupervisorState::Bound);
        assert!(socket.exists());
        let pid_file = bound.pid_file().unwrap().clone();
        assert_eq!(pid_file.read().unwrap(), Some(process::id()));

        let token = CancellationToken::new();
        let handle = tokio::spawn(bound.serve(token.clone()));
        state
            .wait_for(|s| *s == SupervisorState::Serving)
            .await
            .unwrap();

        token.cancel();
        handle.await.unwrap().unwrap();

        assert_eq!(*state.borrow(), SupervisorState::Done);
        assert!(!socket.exists());
        assert!(!pid_file.exists());
    }

    #[tokio::test]
    async fn test_shutdown_before_serve_cleans_up() {
        let dir = TempDir::new().unwrap();
        let socket = dir.path().join("runme.sock");
        let supervisor = Supervisor::new(plaintext(format!("unix://{}", socket.display())));
        let state = supervisor.state();

        let bound = supervisor.bind().await.unwrap();
        let pid_file = bound.pid_file().unwrap().clone();
        assert!(pid_file.exists());

        let token = CancellationToken::new();
        token.cancel();
        bound.serve(token).await.unwrap();

        assert_eq!(*state.borrow(), SupervisorState::Done);
        assert!(!socket.exists());
        assert!(!pid_file.exists());
    }

    #[tokio::test]
    async fn test_existing_socket_is_left_alone() {
        let dir = TempDir::new().unwrap();
        let socket = dir.path().join("runme.sock");
        std::fs::write(&socket, "").unwrap();

        let config = plaintext(format!("unix://{}", socket.display()));
        let err = Supervisor::new(config).bind().await.err().unwrap();
        assert!(matches!(err, Error::Listener(ListenerError::SocketExists(_))));
        assert!(socket.exists());
        assert!(!dir.path().join("runme.pid").exists());
    }
}
