//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use runme::config::{ServerConfig, TlsConfig};
use runme::net::Generator;
use runme::resolver::Component;
use runme::server::{BoundSupervisor, Supervisor, SupervisorState};
use runme::{Resolver, ResolverOptions};

/// A project directory plus an isolated per-user configuration directory.
pub struct Workspace {
    pub project: TempDir,
    pub user: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            project: TempDir::new().unwrap(),
            user: TempDir::new().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.project.path()
    }

    /// Write `contents` to `rel`, creating parent directories.
    pub fn write(&self, rel: &str, contents: &str) -> PathBuf {
        let path = self.root().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
        path
    }

    /// Mark the project root as a git repository.
    pub fn init_git(&self) {
        fs::create_dir_all(self.root().join(".git")).unwrap();
    }

    pub fn resolver(&self, rel_cwd: &str) -> Resolver {
        self.resolver_with(ResolverOptions::new(self.root().join(rel_cwd)))
    }

    pub fn resolver_with(&self, options: ResolverOptions) -> Resolver {
        let mut resolver = Resolver::new(options);
        let user_dir = self.user.path().to_path_buf();
        resolver.provide(Component::UserConfigDir, &[], move |_, _| Ok(user_dir.clone()));
        resolver
    }
}

/// Server config on a socket inside `dir`, TLS off.
pub fn unix_config(dir: &Path) -> ServerConfig {
    ServerConfig {
        address: format!("unix://{}", dir.join("runme.sock").display()),
        tls: TlsConfig {
            enabled: false,
            cert_file: None,
            key_file: None,
        },
        ..Default::default()
    }
}

/// Server config with mutual TLS material kept in `tls_dir`.
pub fn unix_tls_config(dir: &Path, tls_dir: &Path) -> ServerConfig {
    let mut config = unix_config(dir);
    config.tls = TlsConfig {
        enabled: true,
        cert_file: Some(tls_dir.join("cert.pem")),
        key_file: Some(tls_dir.join("key.pem")),
    };
    config
}

/// A server running in the background.
pub struct RunningServer {
    pub address: String,
    pub state: watch::Receiver<SupervisorState>,
    token: CancellationToken,
    handle: JoinHandle<runme::Result<()>>,
}

impl RunningServer {
    pub async fn start(config: ServerConfig) -> Self {
        Self::start_supervisor(Supervisor::new(config)).await
    }

    pub async fn start_supervisor(supervisor: Supervisor) -> Self {
        let supervisor = supervisor.with_generator(Generator::with_key_bits(2048));
        let mut state = supervisor.state();
        let bound: BoundSupervisor = supervisor.bind().await.unwrap();
        let address = bound.local_address().to_string();

        let token = CancellationToken::new();
        let handle = tokio::spawn(bound.serve(token.clone()));
        state
            .wait_for(|s| *s == SupervisorState::Serving)
            .await
            .unwrap();

        Self {
            address,
            state,
            token,
            handle,
        }
    }

    pub async fn stop(self) -> watch::Receiver<SupervisorState> {
        self.token.cancel();
        self.handle.await.unwrap().unwrap();
        self.state
    }
}
