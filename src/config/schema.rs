//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for a project.
//! All types derive Serde traits so the merged document decodes in one pass.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// The only schema version understood by this build.
pub const CONFIG_VERSION: &str = "v1alpha1";

/// Default maximum gRPC message size (32 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 33_554_432;

/// Root of the effective configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Schema tag, always [`CONFIG_VERSION`] once decoded.
    pub version: String,

    /// Where tasks are discovered and how they are selected.
    pub project: ProjectConfig,

    /// Command runtime selection.
    pub runtime: RuntimeConfig,

    /// Background RPC server settings.
    pub server: ServerConfig,

    /// Logger settings.
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION.to_string(),
            project: ProjectConfig::default(),
            runtime: RuntimeConfig::default(),
            server: ServerConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Fill in certificate and key paths under `user_config_dir` when TLS is
    /// enabled and the paths were left out.
    pub fn apply_tls_defaults(&mut self, user_config_dir: &Path) {
        let tls = &mut self.server.tls;
        if !tls.enabled {
            return;
        }
        let dir = default_tls_dir(user_config_dir);
        if tls.cert_file.is_none() {
            tls.cert_file = Some(dir.join("cert.pem"));
        }
        if tls.key_file.is_none() {
            tls.key_file = Some(dir.join("key.pem"));
        }
    }
}

/// Directory holding generated TLS material for a user.
pub fn default_tls_dir(user_config_dir: &Path) -> PathBuf {
    user_config_dir.join("runme").join("tls")
}

/// Project discovery settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Directory tasks are discovered under, relative to the working directory.
    pub root: String,

    /// Single Markdown file to load instead of walking `root`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    /// Ascend from `root` to the enclosing git repository.
    pub find_repo_upward: bool,

    /// Glob patterns excluded from discovery.
    pub ignore: Vec<String>,

    /// Do not honor `.gitignore` files.
    pub disable_gitignore: bool,

    /// Environment composition for executed tasks.
    pub env: EnvConfig,

    /// Declarative filter pipeline, applied in order.
    pub filters: Vec<FilterConfig>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            root: ".".to_string(),
            filename: None,
            find_repo_upward: true,
            ignore: vec!["node_modules".to_string(), ".venv".to_string()],
            disable_gitignore: false,
            env: EnvConfig::default(),
            filters: Vec::new(),
        }
    }
}

/// Environment sources for the session.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EnvConfig {
    /// Start from the process environment.
    pub use_system_env: bool,

    /// Dotenv files, relative to the project root; later files win.
    pub sources: Vec<String>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            use_system_env: false,
            sources: vec![".env".to_string(), ".env.local".to_string()],
        }
    }
}

/// Which environment a filter condition is compiled against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum FilterType {
    #[serde(rename = "FILTER_TYPE_BLOCK", alias = "block", alias = "BLOCK")]
    Block,
    #[serde(rename = "FILTER_TYPE_DOCUMENT", alias = "document", alias = "DOCUMENT")]
    Document,
}

/// A single declarative filter.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FilterConfig {
    #[serde(rename = "type")]
    pub kind: FilterType,

    /// Boolean expression evaluated per task.
    pub condition: String,

    /// Values exposed to the condition as `extra`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Runtime settings.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub docker: DockerConfig,
}

/// Containerized runtime settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DockerConfig {
    pub enabled: bool,

    /// Image tasks run in.
    pub image: String,

    /// How to build `image` when it is missing.
    pub build: DockerBuildConfig,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            image: "runme-runtime:latest".to_string(),
            build: DockerBuildConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DockerBuildConfig {
    pub context: String,
    pub dockerfile: String,
}

impl Default for DockerBuildConfig {
    fn default() -> Self {
        Self {
            context: "./experimental/docker".to_string(),
            dockerfile: "Dockerfile".to_string(),
        }
    }
}

/// RPC server settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// `host:port` or `unix://<path>`.
    pub address: String,

    /// Upper bound for encoded and decoded messages, in bytes.
    pub max_message_size: usize,

    pub tls: TlsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "localhost:7998".to_string(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            tls: TlsConfig::default(),
        }
    }
}

/// TLS settings for the server and the introspection client.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TlsConfig {
    pub enabled: bool,

    /// Path to certificate file (PEM).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert_file: Option<PathBuf>,

    /// Path to private key file (PEM).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_file: Option<PathBuf>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cert_file: None,
            key_file: None,
        }
    }
}

/// Logger settings.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    pub enabled: bool,

    /// Log file; standard error when empty.
    pub path: String,

    /// Console format at debug level instead of JSON at info.
    pub verbose: bool,
}
