//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! runme.yaml chain (root + nested along the working path)
//!     → loader.rs (locate & read, per-item version check)
//!     → merge.rs (deep merge, later files win)
//!     → schema.rs (single decode of the merged mapping)
//!     → validation.rs (semantic checks, all errors collected)
//!     → Config (validated, immutable for the verb invocation)
//!
//! After loading (resolver):
//!     CLI overrides → TLS path defaults → shared via Arc
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; one load per verb invocation
//! - All fields have defaults to allow minimal configs
//! - Unknown keys are ignored so newer files still load
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod merge;
pub mod schema;
pub mod validation;

pub use loader::{parse_chain, parse_yaml, ConfigError, ConfigSource, Loader};
pub use schema::{
    Config, DockerBuildConfig, DockerConfig, EnvConfig, FilterConfig, FilterType, LogConfig,
    ProjectConfig, RuntimeConfig, ServerConfig, TlsConfig, CONFIG_VERSION,
    DEFAULT_MAX_MESSAGE_SIZE,
};
pub use validation::ValidationError;
