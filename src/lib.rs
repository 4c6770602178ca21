//! runme library.
//!
//! Turns a declarative project configuration into a task-selection
//! pipeline for the `list`, `print` and `run` verbs and into a secured
//! gRPC endpoint for `server start`.
//!
//! # Architecture Overview
//!
//! ```text
//!   runme.yaml chain ──▶ config ──▶ resolver ──┬──▶ project + filter ──▶ list / print / run
//!                                     │         │                              │
//!                                     │         │                              ▼
//!                                     │         │                     runtime (host | docker)
//!                                     │         │
//!                                     │         └──▶ net::tls ──▶ server (health, reflection)
//!                                     │                                ▲
//!                                     └──▶ observability               │
//!                                                             introspect (grpcurl)
//! ```

// Core subsystems
pub mod config;
pub mod filter;
pub mod net;
pub mod resolver;
pub mod server;

// Glue
pub mod introspect;
pub mod project;
pub mod runtime;

// Cross-cutting concerns
pub mod error;
pub mod lifecycle;
pub mod observability;

pub mod cli;

pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use lifecycle::Shutdown;
pub use resolver::{Resolver, ResolverOptions};
