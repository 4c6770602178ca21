//! Crate-wide error type.
//!
//! Each subsystem owns a dedicated error enum; [`Error`] unifies them for
//! the verbs and maps every variant onto an [`ErrorKind`].
//!
//! # Design Decisions
//! - Call sites add context, they never replace the cause
//! - Only the resolver wraps errors (with the component being built);
//!   [`Error::root_cause`] strips that wrapping before reporting

use std::fmt;

use thiserror::Error;

use crate::config::ConfigError;
use crate::filter::FilterError;
use crate::introspect::RpcError;
use crate::net::listener::ListenerError;
use crate::net::tls::TlsError;
use crate::project::ProjectError;
use crate::resolver::Component;

/// Coarse classification of failures, independent of the concrete type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ConfigNotFound,
    SchemaViolation,
    PathEscape,
    FilterCompile,
    FilterRuntime,
    TlsMaterial,
    BindFailure,
    RpcFailure,
    Cancelled,
    Io,
    Dependency,
    Task,
    Usage,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::ConfigNotFound => "config not found",
            ErrorKind::SchemaViolation => "schema violation",
            ErrorKind::PathEscape => "path escape",
            ErrorKind::FilterCompile => "filter compile",
            ErrorKind::FilterRuntime => "filter runtime",
            ErrorKind::TlsMaterial => "tls material",
            ErrorKind::BindFailure => "bind failure",
            ErrorKind::RpcFailure => "rpc failure",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Io => "io",
            ErrorKind::Dependency => "dependency",
            ErrorKind::Task => "task",
            ErrorKind::Usage => "usage",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by verbs.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Project(#[from] ProjectError),

    /// The ambient cancellation token fired.
    #[error("operation cancelled")]
    Cancelled,

    /// A provider failed while the resolver was building `component`.
    #[error("failed to resolve {component}: {source}")]
    Resolve {
        component: Component,
        #[source]
        source: Box<Error>,
    },

    /// The provider graph contains a cycle.
    #[error("dependency cycle: {0}")]
    Cycle(String),

    /// No provider is registered for a requested component.
    #[error("no provider registered for {0}")]
    MissingProvider(Component),

    /// A component was requested as a different type than its provider built.
    #[error("{0} was resolved with an unexpected type")]
    TypeMismatch(Component),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// A task exited unsuccessfully.
    #[error("task {name:?} failed: {reason}")]
    Task { name: String, reason: String },

    /// The invocation was well-formed but cannot be carried out.
    #[error("{0}")]
    Usage(String),
}

impl Error {
    /// Wrap an I/O error with a short description of the failed action.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }

    /// Strip resolver wrapping, returning the error that actually failed.
    pub fn root_cause(self) -> Error {
        let mut current = self;
        loop {
            match current {
                Error::Resolve { source, .. } => current = *source,
                other => return other,
            }
        }
    }

    /// Taxonomy bucket of this error (looking through resolver wrapping).
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(e) => e.kind(),
            Error::Filter(e) => e.kind(),
            Error::Tls(_) => ErrorKind::TlsMaterial,
            Error::Listener(_) => ErrorKind::BindFailure,
            Error::Rpc(e) => e.kind(),
            Error::Project(e) => e.kind(),
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Resolve { source, .. } => source.kind(),
            Error::Cycle(_) | Error::MissingProvider(_) | Error::TypeMismatch(_) => {
                ErrorKind::Dependency
            }
            Error::Io { .. } => ErrorKind::Io,
            Error::Task { .. } => ErrorKind::Task,
            Error::Usage(_) => ErrorKind::Usage,
        }
    }
}

/// Result alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
