//! Structured logging.
//!
//! # Responsibilities
//! - Build the logger selected by the `log` config section
//! - Route output to a file (appended) or standard error
//! - Let `RUST_LOG` override the configured level
//!
//! # Design Decisions
//! - Uses the tracing crate; the logger is a `tracing::Dispatch` value so it
//!   can be scoped in tests or installed globally by the binary
//! - JSON format by default, human-readable console format when verbose
//! - Disabled logging is a no-op dispatcher, not a filtered one

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing::Dispatch;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;
use crate::error::{Error, Result};

/// A configured tracing dispatcher.
#[derive(Clone)]
pub struct Logger {
    dispatch: Dispatch,
    enabled: bool,
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger").field("enabled", &self.enabled).finish()
    }
}

impl Logger {
    /// A logger that discards everything.
    pub fn disabled() -> Self {
        Self {
            dispatch: Dispatch::none(),
            enabled: false,
        }
    }

    pub fn from_config(config: &LogConfig) -> Result<Self> {
        if !config.enabled {
            return Ok(Self::disabled());
        }

        let level = if config.verbose { "debug" } else { "info" };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        let to_file = !config.path.is_empty();
        let writer = if to_file {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&config.path)
                .map_err(|e| Error::io(format!("failed to open log file {}", config.path), e))?;
            BoxMakeWriter::new(Mutex::new(file))
        } else {
            BoxMakeWriter::new(std::io::stderr)
        };

        let registry = tracing_subscriber::registry().with(filter);
        let dispatch = if config.verbose {
            Dispatch::new(registry.with(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(!to_file)
                    .with_target(false),
            ))
        } else {
            Dispatch::new(registry.with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_ansi(false),
            ))
        };

        Ok(Self {
            dispatch,
            enabled: true,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// Make this the process-wide default. Returns false if one is already set.
    pub fn install_global(&self) -> bool {
        if !self.enabled {
            return false;
        }
        tracing::dispatcher::set_global_default(self.dispatch.clone()).is_ok()
    }
}
