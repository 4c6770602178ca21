//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events with structured fields
//!
//! log config (enabled, path, verbose) + RUST_LOG
//!     → logging.rs (Dispatch: none | JSON@info | console@debug)
//!     → log file (appended) or standard error
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Logging is off unless `log.enabled`

pub mod logging;

pub use logging::Logger;
