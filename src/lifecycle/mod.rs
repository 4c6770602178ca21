//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Verb invocation:
//!     Shutdown::new() → root token → resolver, filters, discovery, tasks
//!
//! Signals (signals.rs):
//!     SIGINT/SIGTERM → Shutdown::trigger → every child token cancelled
//!
//! Server (server::supervisor):
//!     token cancelled → stop accepting → drain in-flight RPCs → cleanup
//! ```
//!
//! # Design Decisions
//! - One cancellation tree per invocation; no global state
//! - Deadlines are child tokens cancelled by a timer

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
