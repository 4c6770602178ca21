//! OS signal handling.
//!
//! # Responsibilities
//! - Wait for SIGINT (Ctrl-C, or `runme server stop`) and SIGTERM
//! - Translate the first one into a shutdown trigger
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Handlers are registered before `install` returns; a signal delivered
//!   any time after that is a shutdown trigger, never the default action
//! - A second signal is not special-cased; the RPC server's drain is bounded
//!   by in-flight requests only

use tokio::signal::unix::{signal, Signal, SignalKind};

use crate::lifecycle::Shutdown;

/// Registered SIGINT and SIGTERM streams.
pub struct Signals {
    interrupt: Signal,
    terminate: Signal,
}

impl Signals {
    /// Register the handlers. Must be called inside a Tokio runtime.
    pub fn register() -> std::io::Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    /// Resolves on the next SIGINT or SIGTERM.
    pub async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        }
    }
}

/// Register handlers now and trigger `shutdown` on the first signal.
pub fn install(shutdown: Shutdown) -> std::io::Result<()> {
    let mut signals = Signals::register()?;
    tokio::spawn(async move {
        let name = signals.recv().await;
        tracing::info!(signal = name, "Signal received, shutting down");
        shutdown.trigger();
    });
    Ok(())
}
