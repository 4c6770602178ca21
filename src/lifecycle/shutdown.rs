//! Shutdown coordination.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Coordinator for graceful shutdown.
///
/// Wraps the root cancellation token of a verb invocation. Long-running
/// work subscribes to a child token; triggering cancels every child.
#[derive(Debug, Clone)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// A token cancelled when shutdown is triggered.
    pub fn subscribe(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once shutdown has been triggered.
    pub async fn triggered(&self) {
        self.token.cancelled().await
    }

    /// A child token that is also cancelled after `deadline`.
    pub fn with_deadline(&self, deadline: Duration) -> CancellationToken {
        let child = self.token.child_token();
        let timer = child.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = timer.cancelled() => {}
                _ = tokio::time::sleep(deadline) => {
                    tracing::debug!(deadline_ms = deadline.as_millis() as u64, "Deadline elapsed");
                    timer.cancel();
                }
            }
        });
        child
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
