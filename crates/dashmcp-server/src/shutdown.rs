//! Graceful shutdown coordination via `CancellationToken`.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::session::{SessionEntry, SessionRegistry};

/// What happened to each session during shutdown.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub closed: usize,
    pub failed: usize,
    pub timed_out: usize,
}

impl ShutdownReport {
    pub fn total(&self) -> usize {
        self.closed + self.failed + self.timed_out
    }

    pub fn merge(self, other: Self) -> Self {
        Self {
            closed: self.closed + other.closed,
            failed: self.failed + other.failed,
            timed_out: self.timed_out + other.timed_out,
        }
    }
}

enum CloseOutcome {
    Closed,
    Failed,
    TimedOut,
}

/// Stops background tasks and tears down every live session.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    registry: Arc<SessionRegistry>,
    grace: Duration,
}

impl ShutdownCoordinator {
    pub fn new(registry: Arc<SessionRegistry>, grace: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            registry,
            grace,
        }
    }

    /// Get a clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancel the token, then close all sessions concurrently.
    ///
    /// Each close gets `grace` to finish; one that doesn't is abandoned.
    /// The registry is empty afterwards. Safe to call more than once.
    pub async fn shutdown(&self) -> ShutdownReport {
        self.token.cancel();

        let entries = self.registry.drain();
        info!(
            sessions = entries.len(),
            grace_ms = self.grace.as_millis() as u64,
            "closing sessions"
        );

        let outcomes = join_all(entries.iter().map(|entry| self.close_one(entry))).await;
        self.registry.clear();

        let mut report = ShutdownReport::default();
        for outcome in outcomes {
            match outcome {
                CloseOutcome::Closed => report.closed += 1,
                CloseOutcome::Failed => report.failed += 1,
                CloseOutcome::TimedOut => report.timed_out += 1,
            }
        }
        info!(
            closed = report.closed,
            failed = report.failed,
            timed_out = report.timed_out,
            "shutdown complete"
        );
        report
    }

    async fn close_one(&self, entry: &SessionEntry) -> CloseOutcome {
        match tokio::time::timeout(self.grace, entry.close()).await {
            Ok(Ok(())) => CloseOutcome::Closed,
            Ok(Err(err)) => {
                warn!(session_id = %entry.id(), error = %err, "error closing session");
                CloseOutcome::Failed
            }
            Err(_) => {
                warn!(session_id = %entry.id(), "session close timed out");
                CloseOutcome::TimedOut
            }
        }
    }
}
