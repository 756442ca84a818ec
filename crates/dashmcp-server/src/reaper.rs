//! Periodic eviction of idle sessions.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::session::{SessionEntry, SessionRegistry};

pub struct IdleReaper {
    registry: Arc<SessionRegistry>,
    max_idle_age: Duration,
    interval: Duration,
    close_timeout: Duration,
}

impl IdleReaper {
    pub fn new(
        registry: Arc<SessionRegistry>,
        max_idle_age: Duration,
        interval: Duration,
        close_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            max_idle_age,
            interval,
            close_timeout,
        }
    }

    /// Evict every session idle for longer than the threshold at `now`.
    /// Returns how many were removed.
    ///
    /// Entries are removed before they are closed. Idleness is checked again
    /// at removal, so an entry touched or replaced since the snapshot was
    /// taken is left alone.
    pub async fn sweep(&self, now: Instant) -> usize {
        let idle: Vec<Arc<SessionEntry>> = self
            .registry
            .snapshot()
            .into_iter()
            .filter(|entry| entry.idle_for(now) > self.max_idle_age)
            .filter(|entry| self.registry.remove_if_idle(entry, now, self.max_idle_age))
            .collect();

        if idle.is_empty() {
            return 0;
        }

        join_all(idle.iter().map(|entry| self.evict(entry, now))).await;
        info!(
            evicted = idle.len(),
            remaining = self.registry.size(),
            "idle sessions reaped"
        );
        idle.len()
    }

    async fn evict(&self, entry: &SessionEntry, now: Instant) {
        let idle_secs = entry.idle_for(now).as_secs();
        match tokio::time::timeout(self.close_timeout, entry.close()).await {
            Ok(Ok(())) => debug!(session_id = %entry.id(), idle_secs, "idle session closed"),
            Ok(Err(err)) => warn!(
                session_id = %entry.id(),
                error = %err,
                "error closing idle session"
            ),
            Err(_) => warn!(
                session_id = %entry.id(),
                timeout_ms = self.close_timeout.as_millis() as u64,
                "idle session close timed out"
            ),
        }
    }

    /// Run sweeps on a fixed interval until `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await; // first tick is immediate

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("idle reaper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.sweep(Instant::now()).await;
                    }
                }
            }
        })
    }
}
