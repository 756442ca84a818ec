use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmcp_core::{SessionError, SessionId};
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::protocol::ProtocolHandler;
use crate::transport::SessionTransport;

/// A live session: the handler, its transport, and activity bookkeeping.
///
/// Handler and transport are created together by the factory and closed
/// together by [`SessionEntry::close`].
pub struct SessionEntry {
    id: SessionId,
    handler: Arc<dyn ProtocolHandler>,
    transport: Arc<dyn SessionTransport>,
    created_at: DateTime<Utc>,
    created_instant: Instant,
    last_activity: Mutex<Instant>,
    closed: AtomicBool,
}

impl SessionEntry {
    pub fn new(
        id: SessionId,
        handler: Arc<dyn ProtocolHandler>,
        transport: Arc<dyn SessionTransport>,
    ) -> Self {
        let now = Instant::now();
        Self {
            id,
            handler,
            transport,
            created_at: Utc::now(),
            created_instant: now,
            last_activity: Mutex::new(now),
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn handler(&self) -> &dyn ProtocolHandler {
        self.handler.as_ref()
    }

    pub fn transport(&self) -> &dyn SessionTransport {
        self.transport.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn created_instant(&self) -> Instant {
        self.created_instant
    }

    pub fn last_activity(&self) -> Instant {
        *self.last_activity.lock()
    }

    /// Record activity at `now`. Never moves the timestamp backwards.
    pub fn touch(&self, now: Instant) {
        let mut last = self.last_activity.lock();
        if now > *last {
            *last = now;
        }
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close the handler, then the transport. Both are attempted even if the
    /// first fails; the first failure is returned. Only the first call does
    /// any work.
    pub async fn close(&self) -> Result<(), SessionError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let handler = self.handler.close().await;
        let transport = self.transport.close().await;
        handler.and(transport)
    }
}

impl std::fmt::Debug for SessionEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEntry")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("closed", &self.is_closed())
            .finish()
    }
}
