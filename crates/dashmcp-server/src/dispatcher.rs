//! Routes one inbound HTTP request to the session it belongs to.

use std::sync::Arc;

use dashmcp_core::{SessionError, SessionId};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::session::{SessionEntry, SessionFactory, SessionRegistry};
use crate::transport::{ResponseFraming, TransportResponse};

/// The HTTP shape of a `/mcp` request, as far as session routing cares.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestKind {
    /// A JSON-RPC payload for an existing or new session.
    Post,
    /// A standalone stream subscription. Always gets a fresh session.
    Get,
}

/// Pick the session id for a request.
pub fn resolve_session_id(kind: RequestKind, supplied: Option<&str>) -> SessionId {
    match kind {
        RequestKind::Get => SessionId::new(),
        RequestKind::Post => SessionId::supplied_or_new(supplied),
    }
}

/// Result of one dispatch. The session id is always resolved, even when the
/// request itself failed.
#[derive(Debug)]
pub struct DispatchOutcome {
    pub session_id: SessionId,
    pub result: Result<TransportResponse, SessionError>,
}

pub struct RequestDispatcher {
    registry: Arc<SessionRegistry>,
    factory: Arc<dyn SessionFactory>,
}

impl RequestDispatcher {
    pub fn new(registry: Arc<SessionRegistry>, factory: Arc<dyn SessionFactory>) -> Self {
        Self { registry, factory }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Resolve the session, stamp activity, and forward the request to the
    /// session's transport.
    pub async fn dispatch(
        &self,
        kind: RequestKind,
        supplied: Option<&str>,
        body: &[u8],
        framing: ResponseFraming,
    ) -> DispatchOutcome {
        let session_id = resolve_session_id(kind, supplied);
        let result = self.forward(kind, &session_id, body, framing).await;
        if let Err(err) = &result {
            warn!(
                session_id = %session_id,
                error_kind = err.error_kind(),
                error = %err,
                "dispatch failed"
            );
        }
        DispatchOutcome { session_id, result }
    }

    async fn forward(
        &self,
        kind: RequestKind,
        session_id: &SessionId,
        body: &[u8],
        framing: ResponseFraming,
    ) -> Result<TransportResponse, SessionError> {
        let entry = self.entry_for(session_id)?;

        match kind {
            RequestKind::Get => entry.transport().open_stream(),
            RequestKind::Post => {
                entry
                    .transport()
                    .handle_post(entry.handler(), body, framing)
                    .await
            }
        }
    }

    /// Get or create the live entry for `session_id`, stamped with the current
    /// time before the registry lets go of it. An entry that was closed
    /// between lookup and use is dropped and rebuilt once.
    fn entry_for(&self, session_id: &SessionId) -> Result<Arc<SessionEntry>, SessionError> {
        for _ in 0..2 {
            let (entry, created) = self.registry.get_or_create_touched(
                session_id,
                Instant::now(),
                || self.factory.create(session_id),
            )?;
            if created {
                info!(
                    session_id = %session_id,
                    active_sessions = self.registry.size(),
                    "session opened"
                );
            }
            if !entry.is_closed() {
                return Ok(entry);
            }
            debug!(session_id = %session_id, "found closed session, replacing");
            self.registry.remove_if_same(&entry);
        }
        Err(SessionError::Dispatch(format!(
            "session {session_id} closed during dispatch"
        )))
    }

    /// Remove and close one session. Returns the number of sessions left.
    pub async fn terminate(&self, session_id: &SessionId) -> Result<usize, SessionError> {
        let entry = self
            .registry
            .remove(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.clone()))?;

        if let Err(err) = entry.close().await {
            warn!(session_id = %session_id, error = %err, "error closing deleted session");
        }
        let remaining = self.registry.size();
        info!(session_id = %session_id, remaining, "session deleted");
        Ok(remaining)
    }
}
