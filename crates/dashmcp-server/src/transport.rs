//! Streamable HTTP transport: per-session response framing.
//!
//! POST replies are framed as a JSON body or as a single SSE `message` event
//! depending on what the client accepts. A GET opens a standalone event
//! stream that stays open until the session's transport is closed.

use async_trait::async_trait;
use dashmcp_core::{SessionError, SessionId};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::protocol::ProtocolHandler;

/// How a POST response body is framed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseFraming {
    Json,
    EventStream,
}

impl ResponseFraming {
    /// Pick a framing from an `Accept` header. JSON wins whenever the client
    /// accepts it; SSE is used only for clients that accept nothing else.
    pub fn from_accept(accept: Option<&str>) -> Self {
        let Some(accept) = accept else {
            return Self::Json;
        };
        let accepts = |mime: &str| {
            accept
                .split(',')
                .any(|part| part.split(';').next().map(str::trim) == Some(mime))
        };
        if accepts("application/json") || accepts("*/*") {
            Self::Json
        } else if accepts("text/event-stream") {
            Self::EventStream
        } else {
            Self::Json
        }
    }
}

/// A live standalone stream; ends when the session's transport closes.
#[derive(Clone, Debug)]
pub struct SessionStream {
    pub closed: CancellationToken,
}

#[derive(Debug)]
pub enum TransportResponse {
    /// `application/json` body.
    Json(Vec<u8>),
    /// `text/event-stream` body holding one framed event.
    EventStream(Vec<u8>),
    /// Nothing to reply (notifications only): HTTP 202.
    Accepted,
    /// Standalone server-to-client stream.
    Stream(SessionStream),
}

/// Per-session delivery channel between HTTP and a protocol handler.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// The id this transport reports for its session. Always the id it was built with.
    fn session_id(&self) -> &SessionId;

    /// Handshake: bind `handler` to this transport.
    fn connect(&self, handler: &dyn ProtocolHandler) -> Result<(), SessionError>;

    /// Forward one POST body to `handler` and frame its reply.
    async fn handle_post(
        &self,
        handler: &dyn ProtocolHandler,
        body: &[u8],
        framing: ResponseFraming,
    ) -> Result<TransportResponse, SessionError>;

    /// Open a standalone event stream (GET).
    fn open_stream(&self) -> Result<TransportResponse, SessionError>;

    /// Release the transport and end its streams. Idempotent.
    async fn close(&self) -> Result<(), SessionError>;
}

pub struct StreamableHttpTransport {
    session_id: SessionId,
    connected: AtomicBool,
    closed: CancellationToken,
}

impl StreamableHttpTransport {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            connected: AtomicBool::new(false),
            closed: CancellationToken::new(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.is_closed() {
            Err(SessionError::Dispatch(format!(
                "transport for {} is closed",
                self.session_id
            )))
        } else {
            Ok(())
        }
    }
}

/// Frame one JSON-RPC payload as an SSE `message` event.
pub fn frame_event(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 24);
    out.extend_from_slice(b"event: message\n");
    // JSON from serde_json never contains raw newlines, so one data line suffices.
    out.extend_from_slice(b"data: ");
    out.extend_from_slice(payload);
    out.extend_from_slice(b"\n\n");
    out
}

#[async_trait]
impl SessionTransport for StreamableHttpTransport {
    fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    fn connect(&self, handler: &dyn ProtocolHandler) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::Creation("transport is closed".into()));
        }
        if self.connected.swap(true, Ordering::AcqRel) {
            return Err(SessionError::Creation(format!(
                "transport for {} is already connected",
                self.session_id
            )));
        }
        handler.bind(&self.session_id)
    }

    async fn handle_post(
        &self,
        handler: &dyn ProtocolHandler,
        body: &[u8],
        framing: ResponseFraming,
    ) -> Result<TransportResponse, SessionError> {
        self.ensure_open()?;
        let reply = handler.dispatch(body).await?;
        Ok(match (reply, framing) {
            (None, _) => TransportResponse::Accepted,
            (Some(bytes), ResponseFraming::Json) => TransportResponse::Json(bytes),
            (Some(bytes), ResponseFraming::EventStream) => {
                TransportResponse::EventStream(frame_event(&bytes))
            }
        })
    }

    fn open_stream(&self) -> Result<TransportResponse, SessionError> {
        self.ensure_open()?;
        Ok(TransportResponse::Stream(SessionStream {
            closed: self.closed.clone(),
        }))
    }

    async fn close(&self) -> Result<(), SessionError> {
        if !self.closed.is_cancelled() {
            self.closed.cancel();
            debug!(session_id = %self.session_id, "transport closed");
        }
        Ok(())
    }
}
