//! Test doubles for the session core: a handler/transport pair that counts
//! closes and can be told to fail or hang, and a factory that counts builds.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmcp_core::{SessionError, SessionId};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::{SessionEntry, SessionFactory};
use crate::protocol::ProtocolHandler;
use crate::transport::{ResponseFraming, SessionStream, SessionTransport, TransportResponse};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseBehavior {
    Ok,
    Fail,
    Hang,
}

#[derive(Default)]
pub struct Counters {
    handler_closes: AtomicUsize,
    transport_closes: AtomicUsize,
    dispatches: AtomicUsize,
}

impl Counters {
    pub fn handler_closes(&self) -> usize {
        self.handler_closes.load(Ordering::SeqCst)
    }

    pub fn transport_closes(&self) -> usize {
        self.transport_closes.load(Ordering::SeqCst)
    }

    pub fn dispatches(&self) -> usize {
        self.dispatches.load(Ordering::SeqCst)
    }
}

async fn close_with(behavior: CloseBehavior) -> Result<(), SessionError> {
    match behavior {
        CloseBehavior::Ok => Ok(()),
        CloseBehavior::Fail => Err(SessionError::Close("injected close failure".into())),
        CloseBehavior::Hang => std::future::pending().await,
    }
}

/// Handler whose state is a dispatch counter; each reply reports the count.
pub struct CountingHandler {
    counters: Arc<Counters>,
    behavior: CloseBehavior,
    dispatch_delay: Duration,
}

#[async_trait]
impl ProtocolHandler for CountingHandler {
    fn bind(&self, _transport_id: &SessionId) -> Result<(), SessionError> {
        Ok(())
    }

    async fn dispatch(&self, _raw: &[u8]) -> Result<Option<Vec<u8>>, SessionError> {
        if !self.dispatch_delay.is_zero() {
            tokio::time::sleep(self.dispatch_delay).await;
        }
        let calls = self.counters.dispatches.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Some(serde_json::json!({ "calls": calls }).to_string().into_bytes()))
    }

    async fn close(&self) -> Result<(), SessionError> {
        self.counters.handler_closes.fetch_add(1, Ordering::SeqCst);
        close_with(self.behavior).await
    }
}

pub struct CountingTransport {
    id: SessionId,
    counters: Arc<Counters>,
    closed: CancellationToken,
}

#[async_trait]
impl SessionTransport for CountingTransport {
    fn session_id(&self) -> &SessionId {
        &self.id
    }

    fn connect(&self, handler: &dyn ProtocolHandler) -> Result<(), SessionError> {
        handler.bind(&self.id)
    }

    async fn handle_post(
        &self,
        handler: &dyn ProtocolHandler,
        body: &[u8],
        _framing: ResponseFraming,
    ) -> Result<TransportResponse, SessionError> {
        match handler.dispatch(body).await? {
            Some(bytes) => Ok(TransportResponse::Json(bytes)),
            None => Ok(TransportResponse::Accepted),
        }
    }

    fn open_stream(&self) -> Result<TransportResponse, SessionError> {
        Ok(TransportResponse::Stream(SessionStream {
            closed: self.closed.clone(),
        }))
    }

    async fn close(&self) -> Result<(), SessionError> {
        self.counters.transport_closes.fetch_add(1, Ordering::SeqCst);
        self.closed.cancel();
        // Only the handler misbehaves; the transport always closes cleanly.
        Ok(())
    }
}

pub fn counted_entry_with(
    id: &str,
    behavior: CloseBehavior,
    dispatch_delay: Duration,
) -> (SessionEntry, Arc<Counters>) {
    let counters = Arc::new(Counters::default());
    let sid = SessionId::from_raw(id);
    let handler = Arc::new(CountingHandler {
        counters: Arc::clone(&counters),
        behavior,
        dispatch_delay,
    });
    let transport = Arc::new(CountingTransport {
        id: sid.clone(),
        counters: Arc::clone(&counters),
        closed: CancellationToken::new(),
    });
    (SessionEntry::new(sid, handler, transport), counters)
}

pub fn counted_entry(id: &str, behavior: CloseBehavior) -> (SessionEntry, Arc<Counters>) {
    counted_entry_with(id, behavior, Duration::ZERO)
}

/// Factory that builds counted entries and counts how often it ran.
pub struct CountingFactory {
    creates: AtomicUsize,
    fail: bool,
    behavior: CloseBehavior,
    dispatch_delay: Duration,
    counters: Mutex<Vec<(SessionId, Arc<Counters>)>>,
}

impl CountingFactory {
    pub fn new() -> Self {
        Self {
            creates: AtomicUsize::new(0),
            fail: false,
            behavior: CloseBehavior::Ok,
            dispatch_delay: Duration::ZERO,
            counters: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn with_dispatch_delay(delay: Duration) -> Self {
        Self {
            dispatch_delay: delay,
            ..Self::new()
        }
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn counters(&self) -> Vec<(SessionId, Arc<Counters>)> {
        self.counters.lock().clone()
    }
}

impl SessionFactory for CountingFactory {
    fn create(&self, id: &SessionId) -> Result<SessionEntry, SessionError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(SessionError::Creation("injected handshake failure".into()));
        }
        let (entry, counters) = counted_entry_with(id.as_str(), self.behavior, self.dispatch_delay);
        self.counters.lock().push((id.clone(), counters));
        Ok(entry)
    }
}
