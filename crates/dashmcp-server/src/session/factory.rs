use std::sync::Arc;

use dashmcp_core::{SessionError, SessionId};
use dashmcp_tools::ToolRegistry;
use tracing::debug;

use super::SessionEntry;
use crate::protocol::{McpHandler, ServerInfo};
use crate::transport::{SessionTransport, StreamableHttpTransport};

/// Builds a connected handler/transport pair for one session id.
///
/// Runs under the registry's shard lock, so it must stay synchronous and
/// must not call back into the registry.
pub trait SessionFactory: Send + Sync {
    fn create(&self, id: &SessionId) -> Result<SessionEntry, SessionError>;
}

pub struct McpSessionFactory {
    server_info: ServerInfo,
    tools: Arc<ToolRegistry>,
}

impl McpSessionFactory {
    pub fn new(server_info: ServerInfo, tools: Arc<ToolRegistry>) -> Self {
        Self { server_info, tools }
    }
}

impl SessionFactory for McpSessionFactory {
    fn create(&self, id: &SessionId) -> Result<SessionEntry, SessionError> {
        let handler = Arc::new(McpHandler::new(
            self.server_info.clone(),
            Arc::clone(&self.tools),
        ));
        let transport = Arc::new(StreamableHttpTransport::new(id.clone()));
        transport.connect(handler.as_ref())?;

        debug!(session_id = %id, tools = self.tools.count(), "session created");
        Ok(SessionEntry::new(id.clone(), handler, transport))
    }
}
