//! MCP protocol handler: one state machine per session.
//!
//! A handler is bound to exactly one transport id, must see `initialize`
//! before it serves tools, and refuses all traffic once closed.

use std::sync::Arc;

use async_trait::async_trait;
use dashmcp_core::tools::{ToolContext, ToolError, ToolResult};
use dashmcp_core::{SessionError, SessionId};
use dashmcp_tools::ToolRegistry;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::rpc::{RpcMessage, RpcResponse, SERVER_NOT_INITIALIZED};

/// Protocol revisions this server can speak, newest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];

/// The protocol layer as seen by the session core.
#[async_trait]
pub trait ProtocolHandler: Send + Sync {
    /// Attach the handler to the transport identified by `transport_id`.
    fn bind(&self, transport_id: &SessionId) -> Result<(), SessionError>;

    /// Process one raw JSON-RPC payload (a message or a batch). `None` means
    /// the payload held only notifications and nothing is sent back.
    async fn dispatch(&self, raw: &[u8]) -> Result<Option<Vec<u8>>, SessionError>;

    /// Release the handler. Idempotent.
    async fn close(&self) -> Result<(), SessionError>;
}

#[derive(Clone, Debug)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Bound (or not yet bound) but `initialize` not seen.
    Created,
    Initialized,
    Closed,
}

struct HandlerState {
    phase: Phase,
    bound_to: Option<SessionId>,
    protocol_version: Option<String>,
    client_info: Option<Value>,
}

pub struct McpHandler {
    server_info: ServerInfo,
    tools: Arc<ToolRegistry>,
    state: Mutex<HandlerState>,
}

impl McpHandler {
    pub fn new(server_info: ServerInfo, tools: Arc<ToolRegistry>) -> Self {
        Self {
            server_info,
            tools,
            state: Mutex::new(HandlerState {
                phase: Phase::Created,
                bound_to: None,
                protocol_version: None,
                client_info: None,
            }),
        }
    }

    pub fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.state.lock().bound_to.clone()
    }

    /// Protocol version agreed during `initialize`.
    pub fn protocol_version(&self) -> Option<String> {
        self.state.lock().protocol_version.clone()
    }

    pub fn client_info(&self) -> Option<Value> {
        self.state.lock().client_info.clone()
    }

    async fn handle_value(&self, value: Value, session_id: &SessionId) -> Option<RpcResponse> {
        let msg: RpcMessage = match serde_json::from_value(value) {
            Ok(msg) => msg,
            Err(e) => return Some(RpcResponse::invalid_request(Value::Null, e.to_string())),
        };

        if msg.is_client_response() {
            debug!(session_id = %session_id, "ignoring client response");
            return None;
        }
        if msg.jsonrpc.as_deref() != Some("2.0") {
            return Some(RpcResponse::invalid_request(
                msg.id.unwrap_or(Value::Null),
                "jsonrpc must be \"2.0\"",
            ));
        }
        let Some(method) = msg.method.as_deref() else {
            return Some(RpcResponse::invalid_request(
                msg.id.unwrap_or(Value::Null),
                "missing method",
            ));
        };

        let Some(id) = msg.id.clone() else {
            self.handle_notification(method, session_id);
            return None;
        };

        let params = msg.params.unwrap_or_else(|| serde_json::json!({}));
        Some(self.handle_request(method, params, id, session_id).await)
    }

    fn handle_notification(&self, method: &str, session_id: &SessionId) {
        match method {
            "notifications/initialized" => {
                debug!(session_id = %session_id, "client finished initialization");
            }
            other => {
                debug!(session_id = %session_id, method = other, "ignoring notification");
            }
        }
    }

    async fn handle_request(
        &self,
        method: &str,
        params: Value,
        id: Value,
        session_id: &SessionId,
    ) -> RpcResponse {
        match method {
            "initialize" => self.initialize(params, id, session_id),
            "ping" => RpcResponse::success(id, serde_json::json!({})),
            _ if self.phase() != Phase::Initialized => {
                RpcResponse::error(id, SERVER_NOT_INITIALIZED, "Server not initialized")
            }
            "tools/list" => RpcResponse::success(
                id,
                serde_json::json!({ "tools": self.tools.definitions() }),
            ),
            "tools/call" => self.call_tool(params, id, session_id).await,
            other => RpcResponse::method_not_found(id, other),
        }
    }

    fn initialize(&self, params: Value, id: Value, session_id: &SessionId) -> RpcResponse {
        let requested = params
            .get("protocolVersion")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let version = if SUPPORTED_PROTOCOL_VERSIONS.contains(&requested) {
            requested
        } else {
            SUPPORTED_PROTOCOL_VERSIONS[0]
        };

        {
            let mut state = self.state.lock();
            if state.phase == Phase::Initialized {
                return RpcResponse::invalid_request(id, "Server already initialized");
            }
            state.phase = Phase::Initialized;
            state.protocol_version = Some(version.to_string());
            state.client_info = params.get("clientInfo").cloned();
        }

        info!(
            session_id = %session_id,
            protocol_version = version,
            requested_version = requested,
            "session initialized"
        );

        RpcResponse::success(
            id,
            serde_json::json!({
                "protocolVersion": version,
                "capabilities": { "tools": { "listChanged": false } },
                "serverInfo": {
                    "name": self.server_info.name,
                    "version": self.server_info.version,
                },
            }),
        )
    }

    async fn call_tool(&self, params: Value, id: Value, session_id: &SessionId) -> RpcResponse {
        let Some(name) = params.get("name").and_then(|v| v.as_str()) else {
            return RpcResponse::invalid_params(id, "tools/call requires a tool name");
        };
        let Some(tool) = self.tools.get(name) else {
            return RpcResponse::invalid_params(id, format!("Unknown tool: {name}"));
        };
        let args = params
            .get("arguments")
            .cloned()
            .unwrap_or_else(|| serde_json::json!({}));

        let ctx = ToolContext {
            session_id: session_id.clone(),
        };
        debug!(session_id = %session_id, tool = name, "calling tool");
        let result = match tool.execute(args, &ctx).await {
            Ok(result) => result,
            Err(ToolError::InvalidArguments(msg)) => {
                return RpcResponse::invalid_params(id, format!("Invalid arguments for {name}: {msg}"));
            }
            Err(e) => {
                warn!(session_id = %session_id, tool = name, error = %e, "tool failed");
                ToolResult::error_text(e.to_string())
            }
        };

        match serde_json::to_value(&result) {
            Ok(value) => RpcResponse::success(id, value),
            Err(e) => RpcResponse::error(id, crate::rpc::INTERNAL_ERROR, e.to_string()),
        }
    }
}

#[async_trait]
impl ProtocolHandler for McpHandler {
    fn bind(&self, transport_id: &SessionId) -> Result<(), SessionError> {
        let mut state = self.state.lock();
        if state.phase == Phase::Closed {
            return Err(SessionError::Creation("handler is closed".into()));
        }
        match &state.bound_to {
            Some(existing) if existing != transport_id => Err(SessionError::Creation(format!(
                "handler already bound to {existing}"
            ))),
            _ => {
                state.bound_to = Some(transport_id.clone());
                Ok(())
            }
        }
    }

    async fn dispatch(&self, raw: &[u8]) -> Result<Option<Vec<u8>>, SessionError> {
        let session_id = {
            let state = self.state.lock();
            if state.phase == Phase::Closed {
                return Err(SessionError::Dispatch("session is closed".into()));
            }
            state
                .bound_to
                .clone()
                .ok_or_else(|| SessionError::Dispatch("handler is not bound".into()))?
        };

        let value: Value = match serde_json::from_slice(raw) {
            Ok(v) => v,
            Err(_) => return encode(&RpcResponse::parse_error()).map(Some),
        };

        match value {
            Value::Array(items) => {
                if items.is_empty() {
                    return encode(&RpcResponse::invalid_request(Value::Null, "empty batch"))
                        .map(Some);
                }
                let mut responses = Vec::new();
                for item in items {
                    if let Some(resp) = self.handle_value(item, &session_id).await {
                        responses.push(resp);
                    }
                }
                if responses.is_empty() {
                    Ok(None)
                } else {
                    encode(&responses).map(Some)
                }
            }
            single => match self.handle_value(single, &session_id).await {
                Some(resp) => encode(&resp).map(Some),
                None => Ok(None),
            },
        }
    }

    async fn close(&self) -> Result<(), SessionError> {
        let mut state = self.state.lock();
        if state.phase != Phase::Closed {
            state.phase = Phase::Closed;
            debug!(session_id = ?state.bound_to, "handler closed");
        }
        Ok(())
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, SessionError> {
    serde_json::to_vec(value).map_err(|e| SessionError::Dispatch(e.to_string()))
}
