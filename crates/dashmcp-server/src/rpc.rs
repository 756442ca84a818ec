use serde::{Deserialize, Serialize};

/// An incoming JSON-RPC 2.0 message. Requests carry an `id`, notifications
/// do not; client responses (`result`/`error` without `method`) are tolerated.
#[derive(Debug, Deserialize)]
pub struct RpcMessage {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    pub method: Option<String>,
    pub params: Option<serde_json::Value>,
    pub id: Option<serde_json::Value>,
    pub result: Option<serde_json::Value>,
    pub error: Option<serde_json::Value>,
}

impl RpcMessage {
    pub fn is_notification(&self) -> bool {
        self.method.is_some() && self.id.is_none()
    }

    pub fn is_client_response(&self) -> bool {
        self.method.is_none() && (self.result.is_some() || self.error.is_some())
    }
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Serialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

// Standard JSON-RPC error codes
pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
// Server-defined
pub const SERVER_NOT_INITIALIZED: i32 = -32002;

impl RpcResponse {
    pub fn success(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: serde_json::Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    pub fn method_not_found(id: serde_json::Value, method: &str) -> Self {
        Self::error(id, METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }

    pub fn invalid_params(id: serde_json::Value, msg: impl Into<String>) -> Self {
        Self::error(id, INVALID_PARAMS, msg)
    }

    pub fn invalid_request(id: serde_json::Value, msg: impl Into<String>) -> Self {
        Self::error(id, INVALID_REQUEST, msg)
    }

    pub fn parse_error() -> Self {
        Self::error(serde_json::Value::Null, PARSE_ERROR, "Parse error")
    }

    /// The envelope returned with HTTP 500 when dispatch fails before any
    /// protocol response was produced.
    pub fn internal_error(detail: impl Into<String>) -> Self {
        let mut resp = Self::error(
            serde_json::Value::Null,
            INTERNAL_ERROR,
            "Internal server error",
        );
        if let Some(err) = resp.error.as_mut() {
            err.data = Some(serde_json::json!({ "error": detail.into() }));
        }
        resp
    }
}
