//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

use crate::protocol::ServerInfo;

pub const TRANSPORT_NAME: &str = "Streamable HTTP";

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `"healthy"` when the server is running.
    pub status: String,
    pub server: String,
    pub version: String,
    pub transport: String,
    /// Registered tool names.
    pub tools: Vec<String>,
    /// Number of live sessions.
    pub active_sessions: usize,
    /// Seconds since the server started.
    pub uptime_secs: u64,
}

/// Build a health response from live counters.
pub fn health_check(
    info: &ServerInfo,
    start_time: Instant,
    tools: Vec<String>,
    sessions: usize,
) -> HealthResponse {
    HealthResponse {
        status: "healthy".into(),
        server: info.name.clone(),
        version: info.version.clone(),
        transport: TRANSPORT_NAME.into(),
        tools,
        active_sessions: sessions,
        uptime_secs: start_time.elapsed().as_secs(),
    }
}
