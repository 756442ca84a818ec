//! Dashboard tools exposed over `tools/call`.
//!
//! Every tool forwards one POST to the dashboard API. Upstream failures come
//! back as `isError` results so the calling model can read them; only
//! malformed arguments are reported as errors.

mod collections;
mod templates;

pub use collections::GetApiCollectionsTool;
pub use start_test::StartTestTool;
pub use templates::GetTestTemplatesTool;

use dashmcp_core::tools::ToolError;

/// Extract a required string argument.
pub(crate) fn require_str<'a>(args: &'a serde_json::Value, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::InvalidArguments(format!("{key} must be a string")))
}

/// Render a JSON value the way clients expect to read it (2-space pretty print).
pub(crate) fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Human-readable message for a failed upstream call.
pub(crate) fn failure_message(err: &ToolError) -> String {
    match err {
        ToolError::ExecutionFailed(msg) => msg.clone(),
        other => other.to_string(),
    }
}
