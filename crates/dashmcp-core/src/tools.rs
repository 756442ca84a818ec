use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::ids::SessionId;

/// Context available to tools during execution.
#[derive(Clone, Debug)]
pub struct ToolContext {
    pub session_id: SessionId,
}

/// One content block of a tool result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolContent {
    Text { text: String },
}

/// Result returned by a tool execution, in MCP `tools/call` shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub content: Vec<ToolContent>,
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    pub fn error_text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: true,
        }
    }

    /// Concatenated text of all text blocks.
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .map(|c| match c {
                ToolContent::Text { text } => text.as_str(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Tool definition advertised by `tools/list`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Trait implemented by each tool.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> serde_json::Value;

    async fn execute(
        &self,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError>;

    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }

    /// Names of the top-level properties in the input schema.
    fn parameter_names(&self) -> Vec<String> {
        self.input_schema()
            .get("properties")
            .and_then(|p| p.as_object())
            .map(|props| props.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
    #[error("API returned {status}: {body}")]
    Upstream { status: u16, body: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_result_serializes_in_mcp_shape() {
        let result = ToolResult::text("ok");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["content"][0]["type"], "text");
        assert_eq!(json["content"][0]["text"], "ok");
        assert_eq!(json["isError"], false);
    }

    #[test]
    fn error_text_sets_flag() {
        let result = ToolResult::error_text("boom");
        assert!(result.is_error);
        assert_eq!(result.joined_text(), "boom");
    }

    #[test]
    fn definition_uses_input_schema_key() {
        let def = ToolDefinition {
            name: "t".into(),
            description: "d".into(),
            input_schema: serde_json::json!({"type": "object"}),
        };
        let json = serde_json::to_value(&def).unwrap();
        assert_eq!(json["inputSchema"]["type"], "object");
        assert!(json.get("input_schema").is_none());
    }

    #[test]
    fn tool_error_display() {
        let err = ToolError::InvalidArguments("dashboardCategory is required".into());
        assert_eq!(
            err.to_string(),
            "invalid arguments: dashboardCategory is required"
        );

        let err = ToolError::Upstream {
            status: 502,
            body: "Bad Gateway".into(),
        };
        assert_eq!(err.to_string(), "API returned 502: Bad Gateway");
    }
}
