use std::sync::Arc;

use async_trait::async_trait;
use dashmcp_core::tools::{Tool, ToolContext, ToolError, ToolResult};
use tracing::{error, info};

use super::{failure_message, pretty, require_str};
use crate::client::DashboardClient;

pub struct GetApiCollectionsTool {
    client: Arc<DashboardClient>,
}

impl GetApiCollectionsTool {
    pub fn new(client: Arc<DashboardClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for GetApiCollectionsTool {
    fn name(&self) -> &str {
        "get_api_collections"
    }

    fn description(&self) -> &str {
        "Retrieve all API collections available in the dashboard"
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["dashboardCategory"],
            "properties": {
                "dashboardCategory": {
                    "type": "string",
                    "description": "The dashboard category to retrieve API collections for"
                }
            }
        })
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let category = require_str(&args, "dashboardCategory")?;
        info!(session_id = %ctx.session_id, category, "fetching API collections");

        match self
            .client
            .post("/api/getAllCollections", category, &serde_json::json!({}))
            .await
        {
            Ok(data) => {
                let collections = data
                    .get("apiCollections")
                    .cloned()
                    .unwrap_or_else(|| serde_json::json!({}));
                Ok(ToolResult::text(pretty(&collections)))
            }
            Err(e) => {
                error!(session_id = %ctx.session_id, error = %e, "fetching API collections failed");
                Ok(ToolResult::error_text(format!(
                    "Error fetching API collections: {}",
                    failure_message(&e)
                )))
            }
        }
    }
}
