use std::sync::Arc;

use async_trait::async_trait;
use dashmcp_core::tools::{Tool, ToolContext, ToolError, ToolResult};
use tracing::{error, info};

use super::{failure_message, pretty, require_str};
use crate::client::DashboardClient;

pub struct GetTestTemplatesTool {
    client: Arc<DashboardClient>,
}

impl GetTestTemplatesTool {
    pub fn new(client: Arc<DashboardClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for GetTestTemplatesTool {
    fn name(&self) -> &str {
        "get_test_templates"
    }

    fn description(&self) -> &str {
        "Retrieve all available test templates filtered by dashboard category"
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["dashboardCategory"],
            "properties": {
                "dashboardCategory": {
                    "type": "string",
                    "description": "The dashboard category to retrieve test templates for"
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
        info!(session_id = %ctx.session_id, category, "fetching test templates");

        let body = serde_json::json!({ "dashboardCategory": category });
        match self
            .client
            .post("/api/fetchTemplatesByCategory", category, &body)
            .await
        {
            Ok(templates) => Ok(ToolResult::text(pretty(&templates))),
            Err(e) => {
                error!(session_id = %ctx.session_id, error = %e, "fetching test templates failed");
                Ok(ToolResult::error_text(format!(
                    "Error fetching test templates: {}",
                    failure_message(&e)
                )))
            }
        }
    }
}
