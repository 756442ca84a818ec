use std::time::Duration;

use dashmcp_core::settings::DashboardSettings;
use dashmcp_core::tools::ToolError;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

/// HTTP client for the upstream dashboard API.
pub struct DashboardClient {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
}

impl DashboardClient {
    pub fn new(settings: &DashboardSettings) -> Result<Self, ToolError> {
        let base_url = settings.api_url.trim_end_matches('/').to_string();
        // Local dashboards commonly run with self-signed certificates.
        let local_tls = base_url.starts_with("https://localhost");
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .danger_accept_invalid_certs(local_tls)
            .build()
            .map_err(|e| ToolError::ExecutionFailed(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            api_key: settings.api_key.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST a JSON body to `{base_url}{path}` in the context of a dashboard category.
    pub async fn post(
        &self,
        path: &str,
        dashboard_category: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, category = dashboard_category, "dashboard request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", self.api_key.expose_secret())
            .header("x-context-source", dashboard_category)
            .json(body)
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Upstream {
                status: status.as_u16(),
                body: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("Failed to read response: {e}")))
    }
}
