//! `GET /` capability manifest.

use std::collections::BTreeMap;

use dashmcp_tools::ToolRegistry;
use serde::Serialize;

use crate::protocol::ServerInfo;

const DISPLAY_NAME: &str = "Dashboard Testing MCP Server";
const DESCRIPTION: &str =
    "MCP server for the dashboard testing workflow: list test templates, browse API collections and start test runs";

const WORKFLOW: &[&str] = &[
    "1. Call get_api_collections to find the collection to test",
    "2. Call get_test_templates with the dashboard category to pick test ids",
    "3. Call start_test with apiCollectionId, selectedTests, testName and dashboardCategory",
];

#[derive(Debug, Clone, Serialize)]
pub struct ToolSummary {
    pub name: String,
    pub description: String,
    pub parameters: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    pub name: &'static str,
    pub version: String,
    pub description: &'static str,
    pub endpoints: BTreeMap<&'static str, &'static str>,
    pub tools: Vec<ToolSummary>,
    pub workflow: Vec<&'static str>,
    pub transport: &'static str,
    pub usage: BTreeMap<&'static str, &'static str>,
}

pub fn build_manifest(info: &ServerInfo, tools: &ToolRegistry) -> Manifest {
    let tools = tools
        .tools()
        .iter()
        .map(|tool| ToolSummary {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            parameters: tool.parameter_names(),
        })
        .collect();

    Manifest {
        name: DISPLAY_NAME,
        version: info.version.clone(),
        description: DESCRIPTION,
        endpoints: BTreeMap::from([
            ("mcp", "/mcp"),
            ("health", "/health"),
            ("deleteSession", "/sessions/{sessionId}"),
        ]),
        tools,
        workflow: WORKFLOW.to_vec(),
        transport: "Streamable HTTP",
        usage: BTreeMap::from([
            ("connect", "POST /mcp"),
            ("stream", "GET /mcp"),
            ("terminate", "DELETE /mcp with Mcp-Session-Id"),
        ]),
    }
}
