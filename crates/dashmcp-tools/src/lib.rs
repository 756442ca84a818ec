pub mod client;
pub mod registry;
pub mod tools;

pub use client::DashboardClient;
pub use registry::ToolRegistry;

use std::sync::Arc;

/// Registry holding every dashboard tool, backed by one shared client.
pub fn dashboard_registry(client: Arc<DashboardClient>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(tools::GetTestTemplatesTool::new(Arc::clone(&client))));
    registry.register(Arc::new(tools::StartTestTool::new(Arc::clone(&client))));
    registry.register(Arc::new(tools::GetApiCollectionsTool::new(client)));
    registry
}
