//! Server identity and catalog summaries.

use serde::Serialize;

use fte_dispatch::ToolRegistry;

pub const SERVER_NAME: &str = "fte-mcp";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// One adapter's published catalog, as printed by `fte-mcp info`.
#[derive(Debug, Clone, Serialize)]
pub struct AdapterSummary {
    pub adapter: String,
    pub tools: Vec<String>,
    pub tool_count: usize,
}

impl AdapterSummary {
    pub fn new(adapter: &str, registry: &ToolRegistry) -> Self {
        let tools: Vec<String> = registry.names().into_iter().map(str::to_string).collect();
        Self {
            adapter: adapter.to_string(),
            tool_count: tools.len(),
            tools,
        }
    }
}
