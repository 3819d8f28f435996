//! Tool and resource registry.
//!
//! Populated once at startup, then shared read-only behind an `Arc`, so
//! lookups need no locking.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::protocol::{ResourceDefinition, ToolDefinition};
use crate::resources::{self, Resource};
use crate::tools::{self, Tool};

/// Insertion-ordered, name-indexed set of tools and resources.
#[derive(Default)]
pub struct Registry {
    tools: Vec<Arc<dyn Tool>>,
    tool_index: HashMap<String, usize>,
    resources: Vec<Arc<dyn Resource>>,
    resource_index: HashMap<String, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in tool and resource.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for tool in tools::builtin_tools() {
            registry.register_tool(tool);
        }
        for resource in resources::builtin_resources() {
            registry.register_resource(resource);
        }
        registry
    }

    /// Register a tool. A duplicate name replaces the earlier tool in place.
    pub fn register_tool(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        match self.tool_index.get(&name) {
            Some(&idx) => {
                warn!(tool = %name, "Tool registered twice, replacing");
                self.tools[idx] = tool;
            }
            None => {
                debug!(tool = %name, "Registered tool");
                self.tool_index.insert(name, self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    /// Register a resource. A duplicate URI replaces the earlier one in place.
    pub fn register_resource(&mut self, resource: Arc<dyn Resource>) {
        let uri = resource.uri().to_string();
        match self.resource_index.get(&uri) {
            Some(&idx) => {
                warn!(uri = %uri, "Resource registered twice, replacing");
                self.resources[idx] = resource;
            }
            None => {
                debug!(uri = %uri, "Registered resource");
                self.resource_index.insert(uri, self.resources.len());
                self.resources.push(resource);
            }
        }
    }

    pub fn tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tool_index
            .get(name)
            .map(|&idx| Arc::clone(&self.tools[idx]))
    }

    pub fn resource(&self, uri: &str) -> Option<Arc<dyn Resource>> {
        self.resource_index
            .get(uri)
            .map(|&idx| Arc::clone(&self.resources[idx]))
    }

    pub fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    pub fn resources(&self) -> &[Arc<dyn Resource>] {
        &self.resources
    }

    /// Tool definitions in registration order.
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    /// Resource definitions in registration order.
    pub fn resource_definitions(&self) -> Vec<ResourceDefinition> {
        self.resources.iter().map(|r| r.definition()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::AppContext;
    use async_trait::async_trait;
    use redmine_mcp_core::Result;
    use serde_json::{json, Value};

    struct NamedTool {
        name: &'static str,
        description: &'static str,
    }

    #[async_trait]
    impl Tool for NamedTool {
        fn name(&self) -> &'static str {
            self.name
        }

        fn description(&self) -> &'static str {
            self.description
        }

        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }

        async fn execute(&self, _ctx: &AppContext, _params: Value) -> Result<Value> {
            Ok(Value::Null)
        }
    }

    fn tool(name: &'static str, description: &'static str) -> Arc<dyn Tool> {
        Arc::new(NamedTool { name, description })
    }

    #[test]
    fn test_lookup_and_order() {
        let mut registry = Registry::new();
        registry.register_tool(tool("b", "second"));
        registry.register_tool(tool("a", "first"));

        let names: Vec<String> = registry
            .tool_definitions()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["b", "a"]);
        assert!(registry.tool("a").is_some());
        assert!(registry.tool("missing").is_none());
    }

    #[test]
    fn test_duplicate_overwrites_in_place() {
        let mut registry = Registry::new();
        registry.register_tool(tool("a", "old"));
        registry.register_tool(tool("b", "other"));
        registry.register_tool(tool("a", "new"));

        assert_eq!(registry.tools().len(), 2);
        let defs = registry.tool_definitions();
        assert_eq!(defs[0].name, "a");
        assert_eq!(defs[0].description, "new");
        assert_eq!(registry.tool("a").unwrap().description(), "new");
    }

    #[test]
    fn test_defaults() {
        let registry = Registry::with_defaults();

        for name in [
            "list_projects",
            "get_project",
            "list_issues",
            "get_issue",
            "create_issue",
            "update_issue",
            "delete_issue",
            "get_current_user",
            "list_users",
            "list_time_entries",
            "create_time_entry",
            "batch_execute",
        ] {
            assert!(registry.tool(name).is_some(), "missing tool {}", name);
        }

        for uri in [
            "redmine://projects",
            "redmine://trackers",
            "redmine://issue_statuses",
            "redmine://users/current",
        ] {
            assert!(registry.resource(uri).is_some(), "missing resource {}", uri);
        }

        let defs = registry.resource_definitions();
        assert!(defs.iter().all(|d| d.mime_type == "application/json"));
    }
}
