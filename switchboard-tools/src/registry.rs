//! Tool registry

use super::base::Tool;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of available tools
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create a new tool registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool with the same name
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::debug!("Tool {} replaced", name);
        }
    }

    /// Unregister a tool by name
    pub fn unregister(&mut self, name: &str) {
        self.tools.remove(name);
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Check if a tool is registered
    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Definitions of all tools, ordered by name
    pub fn definitions(&self) -> Vec<Value> {
        self.tool_names()
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.definition())
            .collect()
    }

    /// Execute a tool by name.
    ///
    /// Never fails: lookup, validation and execution errors come back as text
    /// the agent can read.
    pub async fn execute(&self, name: &str, params: Value) -> String {
        let tool = match self.tools.get(name) {
            Some(tool) => tool,
            None => return format!("Error: Tool '{}' not found", name),
        };

        let errors = tool.validate_params(&params);
        if !errors.is_empty() {
            return format!(
                "Error: Invalid parameters for tool '{}': {}",
                name,
                errors.join("; ")
            );
        }

        tracing::debug!("Executing tool {}", name);
        match tool.execute(params).await {
            Ok(result) => result,
            Err(e) => format!("Error executing {}: {}", name, e),
        }
    }

    /// Registered tool names, sorted
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Get number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{Result, ToolError};
    use async_trait::async_trait;

    struct MockTool {
        name: &'static str,
        fail: bool,
    }

    #[async_trait]
    impl Tool for MockTool {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "A mock tool"
        }

        fn parameters(&self) -> Value {
            serde_json::json!({
                "type": "object",
                "properties": {"input": {"type": "string"}},
                "required": ["input"]
            })
        }

        async fn execute(&self, _args: Value) -> Result<String> {
            if self.fail {
                return Err(ToolError::ExecutionFailed("boom".to_string()));
            }
            Ok("mock result".to_string())
        }
    }

    fn mock(name: &'static str) -> Arc<dyn Tool> {
        Arc::new(MockTool { name, fail: false })
    }

    #[test]
    fn test_register_and_unregister() {
        let mut registry = ToolRegistry::new();
        registry.register(mock("mock"));
        assert_eq!(registry.len(), 1);
        assert!(registry.has("mock"));

        registry.unregister("mock");
        assert!(registry.is_empty());
        assert!(registry.get("mock").is_none());
    }

    #[test]
    fn test_names_and_definitions_are_sorted() {
        let mut registry = ToolRegistry::new();
        registry.register(mock("zeta"));
        registry.register(mock("alpha"));

        assert_eq!(registry.tool_names(), vec!["alpha", "zeta"]);
        let definitions = registry.definitions();
        let names: Vec<&str> = definitions
            .iter()
            .filter_map(|d| d["name"].as_str())
            .collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[tokio::test]
    async fn test_execute_reports_errors_as_text() {
        let mut registry = ToolRegistry::new();
        registry.register(mock("mock"));
        registry.register(Arc::new(MockTool {
            name: "broken",
            fail: true,
        }));

        let ok = registry
            .execute("mock", serde_json::json!({"input": "x"}))
            .await;
        assert_eq!(ok, "mock result");

        let missing = registry.execute("nope", serde_json::json!({})).await;
        assert_eq!(missing, "Error: Tool 'nope' not found");

        let invalid = registry.execute("mock", serde_json::json!({})).await;
        assert!(invalid.contains("Missing required field: input"));

        let failed = registry
            .execute("broken", serde_json::json!({"input": "x"}))
            .await;
        assert_eq!(failed, "Error executing broken: Execution failed: boom");
    }
}
