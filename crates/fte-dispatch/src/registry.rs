//! Tool registration and lookup.
//!
//! A registry is filled once at startup and only read afterwards, so it is
//! shared behind an `Arc` without locking.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{DispatchError, DispatchResult};
use crate::handler::ToolHandler;
use crate::types::ToolDescriptor;

/// A descriptor paired with its handler.
#[derive(Clone)]
pub struct RegisteredTool {
    pub descriptor: ToolDescriptor,
    pub handler: Arc<dyn ToolHandler>,
}

impl std::fmt::Debug for RegisteredTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredTool")
            .field("name", &self.descriptor.name)
            .finish_non_exhaustive()
    }
}

/// Ordered collection of tools keyed by name.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        descriptor: ToolDescriptor,
        handler: impl ToolHandler + 'static,
    ) -> DispatchResult<()> {
        self.register_arc(descriptor, Arc::new(handler))
    }

    pub fn register_arc(
        &mut self,
        descriptor: ToolDescriptor,
        handler: Arc<dyn ToolHandler>,
    ) -> DispatchResult<()> {
        if self.index.contains_key(&descriptor.name) {
            return Err(DispatchError::DuplicateTool(descriptor.name));
        }

        tracing::debug!(tool = %descriptor.name, "Registered tool");
        self.index.insert(descriptor.name.clone(), self.tools.len());
        self.tools.push(RegisteredTool {
            descriptor,
            handler,
        });
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> DispatchResult<&RegisteredTool> {
        self.index
            .get(name)
            .map(|&i| &self.tools[i])
            .ok_or_else(|| DispatchError::UnknownTool(name.to_string()))
    }

    /// Descriptors in registration order.
    pub fn list(&self) -> Vec<&ToolDescriptor> {
        self.tools.iter().map(|t| &t.descriptor).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.descriptor.name.as_str()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use crate::types::JsonMap;
    use serde_json::{json, Value};

    fn descriptor(name: &str) -> ToolDescriptor {
        ToolDescriptor::new(name, format!("{name} tool"), json!({"type": "object"}))
    }

    fn noop() -> impl ToolHandler {
        handler_fn(|_input: JsonMap| async { Ok(Value::Null) })
    }

    #[test]
    fn test_register_and_resolve() {
        let mut registry = ToolRegistry::new();
        registry.register(descriptor("post_tweet"), noop()).unwrap();

        let tool = registry.resolve("post_tweet").unwrap();
        assert_eq!(tool.descriptor.name, "post_tweet");
        assert!(registry.contains("post_tweet"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(descriptor("get_balance"), noop()).unwrap();
        let err = registry
            .register(descriptor("get_balance"), noop())
            .unwrap_err();
        assert_eq!(err, DispatchError::DuplicateTool("get_balance".into()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry.resolve("nonexistent_tool").unwrap_err();
        assert_eq!(err.to_string(), "Unknown tool: nonexistent_tool");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_list_keeps_registration_order() {
        let mut registry = ToolRegistry::new();
        for name in ["send_email", "get_emails", "delete_email", "mark_read"] {
            registry.register(descriptor(name), noop()).unwrap();
        }
        assert_eq!(
            registry.names(),
            vec!["send_email", "get_emails", "delete_email", "mark_read"]
        );
        assert_eq!(registry.list()[2].name, "delete_email");
    }
}
