//! The handler contract every tool implements.

use std::future::Future;

use async_trait::async_trait;
use serde_json::Value;

use crate::types::JsonMap;

/// Failure reported by a tool handler.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    /// The tool refused the input on its own rules. The message is returned verbatim.
    #[error("{0}")]
    Rejected(String),

    /// The input could not be decoded into the tool's parameters.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Execution fault: network, vendor API, missing credential.
    #[error("Tool execution failed: {0}")]
    Failed(String),
}

impl ToolError {
    pub fn rejected(message: impl Into<String>) -> Self {
        ToolError::Rejected(message.into())
    }

    pub fn failed(message: impl std::fmt::Display) -> Self {
        ToolError::Failed(message.to_string())
    }
}

impl From<serde_json::Error> for ToolError {
    fn from(e: serde_json::Error) -> Self {
        ToolError::InvalidInput(e.to_string())
    }
}

pub type ToolResult = Result<Value, ToolError>;

/// A named operation's implementation: `handle(input) -> result`.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, input: JsonMap) -> ToolResult;
}

/// Adapts an async closure into a [`ToolHandler`].
pub struct FnHandler<F> {
    f: F,
}

/// Wrap `f` so it can be registered as a handler.
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(JsonMap) -> Fut + Send + Sync,
    Fut: Future<Output = ToolResult> + Send,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(JsonMap) -> Fut + Send + Sync,
    Fut: Future<Output = ToolResult> + Send,
{
    async fn call(&self, input: JsonMap) -> ToolResult {
        (self.f)(input).await
    }
}
