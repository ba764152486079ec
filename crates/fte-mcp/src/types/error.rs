//! Error types for the adapter server.

use fte_dispatch::DispatchError;

/// All errors that end or prevent a server run.
#[derive(thiserror::Error, Debug)]
pub enum McpError {
    /// A registry or dispatcher could not be built.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Input ended with text that does not decode as a request.
    #[error("Invalid trailing input: {0}")]
    TrailingInput(DispatchError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl McpError {
    /// Taxonomy code for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            McpError::Dispatch(e) | McpError::TrailingInput(e) => e.kind(),
            McpError::Config(_) => fte_dispatch::error::error_kinds::FATAL_STARTUP,
            McpError::Transport(_) | McpError::Io(_) => "transport_error",
            McpError::Json(_) => "serialization_error",
        }
    }
}

pub type McpResult<T> = Result<T, McpError>;
