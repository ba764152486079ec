//! Error taxonomy for the dispatch engine.

/// Stable taxonomy codes, used in diagnostics.
pub mod error_kinds {
    pub const DUPLICATE_TOOL: &str = "duplicate_tool";
    pub const UNKNOWN_TOOL: &str = "unknown_tool";
    pub const MALFORMED_REQUEST: &str = "malformed_request";
    pub const VALIDATION_ERROR: &str = "validation_error";
    pub const HANDLER_ERROR: &str = "handler_error";
    pub const FATAL_STARTUP: &str = "fatal_startup";
}

/// All errors the dispatch engine distinguishes.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    #[error("Tool already registered: {0}")]
    DuplicateTool(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Invalid input for {tool}: field '{field}' {reason}")]
    Validation {
        tool: String,
        field: String,
        reason: String,
    },

    #[error("Tool execution failed: {0}")]
    Handler(String),

    #[error("Startup failed: {0}")]
    FatalStartup(String),
}

impl DispatchError {
    pub fn kind(&self) -> &'static str {
        use error_kinds::*;
        match self {
            DispatchError::DuplicateTool(_) => DUPLICATE_TOOL,
            DispatchError::UnknownTool(_) => UNKNOWN_TOOL,
            DispatchError::MalformedRequest(_) => MALFORMED_REQUEST,
            DispatchError::Validation { .. } => VALIDATION_ERROR,
            DispatchError::Handler(_) => HANDLER_ERROR,
            DispatchError::FatalStartup(_) => FATAL_STARTUP,
        }
    }

    /// Per-request errors are answered on the output stream; the rest end the process.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            DispatchError::DuplicateTool(_) | DispatchError::FatalStartup(_)
        )
    }
}

pub type DispatchResult<T> = Result<T, DispatchError>;
