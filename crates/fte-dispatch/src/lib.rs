//! fte-dispatch: the line-delimited JSON tool dispatch engine shared by every DigitalFTE adapter.

pub mod dispatcher;
pub mod error;
pub mod framing;
pub mod handler;
pub mod registry;
pub mod schema;
pub mod types;

pub use dispatcher::Dispatcher;
pub use error::{DispatchError, DispatchResult};
pub use framing::{
    parse_request, parse_request_value, Frame, LineBuffer, MalformedPolicy, RequestFramer, DEFAULT_MAX_PENDING_BYTES,
};
pub use handler::{handler_fn, FnHandler, ToolError, ToolHandler, ToolResult};
pub use registry::{RegisteredTool, ToolRegistry};
pub use schema::validate_input;
pub use types::*;
