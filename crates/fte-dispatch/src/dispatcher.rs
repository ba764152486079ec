//! Request dispatcher: resolves a request to its handler and produces exactly one response.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tracing::Instrument;

use crate::error::DispatchError;
use crate::framing::Frame;
use crate::registry::ToolRegistry;
use crate::schema::validate_input;
use crate::types::{Request, Response};

/// Routes decoded requests to registered handlers.
///
/// Every failure is converted into an error [`Response`] here; nothing a
/// handler does can escape this boundary.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    validate: bool,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            validate: true,
        }
    }

    /// Toggle input-schema validation before handler invocation.
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.validate = enabled;
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn validates(&self) -> bool {
        self.validate
    }

    pub async fn dispatch_frame(&self, frame: Frame) -> Response {
        match frame {
            Frame::Request(request) => self.dispatch(request).await,
            Frame::Malformed(e) => {
                tracing::warn!(kind = e.kind(), "{e}");
                Response::error(e.to_string())
            }
        }
    }

    pub async fn dispatch(&self, request: Request) -> Response {
        let span = tracing::info_span!("dispatch", tool = %request.tool);
        self.dispatch_inner(request).instrument(span).await
    }

    async fn dispatch_inner(&self, request: Request) -> Response {
        let tool = match self.registry.resolve(&request.tool) {
            Ok(tool) => tool,
            Err(e) => {
                tracing::warn!(kind = e.kind(), "{e}");
                return Response::error(e.to_string());
            }
        };

        if self.validate {
            if let Err(e) = validate_input(&tool.descriptor, &request.input) {
                tracing::warn!(kind = e.kind(), "{e}");
                return Response::error(e.to_string());
            }
        }

        let started = Instant::now();
        let outcome = AssertUnwindSafe(tool.handler.call(request.input))
            .catch_unwind()
            .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(value)) => {
                tracing::debug!(elapsed_ms, "Tool completed");
                Response::Success(value)
            }
            Ok(Err(e)) => {
                tracing::warn!(elapsed_ms, "Tool returned error: {e}");
                Response::error(e.to_string())
            }
            Err(panic) => {
                let e = DispatchError::Handler(panic_message(panic.as_ref()));
                tracing::error!(elapsed_ms, kind = e.kind(), "Tool panicked: {e}");
                Response::error(e.to_string())
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{handler_fn, ToolError};
    use crate::types::{JsonMap, ToolDescriptor};
    use serde_json::{json, Value};

    fn dispatcher() -> Dispatcher {
        let mut registry = ToolRegistry::new();
        registry
            .register(
                ToolDescriptor::new(
                    "echo",
                    "Echo input",
                    json!({
                        "type": "object",
                        "properties": { "text": { "type": "string" } },
                        "required": ["text"]
                    }),
                ),
                handler_fn(|input: JsonMap| async move { Ok(json!({ "echo": input })) }),
            )
            .unwrap();
        registry
            .register(
                ToolDescriptor::new("reject", "Always rejects", json!({"type": "object"})),
                handler_fn(|_input: JsonMap| async {
                    Err(ToolError::rejected("Tweet must be 1-280 characters"))
                }),
            )
            .unwrap();
        registry
            .register(
                ToolDescriptor::new("fail", "Always fails", json!({"type": "object"})),
                handler_fn(|_input: JsonMap| async { Err(ToolError::failed("connection refused")) }),
            )
            .unwrap();
        registry
            .register(
                ToolDescriptor::new("boom", "Panics", json!({"type": "object"})),
                handler_fn(|_input: JsonMap| async {
                    if true {
                        panic!("kaboom");
                    }
                    Ok(Value::Null)
                }),
            )
            .unwrap();
        Dispatcher::new(Arc::new(registry))
    }

    fn request(tool: &str, input: Value) -> Request {
        Request::new(tool, input.as_object().cloned().unwrap_or_default())
    }

    fn run(d: &Dispatcher, req: Request) -> Response {
        tokio_test::block_on(d.dispatch(req))
    }

    #[test]
    fn test_success_is_verbatim() {
        let response = run(&dispatcher(), request("echo", json!({"text": "hi"})));
        assert_eq!(response, Response::Success(json!({"echo": {"text": "hi"}})));
    }

    #[test]
    fn test_unknown_tool() {
        let response = run(&dispatcher(), request("nonexistent_tool", json!({})));
        assert_eq!(response.to_value(), json!({"error": "Unknown tool: nonexistent_tool"}));
    }

    #[test]
    fn test_rejection_is_verbatim() {
        let response = run(&dispatcher(), request("reject", json!({})));
        assert_eq!(response.to_value(), json!({"error": "Tweet must be 1-280 characters"}));
    }

    #[test]
    fn test_failure_is_prefixed() {
        let response = run(&dispatcher(), request("fail", json!({})));
        assert_eq!(
            response.to_value(),
            json!({"error": "Tool execution failed: connection refused"})
        );
    }

    #[test]
    fn test_panic_is_contained() {
        let d = dispatcher();
        let response = run(&d, request("boom", json!({})));
        assert_eq!(
            response.to_value(),
            json!({"error": "Tool execution failed: kaboom"})
        );

        // The dispatcher keeps working afterwards.
        let response = run(&d, request("echo", json!({"text": "still here"})));
        assert!(!response.is_error());
    }

    #[test]
    fn test_validation_runs_before_handler() {
        let response = run(&dispatcher(), request("echo", json!({"text": 5})));
        assert_eq!(
            response.to_value(),
            json!({"error": "Invalid input for echo: field 'text' must be of type string, got number"})
        );
    }

    #[test]
    fn test_validation_can_be_disabled() {
        let d = dispatcher().with_validation(false);
        assert!(!d.validates());
        let response = run(&d, request("echo", json!({})));
        assert_eq!(response, Response::Success(json!({"echo": {}})));
    }

    #[test]
    fn test_malformed_frame() {
        let frame = Frame::Malformed(DispatchError::MalformedRequest("missing 'tool' field".into()));
        let response = tokio_test::block_on(dispatcher().dispatch_frame(frame));
        assert_eq!(
            response.to_value(),
            json!({"error": "Malformed request: missing 'tool' field"})
        );
    }

    #[test]
    fn test_dispatch_is_deterministic() {
        let d = dispatcher();
        let a = run(&d, request("echo", json!({"text": "same"})));
        let b = run(&d, request("echo", json!({"text": "same"})));
        assert_eq!(a, b);
    }
}
