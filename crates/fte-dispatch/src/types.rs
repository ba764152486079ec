//! Core data types for tool descriptors, requests and responses.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Arbitrary JSON mapping used for tool input.
pub type JsonMap = serde_json::Map<String, Value>;

/// One exposed operation, as advertised in a tool catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }

    /// Names listed under `required` in the input schema.
    pub fn required_fields(&self) -> Vec<&str> {
        self.input_schema
            .get("required")
            .and_then(Value::as_array)
            .map(|fields| fields.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

/// One decoded input line.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub tool: String,
    pub input: JsonMap,
}

impl Request {
    pub fn new(tool: impl Into<String>, input: JsonMap) -> Self {
        Self {
            tool: tool.into(),
            input,
        }
    }
}

/// Result of handling one request.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Handler payload, written verbatim.
    Success(Value),
    /// Written as `{"error": "<message>"}`.
    Error(String),
}

impl Response {
    pub fn error(message: impl Into<String>) -> Self {
        Response::Error(message.into())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error(_))
    }

    pub fn to_value(&self) -> Value {
        match self {
            Response::Success(value) => value.clone(),
            Response::Error(message) => serde_json::json!({ "error": message }),
        }
    }

    /// Serialize as a single JSON line with trailing newline.
    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut line = match self {
            Response::Success(value) => serde_json::to_string(value)?,
            Response::Error(_) => serde_json::to_string(&self.to_value())?,
        };
        line.push('\n');
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_response_line() {
        let line = Response::error("Unknown tool: nope").to_line().unwrap();
        assert_eq!(line, "{\"error\":\"Unknown tool: nope\"}\n");
    }

    #[test]
    fn test_success_response_is_verbatim() {
        let payload = json!({"status": "posted", "nested": {"a": [1, 2]}});
        let response = Response::Success(payload.clone());
        assert_eq!(response.to_value(), payload);
        assert!(!response.is_error());
    }

    #[test]
    fn test_success_line_escapes_newlines() {
        let response = Response::Success(json!({"body": "line one\nline two"}));
        let line = response.to_line().unwrap();
        assert_eq!(line.matches('\n').count(), 1);
        assert!(line.ends_with('\n'));
    }

    #[test]
    fn test_descriptor_wire_shape() {
        let descriptor = ToolDescriptor::new(
            "post_tweet",
            "Post a tweet",
            json!({"type": "object", "required": ["text"]}),
        );
        let value = serde_json::to_value(&descriptor).unwrap();
        assert!(value.get("inputSchema").is_some());
        assert_eq!(descriptor.required_fields(), vec!["text"]);
    }
}
