//! Request-shape validation against a tool's declared input schema.
//!
//! Only the subset of JSON Schema the adapters publish is checked:
//! `required`, per-property `type`, `enum` and array `items.type`.
//! Properties the schema does not declare are accepted.

use serde_json::Value;

use crate::error::{DispatchError, DispatchResult};
use crate::types::{JsonMap, ToolDescriptor};

/// Validate `input` against `descriptor.input_schema`, reporting the first violation.
pub fn validate_input(descriptor: &ToolDescriptor, input: &JsonMap) -> DispatchResult<()> {
    let schema = &descriptor.input_schema;
    let violation = |field: &str, reason: String| DispatchError::Validation {
        tool: descriptor.name.clone(),
        field: field.to_string(),
        reason,
    };

    for field in descriptor.required_fields() {
        match input.get(field) {
            None | Some(Value::Null) => {
                return Err(violation(field, "is required".to_string()));
            }
            Some(_) => {}
        }
    }

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Ok(());
    };

    for (field, field_schema) in properties {
        let Some(value) = input.get(field) else {
            continue;
        };
        if value.is_null() {
            continue;
        }

        if let Some(expected) = field_schema.get("type").and_then(Value::as_str) {
            if !matches_type(value, expected) {
                return Err(violation(
                    field,
                    format!("must be of type {expected}, got {}", type_name(value)),
                ));
            }
        }

        if let Some(allowed) = field_schema.get("enum").and_then(Value::as_array) {
            if !allowed.contains(value) {
                let options: Vec<String> = allowed.iter().map(Value::to_string).collect();
                return Err(violation(
                    field,
                    format!("must be one of [{}]", options.join(", ")),
                ));
            }
        }

        if let (Some(items), Some(item_type)) = (
            value.as_array(),
            field_schema.get("items")
                .and_then(|i| i.get("type"))
                .and_then(Value::as_str),
        ) {
            if let Some(pos) = items.iter().position(|item| !matches_type(item, item_type)) {
                return Err(violation(
                    field,
                    format!("item {pos} must be of type {item_type}"),
                ));
            }
        }
    }

    Ok(())
}

fn matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        // Unrecognised type keywords are not enforced.
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn invoice_tool() -> ToolDescriptor {
        ToolDescriptor::new(
            "get_invoices",
            "Retrieve invoices",
            json!({
                "type": "object",
                "properties": {
                    "status": { "type": "string", "enum": ["DRAFT", "SUBMITTED", "AUTHORISED", "PAID"] },
                    "limit": { "type": "number", "default": 20 },
                    "tags": { "type": "array", "items": { "type": "string" } },
                    "contact": { "type": "string" }
                },
                "required": ["contact"]
            }),
        )
    }

    fn input(value: Value) -> JsonMap {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_valid_input_passes() {
        let ok = input(json!({"contact": "Acme", "status": "PAID", "limit": 5, "extra": true}));
        assert!(validate_input(&invoice_tool(), &ok).is_ok());
    }

    #[test]
    fn test_missing_required_field() {
        let err = validate_input(&invoice_tool(), &input(json!({}))).unwrap_err();
        match err {
            DispatchError::Validation { field, reason, .. } => {
                assert_eq!(field, "contact");
                assert_eq!(reason, "is required");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_null_required_field_is_missing() {
        let err = validate_input(&invoice_tool(), &input(json!({"contact": null}))).unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }

    #[test]
    fn test_wrong_type() {
        let err = validate_input(&invoice_tool(), &input(json!({"contact": "Acme", "limit": "ten"})))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid input for get_invoices: field 'limit' must be of type number, got string"
        );
    }

    #[test]
    fn test_enum_violation() {
        let err = validate_input(&invoice_tool(), &input(json!({"contact": "Acme", "status": "VOID"})))
            .unwrap_err();
        assert!(err.to_string().contains("field 'status' must be one of"));
    }

    #[test]
    fn test_array_item_type() {
        let err = validate_input(&invoice_tool(), &input(json!({"contact": "Acme", "tags": ["a", 2]})))
            .unwrap_err();
        assert!(err.to_string().contains("item 1 must be of type string"));
    }

    #[test]
    fn test_integer_rejects_fraction() {
        assert!(matches_type(&json!(3), "integer"));
        assert!(!matches_type(&json!(3.5), "integer"));
    }

    #[test]
    fn test_schema_without_properties() {
        let tool = ToolDescriptor::new("check_auth", "Verify token", json!({"type": "object"}));
        assert!(validate_input(&tool, &input(json!({"anything": 1}))).is_ok());
    }
}
