//! Parameter checks against a tool's JSON-Schema-like `input_schema`.
//!
//! Covers the subset the tools declare: object shape, `required`, primitive
//! `type` (including unions), `enum`, and numeric `minimum`/`maximum`.

use redmine_mcp_core::{Error, Result};
use serde_json::{Map, Value};

/// Validate `params` against `schema`.
pub fn validate(schema: &Value, params: &Value) -> Result<()> {
    let Some(params) = params.as_object() else {
        return Err(Error::InvalidParams(
            "Parameters must be an object".to_string(),
        ));
    };

    let missing: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .filter(|key| params.get(*key).map_or(true, Value::is_null))
        .collect();
    if !missing.is_empty() {
        return Err(Error::InvalidParams(format!(
            "Missing required parameters: {}",
            missing.join(", ")
        )));
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        check_properties(properties, params)?;
    }

    Ok(())
}

fn check_properties(properties: &Map<String, Value>, params: &Map<String, Value>) -> Result<()> {
    for (key, value) in params {
        // Null means "not given"
        if value.is_null() {
            continue;
        }
        let Some(property) = properties.get(key) else {
            continue;
        };

        if let Some(expected) = property.get("type") {
            if !matches_type(expected, value) {
                return Err(Error::InvalidParams(format!(
                    "Invalid type for parameter '{}': expected {}",
                    key,
                    describe_type(expected)
                )));
            }
        }

        if let Some(allowed) = property.get("enum").and_then(Value::as_array) {
            if !allowed.contains(value) {
                return Err(Error::InvalidParams(format!(
                    "Invalid value for parameter '{}': must be one of {}",
                    key,
                    Value::Array(allowed.clone())
                )));
            }
        }

        if let Some(n) = value.as_f64() {
            if let Some(min) = property.get("minimum").and_then(Value::as_f64) {
                if n < min {
                    return Err(Error::InvalidParams(format!(
                        "Parameter '{}' must be >= {}",
                        key, min
                    )));
                }
            }
            if let Some(max) = property.get("maximum").and_then(Value::as_f64) {
                if n > max {
                    return Err(Error::InvalidParams(format!(
                        "Parameter '{}' must be <= {}",
                        key, max
                    )));
                }
            }
        }
    }
    Ok(())
}

fn matches_type(expected: &Value, value: &Value) -> bool {
    match expected {
        Value::String(name) => matches_type_name(name, value),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .any(|name| matches_type_name(name, value)),
        // Unknown schema shape, accept
        _ => true,
    }
}

fn matches_type_name(name: &str, value: &Value) -> bool {
    match name {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn describe_type(expected: &Value) -> String {
    match expected {
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" or "),
        Value::String(name) => name.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "required": ["id", "subject"],
            "properties": {
                "id": {"type": ["string", "integer"]},
                "subject": {"type": "string"},
                "limit": {"type": "integer", "minimum": 1, "maximum": 100},
                "hours": {"type": "number"},
                "status": {"type": "string", "enum": ["open", "closed"]}
            }
        })
    }

    fn message(err: Error) -> String {
        err.user_message()
    }

    #[test]
    fn test_valid_params() {
        assert!(validate(&schema(), &json!({"id": 1, "subject": "x"})).is_ok());
        assert!(validate(&schema(), &json!({"id": "proj", "subject": "x", "hours": 1})).is_ok());
        assert!(validate(&schema(), &json!({"id": 1, "subject": "x", "limit": null})).is_ok());
    }

    #[test]
    fn test_missing_required() {
        let err = validate(&schema(), &json!({"subject": null})).unwrap_err();
        assert_eq!(err.error_type(), "InvalidParams");
        assert_eq!(message(err), "Missing required parameters: id, subject");
    }

    #[test]
    fn test_type_mismatch() {
        let err = validate(&schema(), &json!({"id": true, "subject": "x"})).unwrap_err();
        assert_eq!(
            message(err),
            "Invalid type for parameter 'id': expected string or integer"
        );

        let err = validate(&schema(), &json!({"id": 1, "subject": "x", "limit": 2.5})).unwrap_err();
        assert!(message(err).contains("expected integer"));
    }

    #[test]
    fn test_bounds_and_enum() {
        let err = validate(&schema(), &json!({"id": 1, "subject": "x", "limit": 0})).unwrap_err();
        assert_eq!(message(err), "Parameter 'limit' must be >= 1");

        let err =
            validate(&schema(), &json!({"id": 1, "subject": "x", "limit": 101})).unwrap_err();
        assert_eq!(message(err), "Parameter 'limit' must be <= 100");

        let err =
            validate(&schema(), &json!({"id": 1, "subject": "x", "status": "gone"})).unwrap_err();
        assert!(message(err).starts_with("Invalid value for parameter 'status'"));
    }

    #[test]
    fn test_non_object_params() {
        assert!(validate(&schema(), &json!([1, 2])).is_err());
    }
}
