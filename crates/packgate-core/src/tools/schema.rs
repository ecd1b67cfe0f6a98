//! Argument validation against a JSON-Schema-like object.
//!
//! Supports the subset tool schemas use: `type`, `properties`, `required`,
//! `enum`, `additionalProperties` (boolean or schema), and string length
//! bounds.

use serde_json::{Map, Value};

/// Validate tool arguments against `schema`.
///
/// Returns a human-readable reason on the first violation.
pub fn validate_args(schema: &Value, args: &Map<String, Value>) -> Result<(), String> {
    let Some(schema) = schema.as_object() else {
        return Ok(());
    };
    if let Some(expected) = schema.get("type")
        && !type_matches(expected, &Value::Object(Map::new()))
    {
        return Err(format!("arguments must be of type {expected}"));
    }

    let properties = schema.get("properties").and_then(Value::as_object);

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for key in required.iter().filter_map(Value::as_str) {
            if !args.contains_key(key) {
                return Err(format!("'{key}' is a required property"));
            }
        }
    }

    for (key, value) in args {
        match properties.and_then(|props| props.get(key)) {
            Some(prop) => validate_value(key, prop, value)?,
            None => match schema.get("additionalProperties") {
                Some(Value::Bool(false)) => {
                    return Err(format!(
                        "Additional properties are not allowed ('{key}' was unexpected)"
                    ));
                }
                Some(extra @ Value::Object(_)) => validate_value(key, extra, value)?,
                _ => {}
            },
        }
    }
    Ok(())
}

fn validate_value(key: &str, schema: &Value, value: &Value) -> Result<(), String> {
    if let Some(expected) = schema.get("type")
        && !type_matches(expected, value)
    {
        return Err(format!("{value} is not of type {expected} (property '{key}')"));
    }
    if let Some(allowed) = schema.get("enum").and_then(Value::as_array)
        && !allowed.contains(value)
    {
        let allowed: Vec<String> = allowed.iter().map(Value::to_string).collect();
        return Err(format!(
            "{value} is not one of [{}] (property '{key}')",
            allowed.join(", ")
        ));
    }
    if let Some(s) = value.as_str() {
        let len = s.chars().count() as u64;
        if let Some(min) = schema.get("minLength").and_then(Value::as_u64)
            && len < min
        {
            return Err(format!("{value} is shorter than {min} (property '{key}')"));
        }
        if let Some(max) = schema.get("maxLength").and_then(Value::as_u64)
            && len > max
        {
            return Err(format!("{value} is longer than {max} (property '{key}')"));
        }
    }
    Ok(())
}

/// `expected` is a type name or an array of type names.
fn type_matches(expected: &Value, value: &Value) -> bool {
    match expected {
        Value::String(name) => is_type(name, value),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .any(|name| is_type(name, value)),
        _ => true,
    }
}

fn is_type(name: &str, value: &Value) -> bool {
    match name {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "timeframe": {"type": "string", "enum": ["24h", "7d"]},
                "limit": {"type": "integer"},
                "service": {"type": ["string", "null"], "minLength": 2}
            },
            "required": ["timeframe"],
            "additionalProperties": false
        })
    }

    #[test]
    fn test_valid_args() {
        assert!(validate_args(&schema(), &args(json!({"timeframe": "24h", "limit": 3}))).is_ok());
        assert!(validate_args(&schema(), &args(json!({"timeframe": "7d", "service": null}))).is_ok());
    }

    #[test]
    fn test_unknown_property_rejected() {
        let err = validate_args(&schema(), &args(json!({"timeframe": "24h", "bogus": 1}))).unwrap_err();
        assert!(err.contains("'bogus' was unexpected"), "{err}");
    }

    #[test]
    fn test_missing_required() {
        let err = validate_args(&schema(), &Map::new()).unwrap_err();
        assert_eq!(err, "'timeframe' is a required property");
    }

    #[test]
    fn test_wrong_type_and_enum() {
        let err = validate_args(&schema(), &args(json!({"timeframe": "24h", "limit": "x"}))).unwrap_err();
        assert!(err.contains("is not of type"), "{err}");
        let err = validate_args(&schema(), &args(json!({"timeframe": "1y"}))).unwrap_err();
        assert!(err.contains("is not one of"), "{err}");
        let err = validate_args(&schema(), &args(json!({"timeframe": "24h", "limit": 1.5}))).unwrap_err();
        assert!(err.contains("integer"), "{err}");
    }

    #[test]
    fn test_string_length_bound() {
        let err = validate_args(&schema(), &args(json!({"timeframe": "24h", "service": "a"}))).unwrap_err();
        assert!(err.contains("shorter than 2"), "{err}");
    }

    #[test]
    fn test_open_schema_accepts_extras() {
        let open = json!({"type": "object", "properties": {}});
        assert!(validate_args(&open, &args(json!({"anything": [1, 2]}))).is_ok());

        let typed_extras = json!({"type": "object", "additionalProperties": {"type": "string"}});
        assert!(validate_args(&typed_extras, &args(json!({"a": "b"}))).is_ok());
        assert!(validate_args(&typed_extras, &args(json!({"a": 1}))).is_err());
    }

    #[test]
    fn test_non_object_schema_type_rejects_everything() {
        let bad = json!({"type": "string"});
        assert!(validate_args(&bad, &Map::new()).is_err());
    }
}
