//! Schema - validation of JSON values against declared schemas
//!
//! Supports the JSON-schema subset used by capability descriptors and
//! structured backend outputs:
//! - `type` (single name or list of names)
//! - `properties`, `required`, `additionalProperties` (boolean)
//! - `items`, `minItems`, `maxItems`
//! - `enum`, `minLength`, `minimum`, `maximum`

use serde_json::{Map, Value};
use std::fmt;

/// A single validation failure, located by a JSON-pointer-like path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaError {
    /// Location of the offending value (`$` is the root)
    pub path: String,
    /// What was wrong
    pub message: String,
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

impl std::error::Error for SchemaError {}

/// Validate `value` against `schema`
pub fn validate(schema: &Value, value: &Value) -> Result<(), SchemaError> {
    validate_with(schema, value, &|_| false)
}

/// Validate `value` against `schema`, accepting any value for which `wildcard`
/// returns true regardless of the schema at that position
pub fn validate_with(
    schema: &Value,
    value: &Value,
    wildcard: &dyn Fn(&Value) -> bool,
) -> Result<(), SchemaError> {
    check(schema, value, "$", wildcard)
}

fn err(path: &str, message: impl Into<String>) -> SchemaError {
    SchemaError {
        path: path.to_string(),
        message: message.into(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "number" => value.is_number(),
        other => type_name(value) == other,
    }
}

fn check(
    schema: &Value,
    value: &Value,
    path: &str,
    wildcard: &dyn Fn(&Value) -> bool,
) -> Result<(), SchemaError> {
    if wildcard(value) {
        return Ok(());
    }
    let Some(schema) = schema.as_object() else {
        // `true` / `{}` style schemas accept everything
        return Ok(());
    };

    if let Some(expected) = schema.get("type") {
        let allowed: Vec<&str> = match expected {
            Value::String(s) => vec![s.as_str()],
            Value::Array(list) => list.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };
        if !allowed.is_empty() && !allowed.iter().any(|t| matches_type(t, value)) {
            return Err(err(
                path,
                format!("expected {}, found {}", allowed.join(" | "), type_name(value)),
            ));
        }
    }

    if let Some(Value::Array(options)) = schema.get("enum") {
        if !options.contains(value) {
            return Err(err(path, format!("value {} is not one of {:?}", value, options)));
        }
    }

    match value {
        Value::Object(map) => check_object(schema, map, path, wildcard)?,
        Value::Array(items) => check_array(schema, items, path, wildcard)?,
        Value::String(s) => {
            if let Some(min) = schema.get("minLength").and_then(Value::as_u64) {
                if (s.chars().count() as u64) < min {
                    return Err(err(path, format!("string shorter than {}", min)));
                }
            }
        }
        Value::Number(n) => {
            let Some(x) = n.as_f64() else {
                return Ok(());
            };
            if let Some(min) = schema.get("minimum").and_then(Value::as_f64) {
                if x < min {
                    return Err(err(path, format!("{} is below minimum {}", x, min)));
                }
            }
            if let Some(max) = schema.get("maximum").and_then(Value::as_f64) {
                if x > max {
                    return Err(err(path, format!("{} is above maximum {}", x, max)));
                }
            }
        }
        _ => {}
    }

    Ok(())
}

fn check_object(
    schema: &Map<String, Value>,
    map: &Map<String, Value>,
    path: &str,
    wildcard: &dyn Fn(&Value) -> bool,
) -> Result<(), SchemaError> {
    let properties = schema.get("properties").and_then(Value::as_object);

    if let Some(Value::Array(required)) = schema.get("required") {
        for name in required.iter().filter_map(Value::as_str) {
            if !map.contains_key(name) {
                return Err(err(path, format!("missing required field '{}'", name)));
            }
        }
    }

    let closed = matches!(schema.get("additionalProperties"), Some(Value::Bool(false)));
    for (key, child) in map {
        let child_path = format!("{}.{}", path, key);
        match properties.and_then(|p| p.get(key)) {
            Some(child_schema) => check(child_schema, child, &child_path, wildcard)?,
            None if closed => {
                return Err(err(&child_path, "unexpected field"));
            }
            None => {}
        }
    }
    Ok(())
}

fn check_array(
    schema: &Map<String, Value>,
    items: &[Value],
    path: &str,
    wildcard: &dyn Fn(&Value) -> bool,
) -> Result<(), SchemaError> {
    if let Some(min) = schema.get("minItems").and_then(Value::as_u64) {
        if (items.len() as u64) < min {
            return Err(err(path, format!("expected at least {} items", min)));
        }
    }
    if let Some(max) = schema.get("maxItems").and_then(Value::as_u64) {
        if (items.len() as u64) > max {
            return Err(err(path, format!("expected at most {} items", max)));
        }
    }
    if let Some(item_schema) = schema.get("items") {
        for (i, item) in items.iter().enumerate() {
            check(item_schema, item, &format!("{}[{}]", path, i), wildcard)?;
        }
    }
    Ok(())
}
