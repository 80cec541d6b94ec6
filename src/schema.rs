//! # JSON-Schema → Tool-Input Bridge
//!
//! Tool parameter schemas arrive from several places: hand-written
//! `serde_json::json!` objects, the fluent `ToolBuilder` in `crate::tools`,
//! and MCP servers (whose `inputSchema` may use constructs this runtime's
//! wire format doesn't need, like a `type` array). This module normalizes all
//! three into the single canonical JSON-Schema object object the
//! request body of §6.1 expects: `{"type":"object","properties":{...},
//! "required":[...]}`.

use serde_json::{Map, Value};

/// A parameter type for the fluent tool builder (`crate::tools::ToolBuilder`).
/// Mirrors the small set of JSON-Schema primitive types the teacher's builder
/// supported, plus `Array`/`Object` for tools that take structured input.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamType {
    String,
    Number,
    Integer,
    Boolean,
    Array(Box<ParamType>),
    Object,
}

impl ParamType {
    fn json_type(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
            ParamType::Array(_) => "array",
            ParamType::Object => "object",
        }
    }

    fn to_schema(&self) -> Value {
        match self {
            ParamType::Array(inner) => serde_json::json!({
                "type": "array",
                "items": inner.to_schema(),
            }),
            other => serde_json::json!({ "type": other.json_type() }),
        }
    }
}

/// A single parameter definition, as produced by `ToolBuilder::param`.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamType,
    pub description: String,
    pub required: bool,
    pub default: Option<Value>,
}

/// Build a canonical JSON-Schema object from a list of parameter specs, the
/// way `ToolBuilder::build` does for hand-declared tools.
pub fn schema_from_params(params: &[ParamSpec]) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for p in params {
        let mut prop = p.kind.to_schema();
        if let Value::Object(ref mut obj) = prop {
            obj.insert("description".to_string(), Value::String(p.description.clone()));
            if let Some(default) = &p.default {
                obj.insert("default".to_string(), default.clone());
            }
        }
        properties.insert(p.name.clone(), prop);
        if p.required {
            required.push(Value::String(p.name.clone()));
        }
    }

    serde_json::json!({
        "type": "object",
        "properties": Value::Object(properties),
        "required": Value::Array(required),
    })
}

/// Normalize an arbitrary JSON-Schema object into the canonical wire shape.
///
/// Applied to every schema before it crosses a boundary (sent to the
/// runtime endpoint in `tools[]`, or received from an MCP server's
/// `tools/list`). Normalization is intentionally narrow — it does not
/// attempt full JSON-Schema validation, only the shape guarantees this
/// runtime's wire protocol relies on:
///
/// 1. `type` must be a single string, not an array (MCP servers sometimes
///    send `"type": ["object", "null"]`; the first non-null entry wins, or
///    `"object"` if none remain).
/// 2. `properties` defaults to an empty object if absent.
/// 3. `required` defaults to an empty array if absent, and any entries not
///    present in `properties` are dropped (a schema can't require a
///    property it doesn't define).
pub fn normalize_schema(mut schema: Value) -> Value {
    let obj = match schema.as_object_mut() {
        Some(obj) => obj,
        None => {
            let mut fresh = Map::new();
            fresh.insert("type".to_string(), Value::String("object".to_string()));
            fresh.insert("properties".to_string(), Value::Object(Map::new()));
            fresh.insert("required".to_string(), Value::Array(Vec::new()));
            return Value::Object(fresh);
        }
    };

    match obj.get("type").cloned() {
        Some(Value::Array(types)) => {
            let resolved = types
                .into_iter()
                .find(|t| !matches!(t, Value::Null) && t.as_str() != Some("null"))
                .unwrap_or_else(|| Value::String("object".to_string()));
            obj.insert("type".to_string(), resolved);
        }
        Some(Value::String(_)) => {}
        _ => {
            obj.insert("type".to_string(), Value::String("object".to_string()));
        }
    }

    if !obj.contains_key("properties") {
        obj.insert("properties".to_string(), Value::Object(Map::new()));
    }

    let known_props: Vec<String> = obj
        .get("properties")
        .and_then(|v| v.as_object())
        .map(|m| m.keys().cloned().collect())
        .unwrap_or_default();

    let required = obj
        .get("required")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str())
                .filter(|name| known_props.iter().any(|k| k == name))
                .map(|s| Value::String(s.to_string()))
                .collect()
        })
        .unwrap_or_else(Vec::new);
    obj.insert("required".to_string(), Value::Array(required));

    schema
}
