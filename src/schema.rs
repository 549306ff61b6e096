//! JSON-Schema dialect normalizer.
//!
//! Tool parameter schemas are carried as a dialect-agnostic [`serde_json::Value`]
//! (see [`crate::messages::openai::JsonSchema`]) everywhere in the kernel; this
//! module is the only place that knows how A, O, and G disagree about shape.

use serde_json::{Map, Value};

/// Destination dialect a schema is being normalized for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaDialect {
    Anthropic,
    OpenAi,
    Google,
}

/// Normalize `schema` in place for `dialect`, recursing through `properties`,
/// `items`, and the `anyOf`/`oneOf`/`allOf` combinators. Unknown keys are left
/// untouched at every level.
pub fn normalize(schema: &mut Value, dialect: SchemaDialect) {
    let Some(obj) = schema.as_object_mut() else {
        return;
    };

    match dialect {
        SchemaDialect::OpenAi => normalize_for_openai(obj),
        SchemaDialect::Google => normalize_for_google(obj),
        SchemaDialect::Anthropic => {}
    }

    recurse(obj, dialect);
}

fn recurse(obj: &mut Map<String, Value>, dialect: SchemaDialect) {
    if let Some(properties) = obj.get_mut("properties").and_then(Value::as_object_mut) {
        for (_, prop) in properties.iter_mut() {
            normalize(prop, dialect);
        }
    }

    if let Some(items) = obj.get_mut("items") {
        normalize(items, dialect);
    }

    for combinator in ["anyOf", "oneOf", "allOf"] {
        if let Some(variants) = obj.get_mut(combinator).and_then(Value::as_array_mut) {
            for variant in variants.iter_mut() {
                normalize(variant, dialect);
            }
        }
    }
}

/// Several OpenAI-compatible providers reject `exclusiveMinimum`/`exclusiveMaximum`
/// as numeric bounds (the JSON-Schema-2020-12 dialect expects them as booleans
/// paired with `minimum`/`maximum`, and many providers implement neither); folding
/// them into plain `minimum`/`maximum` is accepted everywhere.
fn normalize_for_openai(obj: &mut Map<String, Value>) {
    if let Some(value) = obj.remove("exclusiveMinimum") {
        obj.entry("minimum").or_insert(value);
    }
    if let Some(value) = obj.remove("exclusiveMaximum") {
        obj.entry("maximum").or_insert(value);
    }
}

/// Gemini represents `type` as an uppercase enum and rejects a handful of
/// fields outright; ungrounded/unknown `type` strings are upper-cased
/// literally rather than dropped, since the destination still expects some
/// string for the field.
fn normalize_for_google(obj: &mut Map<String, Value>) {
    if let Some(Value::String(type_str)) = obj.get_mut("type") {
        *type_str = type_str.to_ascii_uppercase();
    }

    obj.remove("additionalProperties");
    obj.remove("$schema");
    obj.remove("default");

    let is_string_type = matches!(obj.get("type"), Some(Value::String(t)) if t == "STRING");
    if is_string_type {
        let keep = matches!(obj.get("format"), Some(Value::String(f)) if f == "enum" || f == "date-time");
        if !keep {
            obj.remove("format");
        }
    }
}

/// Whether a schema has no meaningful content worth sending (no `properties`,
/// no `required`). Used to decide between omitting `parameters` entirely (A)
/// and emitting an empty object schema (O, G).
pub fn is_empty_schema(schema: &Value) -> bool {
    let Some(obj) = schema.as_object() else {
        return true;
    };
    !obj.contains_key("properties") && !obj.contains_key("required")
}

/// An empty object schema, used where the destination requires `parameters`
/// to be present even when the source tool takes no arguments.
pub fn empty_object_schema() -> Value {
    serde_json::json!({"type": "object"})
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn google_uppercases_type_and_strips_unsupported_fields() {
        let mut schema = json!({
            "type": "object",
            "additionalProperties": false,
            "$schema": "http://json-schema.org/draft-07/schema#",
            "properties": {
                "name": {"type": "string", "default": "x", "format": "email"},
                "count": {"type": "integer"}
            }
        });
        normalize(&mut schema, SchemaDialect::Google);
        assert_eq!(schema["type"], "OBJECT");
        assert!(schema.get("additionalProperties").is_none());
        assert!(schema.get("$schema").is_none());
        assert_eq!(schema["properties"]["name"]["type"], "STRING");
        assert!(schema["properties"]["name"].get("format").is_none());
        assert!(schema["properties"]["name"].get("default").is_none());
        assert_eq!(schema["properties"]["count"]["type"], "INTEGER");
    }

    #[test]
    fn google_keeps_enum_and_date_time_format() {
        let mut schema = json!({"type": "string", "format": "date-time"});
        normalize(&mut schema, SchemaDialect::Google);
        assert_eq!(schema["format"], "date-time");
    }

    #[test]
    fn openai_renames_exclusive_bounds() {
        let mut schema = json!({"type": "integer", "exclusiveMinimum": 0, "exclusiveMaximum": 100});
        normalize(&mut schema, SchemaDialect::OpenAi);
        assert_eq!(schema["minimum"], 0);
        assert_eq!(schema["maximum"], 100);
        assert!(schema.get("exclusiveMinimum").is_none());
    }

    #[test]
    fn normalizer_recurses_into_nested_combinators() {
        let mut schema = json!({
            "type": "object",
            "properties": {
                "value": {"anyOf": [{"type": "string"}, {"type": "integer", "exclusiveMinimum": 1}]}
            }
        });
        normalize(&mut schema, SchemaDialect::OpenAi);
        assert_eq!(schema["properties"]["value"]["anyOf"][1]["minimum"], 1);
    }

    #[test]
    fn normalizer_is_idempotent() {
        let mut once = json!({
            "type": "object",
            "properties": {"x": {"type": "string", "exclusiveMinimum": 1}}
        });
        normalize(&mut once, SchemaDialect::Google);
        let mut twice = once.clone();
        normalize(&mut twice, SchemaDialect::Google);
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_schema_detection() {
        assert!(is_empty_schema(&json!({"type": "object"})));
        assert!(!is_empty_schema(&json!({"type": "object", "properties": {"a": {}}})));
        assert!(!is_empty_schema(&json!({"required": ["a"]})));
    }
}
