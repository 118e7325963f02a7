//! JSON Schema sanitizer for tool definitions
//!
//! OpenAI-compatible function calling rejects a number of JSON Schema
//! keywords that Anthropic tool schemas routinely carry. This strips the
//! unsupported keywords recursively while leaving the structural core
//! (type, properties, items, required, enum, bounds) intact.

use serde_json::Value;

/// Keywords removed from every object level of the schema.
const UNSUPPORTED_KEYWORDS: &[&str] = &[
    "$schema",
    "additionalProperties",
    "exclusiveMinimum",
    "exclusiveMaximum",
    "$id",
    "$ref",
    "$defs",
    "definitions",
    "if",
    "then",
    "else",
    "allOf",
    "anyOf",
    "oneOf",
    "not",
    "propertyNames",
    "patternProperties",
    "unevaluatedProperties",
    "unevaluatedItems",
    "const",
    "contentEncoding",
    "contentMediaType",
    "dependentRequired",
    "dependentSchemas",
];

/// Return a copy of `schema` with unsupported keywords removed at every
/// nesting level. Non-object values pass through unchanged.
pub fn sanitize_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => {
            let mut cleaned = serde_json::Map::with_capacity(map.len());
            for (key, value) in map {
                if UNSUPPORTED_KEYWORDS.contains(&key.as_str()) {
                    continue;
                }
                cleaned.insert(key.clone(), sanitize_schema(value));
            }
            Value::Object(cleaned)
        }
        Value::Array(items) => Value::Array(items.iter().map(sanitize_schema).collect()),
        other => other.clone(),
    }
}
