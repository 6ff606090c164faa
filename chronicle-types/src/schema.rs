//! A minimal JSON Schema subset, enough to enforce an agent's declared
//! `outputSchema` as a hard contract.
//!
//! This is deliberately not a general-purpose validator. It understands
//! `type`, `properties`/`required`, `items`, and `enum` — the shapes an
//! agent's structured output realistically takes — and nothing of JSON
//! Schema's more exotic machinery (`$ref`, `oneOf`, regex `pattern`, numeric
//! ranges). Anything wider should go through a real provider-side
//! structured-output feature instead of this engine re-validating it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A schema node. Composes recursively through `properties` and `items`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonSchema {
    /// The JSON primitive type this node requires, if any.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<SchemaType>,
    /// For object schemas, the allowed/expected properties.
    #[serde(default, skip_serializing_if = "std::collections::BTreeMap::is_empty")]
    pub properties: std::collections::BTreeMap<String, JsonSchema>,
    /// For object schemas, which property names are mandatory.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    /// For array schemas, the schema every element must satisfy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<JsonSchema>>,
    /// If present, the value must equal one of these exactly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#enum: Option<Vec<Value>>,
}

/// JSON Schema's `type` keyword, restricted to the primitives this
/// validator understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    /// JSON string.
    String,
    /// JSON number (integer or float).
    Number,
    /// JSON integer (rejects fractional numbers a plain `Number` would accept).
    Integer,
    /// JSON boolean.
    Boolean,
    /// JSON object.
    Object,
    /// JSON array.
    Array,
    /// JSON null.
    Null,
}

/// One structural mismatch between a value and a schema. Multiple
/// violations are collected rather than failing fast, so a caller can
/// report everything wrong with a model's output in one pass.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("at `{path}`: {message}")]
pub struct SchemaViolation {
    /// JSON-pointer-ish path to the offending value, e.g. `$.items[2].name`.
    pub path: String,
    /// Human-readable description of the mismatch.
    pub message: String,
}

impl JsonSchema {
    /// Convenience constructor for a bare `{"type": "object"}` schema that
    /// callers then populate with `.properties`/`.required`.
    #[must_use]
    pub fn object() -> Self {
        Self {
            schema_type: Some(SchemaType::Object),
            properties: Default::default(),
            required: Vec::new(),
            items: None,
            r#enum: None,
        }
    }

    /// Validate `value` against this schema, returning every violation
    /// found. An empty vec means the value conforms.
    #[must_use]
    pub fn validate(&self, value: &Value) -> Vec<SchemaViolation> {
        let mut violations = Vec::new();
        self.validate_at("$", value, &mut violations);
        violations
    }

    fn validate_at(&self, path: &str, value: &Value, out: &mut Vec<SchemaViolation>) {
        if let Some(allowed) = &self.r#enum {
            if !allowed.contains(value) {
                out.push(SchemaViolation {
                    path: path.to_string(),
                    message: "value is not one of the allowed enum values".to_string(),
                });
                return;
            }
        }

        let Some(expected) = self.schema_type else {
            return;
        };

        let matches = match (expected, value) {
            (SchemaType::String, Value::String(_)) => true,
            (SchemaType::Number, Value::Number(_)) => true,
            (SchemaType::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (SchemaType::Boolean, Value::Bool(_)) => true,
            (SchemaType::Object, Value::Object(_)) => true,
            (SchemaType::Array, Value::Array(_)) => true,
            (SchemaType::Null, Value::Null) => true,
            _ => false,
        };

        if !matches {
            out.push(SchemaViolation {
                path: path.to_string(),
                message: format!("expected {expected:?}, found {}", type_name(value)),
            });
            return;
        }

        match (expected, value) {
            (SchemaType::Object, Value::Object(map)) => {
                for field in &self.required {
                    if !map.contains_key(field) {
                        out.push(SchemaViolation {
                            path: path.to_string(),
                            message: format!("missing required property `{field}`"),
                        });
                    }
                }
                for (key, subschema) in &self.properties {
                    if let Some(v) = map.get(key) {
                        subschema.validate_at(&format!("{path}.{key}"), v, out);
                    }
                }
            }
            (SchemaType::Array, Value::Array(items)) => {
                if let Some(item_schema) = &self.items {
                    for (i, item) in items.iter().enumerate() {
                        item_schema.validate_at(&format!("{path}[{i}]"), item, out);
                    }
                }
            }
            _ => {}
        }
    }

    /// `true` iff [`Self::validate`] finds nothing wrong.
    #[must_use]
    pub fn is_valid(&self, value: &Value) -> bool {
        self.validate(value).is_empty()
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

    #[test]
    fn accepts_conforming_object() {
        let mut schema = JsonSchema::object();
        schema.required = vec!["name".into()];
        schema.properties.insert(
            "name".into(),
            JsonSchema {
                schema_type: Some(SchemaType::String),
                ..JsonSchema::object_blank()
            },
        );
        assert!(schema.is_valid(&json!({"name": "ok"})));
    }

    #[test]
    fn reports_missing_required_field() {
        let mut schema = JsonSchema::object();
        schema.required = vec!["name".into()];
        let violations = schema.validate(&json!({}));
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("name"));
    }

    #[test]
    fn reports_type_mismatch() {
        let schema = JsonSchema {
            schema_type: Some(SchemaType::Integer),
            ..JsonSchema::object_blank()
        };
        let violations = schema.validate(&json!("not a number"));
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn enum_restricts_allowed_values() {
        let schema = JsonSchema {
            r#enum: Some(vec![json!("a"), json!("b")]),
            ..JsonSchema::object_blank()
        };
        assert!(schema.is_valid(&json!("a")));
        assert!(!schema.is_valid(&json!("c")));
    }

    #[test]
    fn validates_array_items() {
        let schema = JsonSchema {
            schema_type: Some(SchemaType::Array),
            items: Some(Box::new(JsonSchema {
                schema_type: Some(SchemaType::String),
                ..JsonSchema::object_blank()
            })),
            ..JsonSchema::object_blank()
        };
        let violations = schema.validate(&json!(["ok", 2, "also ok"]));
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path, "$[1]");
    }

    impl JsonSchema {
        fn object_blank() -> Self {
            JsonSchema {
                schema_type: None,
                properties: Default::default(),
                required: Vec::new(),
                items: None,
                r#enum: None,
            }
        }
    }
}
