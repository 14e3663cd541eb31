//! Schema fragments and validation.
//!
//! Schemas are JSON-Schema shaped `serde_json::Value`s transformed in
//! lockstep with documents. Validation is an external concern; the
//! [`Validator`] trait is the seam, and [`BasicValidator`] covers the subset
//! of JSON Schema the engine itself emits.

use crate::value::{child, describe, json_type_of, Path};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// A JSON-Schema shaped description of document shape.
pub type SchemaFragment = Value;

/// JSON Schema type names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    Null,
}

impl JsonType {
    /// Parse a JSON Schema type name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "string" => Some(JsonType::String),
            "number" => Some(JsonType::Number),
            "integer" => Some(JsonType::Integer),
            "boolean" => Some(JsonType::Boolean),
            "array" => Some(JsonType::Array),
            "object" => Some(JsonType::Object),
            "null" => Some(JsonType::Null),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JsonType::String => "string",
            JsonType::Number => "number",
            JsonType::Integer => "integer",
            JsonType::Boolean => "boolean",
            JsonType::Array => "array",
            JsonType::Object => "object",
            JsonType::Null => "null",
        }
    }

    /// Whether a runtime value belongs to this type. `number` admits integers.
    pub fn admits(self, value: &Value) -> bool {
        let actual = json_type_of(value);
        actual == self || (self == JsonType::Number && actual == JsonType::Integer)
    }

    /// The value used for a property of this type when no default is declared.
    pub fn default_value(self) -> Value {
        match self {
            JsonType::String => json!(""),
            JsonType::Number | JsonType::Integer => json!(0),
            JsonType::Boolean => json!(false),
            JsonType::Array => json!([]),
            JsonType::Object => json!({}),
            JsonType::Null => Value::Null,
        }
    }
}

impl std::fmt::Display for JsonType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub path: Path,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: Path, message: impl Into<String>) -> Self {
        Self {
            path,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", describe(&self.path), self.message)
    }
}

/// Validates documents against schema fragments.
pub trait Validator: Send + Sync {
    fn validate(&self, value: &Value, schema: &SchemaFragment)
        -> Result<(), Vec<ValidationError>>;
}

/// Validator for the JSON Schema subset produced by lens projection:
/// `type`, `enum`, `properties`, `required`, `patternProperties`,
/// `additionalProperties` and `items`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicValidator;

impl Validator for BasicValidator {
    fn validate(
        &self,
        value: &Value,
        schema: &SchemaFragment,
    ) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        check(value, schema, &[], &mut errors);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Validate with [`BasicValidator`].
pub fn validate(value: &Value, schema: &SchemaFragment) -> Result<(), Vec<ValidationError>> {
    BasicValidator.validate(value, schema)
}

fn check(value: &Value, schema: &Value, path: &[String], errors: &mut Vec<ValidationError>) {
    let schema = match schema {
        Value::Bool(true) => return,
        Value::Bool(false) => {
            errors.push(ValidationError::new(path.to_vec(), "no value is allowed here"));
            return;
        }
        Value::Object(schema) => schema,
        _ => return,
    };

    let declared = declared_types(schema);
    if !declared.is_empty() && !declared.iter().any(|t| t.admits(value)) {
        let expected = declared
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join(" or ");
        errors.push(ValidationError::new(
            path.to_vec(),
            format!("expected {}, got {}", expected, json_type_of(value)),
        ));
        return;
    }

    if let Some(Value::Array(allowed)) = schema.get("enum") {
        if !allowed.contains(value) {
            errors.push(ValidationError::new(
                path.to_vec(),
                format!("value {} is not one of the allowed values", value),
            ));
        }
    }

    match value {
        Value::Object(fields) => check_object(fields, schema, path, errors),
        Value::Array(items) => {
            if let Some(item_schema) = schema.get("items") {
                for (idx, item) in items.iter().enumerate() {
                    check(item, item_schema, &child(path, idx.to_string()), errors);
                }
            }
        }
        _ => {}
    }
}

fn check_object(
    fields: &Map<String, Value>,
    schema: &Map<String, Value>,
    path: &[String],
    errors: &mut Vec<ValidationError>,
) {
    if let Some(Value::Array(required)) = schema.get("required") {
        for name in required.iter().filter_map(Value::as_str) {
            if !fields.contains_key(name) {
                errors.push(ValidationError::new(
                    path.to_vec(),
                    format!("missing required property '{}'", name),
                ));
            }
        }
    }

    let properties = schema.get("properties").and_then(Value::as_object);
    let mut patterns = Vec::new();
    if let Some(Value::Object(pattern_props)) = schema.get("patternProperties") {
        for (pattern, sub) in pattern_props {
            match Regex::new(pattern) {
                Ok(re) => patterns.push((re, sub)),
                Err(e) => errors.push(ValidationError::new(
                    path.to_vec(),
                    format!("invalid pattern '{}': {}", pattern, e),
                )),
            }
        }
    }
    let additional = schema.get("additionalProperties");

    for (key, field) in fields {
        let field_path = child(path, key.clone());
        let mut matched = false;
        if let Some(sub) = properties.and_then(|p| p.get(key)) {
            matched = true;
            check(field, sub, &field_path, errors);
        }
        for (re, sub) in &patterns {
            if re.is_match(key) {
                matched = true;
                check(field, sub, &field_path, errors);
            }
        }
        if !matched {
            match additional {
                Some(Value::Bool(false)) => errors.push(ValidationError::new(
                    path.to_vec(),
                    format!("unexpected property '{}'", key),
                )),
                Some(sub @ Value::Object(_)) => check(field, sub, &field_path, errors),
                _ => {}
            }
        }
    }
}

/// The types listed by a schema's `type` keyword (string or array form).
pub fn declared_types(schema: &Map<String, Value>) -> Vec<JsonType> {
    match schema.get("type") {
        Some(Value::String(name)) => JsonType::parse(name).into_iter().collect(),
        Some(Value::Array(names)) => names
            .iter()
            .filter_map(Value::as_str)
            .filter_map(JsonType::parse)
            .collect(),
        _ => Vec::new(),
    }
}

/// Encode a type list as a `type` keyword value.
pub fn type_keyword(types: &[JsonType]) -> Value {
    match types {
        [single] => json!(single.as_str()),
        many => Value::Array(many.iter().map(|t| json!(t.as_str())).collect()),
    }
}

/// An empty object schema.
pub fn object_schema() -> SchemaFragment {
    json!({"type": "object", "properties": {}, "required": []})
}

/// Whether `name` is listed in the schema's `required` array.
pub fn is_required(schema: &Map<String, Value>, name: &str) -> bool {
    schema
        .get("required")
        .and_then(Value::as_array)
        .is_some_and(|list| list.iter().any(|v| v.as_str() == Some(name)))
}

/// Add `name` to `required` if not already present.
pub fn require(schema: &mut Map<String, Value>, name: &str) {
    if is_required(schema, name) {
        return;
    }
    let list = schema
        .entry("required")
        .or_insert_with(|| Value::Array(Vec::new()));
    if let Value::Array(list) = list {
        list.push(json!(name));
    }
}

/// Remove `name` from `required`, returning whether it was listed.
pub fn unrequire(schema: &mut Map<String, Value>, name: &str) -> bool {
    match schema.get_mut("required") {
        Some(Value::Array(list)) => {
            let before = list.len();
            list.retain(|v| v.as_str() != Some(name));
            before != list.len()
        }
        _ => false,
    }
}

/// Rename an entry of `required`, keeping its position.
pub fn rename_required(schema: &mut Map<String, Value>, from: &str, to: &str) {
    if let Some(Value::Array(list)) = schema.get_mut("required") {
        for entry in list.iter_mut() {
            if entry.as_str() == Some(from) {
                *entry = json!(to);
            }
        }
    }
}

/// The `properties` map of an object schema, created if absent.
pub fn properties_mut(schema: &mut Map<String, Value>) -> &mut Map<String, Value> {
    let entry = schema
        .entry("properties")
        .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    match entry {
        Value::Object(map) => map,
        _ => unreachable!("properties was just replaced by an object"),
    }
}
