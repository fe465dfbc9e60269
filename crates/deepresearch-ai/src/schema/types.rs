//! Typed schema descriptors for structured model output.
//!
//! A [`SchemaType`] describes the shape a model response must take. It renders
//! to a provider-native JSON Schema, and [`SchemaType::conform`] checks a
//! decoded value against it, dropping `null` optionals and filling defaults so
//! the result deserializes straight into the matching Rust type.

use serde_json::{Map, Value, json};

use crate::error::{AiError, Result};

/// Field name that carries a tagged-union branch tag.
pub const DISCRIMINATOR_FIELD: &str = "tool_name_discriminator";

#[derive(Debug, Clone, PartialEq)]
pub enum SchemaType {
    String,
    Integer {
        minimum: Option<i64>,
        maximum: Option<i64>,
    },
    Number,
    Boolean,
    /// One of a fixed set of strings
    Enum(Vec<String>),
    /// Exactly this string; used for union tags
    Literal(String),
    Array {
        items: Box<SchemaType>,
        min_items: Option<usize>,
        max_items: Option<usize>,
    },
    Object(RecordSchema),
    /// Union of records told apart by a literal discriminator field
    TaggedUnion(Vec<RecordSchema>),
    /// Free-form string keyed map
    Map(Box<SchemaType>),
    /// Fixed-length heterogeneous array
    Tuple(Vec<SchemaType>),
    /// Union without a discriminator
    Union(Vec<SchemaType>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    pub name: String,
    pub description: String,
    pub schema: SchemaType,
    pub required: bool,
    pub default: Option<Value>,
}

impl FieldSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>, schema: SchemaType) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            required: true,
            default: None,
        }
    }

    /// Mark the field optional, substituting `default` when absent.
    pub fn with_default(mut self, default: Value) -> Self {
        self.required = false;
        self.default = Some(default);
        self
    }
}

/// A named record: an object with a fixed list of fields
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSchema {
    pub name: String,
    pub description: String,
    pub fields: Vec<FieldSchema>,
}

impl SchemaType {
    pub fn integer(minimum: i64, maximum: i64) -> Self {
        Self::Integer {
            minimum: Some(minimum),
            maximum: Some(maximum),
        }
    }

    pub fn enumeration<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Enum(values.into_iter().map(Into::into).collect())
    }

    /// List of strings with an item count range.
    pub fn string_list(min_items: usize, max_items: usize) -> Self {
        Self::Array {
            items: Box::new(Self::String),
            min_items: Some(min_items),
            max_items: Some(max_items),
        }
    }

    /// Provider-native JSON Schema, strict-mode friendly: every property is
    /// listed in `required` and optional ones accept `null`.
    pub fn to_json_schema(&self) -> Value {
        match self {
            Self::String => json!({"type": "string"}),
            Self::Integer { minimum, maximum } => {
                let mut schema = json!({"type": "integer"});
                if let Some(min) = minimum {
                    schema["minimum"] = json!(min);
                }
                if let Some(max) = maximum {
                    schema["maximum"] = json!(max);
                }
                schema
            }
            Self::Number => json!({"type": "number"}),
            Self::Boolean => json!({"type": "boolean"}),
            Self::Enum(values) => json!({"type": "string", "enum": values}),
            Self::Literal(value) => json!({"type": "string", "enum": [value]}),
            Self::Array {
                items,
                min_items,
                max_items,
            } => {
                let mut schema = json!({"type": "array", "items": items.to_json_schema()});
                if let Some(min) = min_items {
                    schema["minItems"] = json!(min);
                }
                if let Some(max) = max_items {
                    schema["maxItems"] = json!(max);
                }
                schema
            }
            Self::Object(record) => record.to_json_schema(),
            Self::TaggedUnion(branches) => json!({
                "anyOf": branches.iter().map(RecordSchema::to_json_schema).collect::<Vec<_>>()
            }),
            Self::Map(values) => json!({
                "type": "object",
                "additionalProperties": values.to_json_schema()
            }),
            Self::Tuple(items) => json!({
                "type": "array",
                "prefixItems": items.iter().map(SchemaType::to_json_schema).collect::<Vec<_>>(),
                "minItems": items.len(),
                "maxItems": items.len()
            }),
            Self::Union(options) => json!({
                "anyOf": options.iter().map(SchemaType::to_json_schema).collect::<Vec<_>>()
            }),
        }
    }

    /// Check `value` against the schema and normalize it.
    pub fn conform(&self, value: Value) -> Result<Value> {
        self.conform_at(value, "$")
    }

    pub(crate) fn conform_at(&self, value: Value, path: &str) -> Result<Value> {
        match self {
            Self::String => match value {
                Value::String(_) => Ok(value),
                other => Err(mismatch(path, "a string", &other)),
            },
            Self::Integer { minimum, maximum } => {
                let n = value
                    .as_i64()
                    .or_else(|| {
                        value
                            .as_f64()
                            .filter(|f| f.fract() == 0.0)
                            .map(|f| f as i64)
                    })
                    .ok_or_else(|| mismatch(path, "an integer", &value))?;
                if minimum.is_some_and(|min| n < min) || maximum.is_some_and(|max| n > max) {
                    return Err(invalid(path, format!("{n} is out of range")));
                }
                Ok(json!(n))
            }
            Self::Number => match value {
                Value::Number(_) => Ok(value),
                other => Err(mismatch(path, "a number", &other)),
            },
            Self::Boolean => match value {
                Value::Bool(_) => Ok(value),
                other => Err(mismatch(path, "a boolean", &other)),
            },
            Self::Enum(values) => match value.as_str() {
                Some(s) if values.iter().any(|v| v == s) => Ok(value),
                _ => Err(invalid(
                    path,
                    format!("expected one of [{}], got {}", values.join(", "), value),
                )),
            },
            Self::Literal(expected) => match value.as_str() {
                Some(s) if s == expected => Ok(value),
                _ => Err(invalid(path, format!("expected '{expected}', got {value}"))),
            },
            Self::Array {
                items,
                min_items,
                max_items,
            } => {
                let Value::Array(elements) = value else {
                    return Err(mismatch(path, "an array", &value));
                };
                let len = elements.len();
                if min_items.is_some_and(|min| len < min) || max_items.is_some_and(|max| len > max)
                {
                    return Err(invalid(
                        path,
                        format!(
                            "expected {}..={} items, got {len}",
                            min_items.unwrap_or(0),
                            max_items.map_or("*".to_string(), |m| m.to_string())
                        ),
                    ));
                }
                elements
                    .into_iter()
                    .enumerate()
                    .map(|(i, element)| items.conform_at(element, &format!("{path}[{i}]")))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::Array)
            }
            Self::Object(record) => record.conform_at(value, path),
            Self::TaggedUnion(branches) => {
                let branch = select_branch(branches, &value, path)?;
                branch.conform_at(value, path)
            }
            Self::Map(values) => {
                let Value::Object(map) = value else {
                    return Err(mismatch(path, "an object", &value));
                };
                map.into_iter()
                    .map(|(k, v)| {
                        let conformed = values.conform_at(v, &format!("{path}.{k}"))?;
                        Ok((k, conformed))
                    })
                    .collect::<Result<Map<_, _>>>()
                    .map(Value::Object)
            }
            Self::Tuple(items) => {
                let Value::Array(elements) = value else {
                    return Err(mismatch(path, "an array", &value));
                };
                if elements.len() != items.len() {
                    return Err(invalid(
                        path,
                        format!("expected {} items, got {}", items.len(), elements.len()),
                    ));
                }
                items
                    .iter()
                    .zip(elements)
                    .enumerate()
                    .map(|(i, (schema, element))| schema.conform_at(element, &format!("{path}[{i}]")))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::Array)
            }
            Self::Union(options) => options
                .iter()
                .find_map(|option| option.conform_at(value.clone(), path).ok())
                .ok_or_else(|| invalid(path, "value matches no union member")),
        }
    }
}

impl RecordSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldSchema) -> Self {
        self.fields.push(field);
        self
    }

    /// The literal tag field, if this record is a union branch.
    pub fn discriminator(&self) -> Option<(&str, &str)> {
        self.fields.iter().find_map(|f| match &f.schema {
            SchemaType::Literal(tag) => Some((f.name.as_str(), tag.as_str())),
            _ => None,
        })
    }

    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for field in &self.fields {
            let mut schema = field.schema.to_json_schema();
            if !field.description.is_empty()
                && let Value::Object(obj) = &mut schema
            {
                obj.insert("description".to_string(), json!(field.description));
            }
            if !field.required {
                schema = json!({"anyOf": [schema, {"type": "null"}]});
            }
            properties.insert(field.name.clone(), schema);
        }

        json!({
            "type": "object",
            "title": self.name,
            "description": self.description,
            "properties": properties,
            "required": self.fields.iter().map(|f| f.name.as_str()).collect::<Vec<_>>(),
            "additionalProperties": false
        })
    }

    pub fn conform(&self, value: Value) -> Result<Value> {
        self.conform_at(value, "$")
    }

    fn conform_at(&self, value: Value, path: &str) -> Result<Value> {
        let Value::Object(mut input) = value else {
            return Err(mismatch(path, &format!("a {} object", self.name), &value));
        };

        let mut output = Map::new();
        for field in &self.fields {
            let field_path = format!("{path}.{}", field.name);
            match input.remove(&field.name) {
                Some(Value::Null) | None if !field.required => {
                    if let Some(default) = &field.default {
                        output.insert(field.name.clone(), default.clone());
                    }
                }
                None => {
                    return Err(invalid(&field_path, "missing required field"));
                }
                Some(v) => {
                    output.insert(field.name.clone(), field.schema.conform_at(v, &field_path)?);
                }
            }
        }

        if !input.is_empty() {
            tracing::debug!(
                record = %self.name,
                fields = ?input.keys().collect::<Vec<_>>(),
                "Dropping unknown fields"
            );
        }

        Ok(Value::Object(output))
    }
}

fn select_branch<'a>(
    branches: &'a [RecordSchema],
    value: &Value,
    path: &str,
) -> Result<&'a RecordSchema> {
    let tags: Vec<(&str, &str)> = branches.iter().filter_map(|b| b.discriminator()).collect();
    let field = tags
        .first()
        .map(|(field, _)| *field)
        .ok_or_else(|| invalid(path, "union has no discriminator"))?;
    let tag = value
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| invalid(path, format!("missing discriminator '{field}'")))?;

    branches
        .iter()
        .find(|b| b.discriminator().is_some_and(|(_, t)| t == tag))
        .ok_or_else(|| {
            invalid(
                path,
                format!(
                    "'{tag}' is not one of [{}]",
                    tags.iter().map(|(_, t)| *t).collect::<Vec<_>>().join(", ")
                ),
            )
        })
}

fn mismatch(path: &str, expected: &str, got: &Value) -> AiError {
    let kind = match got {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    invalid(path, format!("expected {expected}, got {kind}"))
}

fn invalid(path: &str, reason: impl AsRef<str>) -> AiError {
    AiError::InvalidFormat(format!("{path}: {}", reason.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn search_branch() -> RecordSchema {
        RecordSchema::new("WebSearch", "Search the web")
            .field(FieldSchema::new(
                DISCRIMINATOR_FIELD,
                "",
                SchemaType::Literal("web_search".to_string()),
            ))
            .field(FieldSchema::new("query", "Search query", SchemaType::String))
            .field(
                FieldSchema::new("max_results", "Result count", SchemaType::integer(1, 10))
                    .with_default(json!(10)),
            )
    }

    fn report_branch() -> RecordSchema {
        RecordSchema::new("CreateReport", "Write the report")
            .field(FieldSchema::new(
                DISCRIMINATOR_FIELD,
                "",
                SchemaType::Literal("create_report".to_string()),
            ))
            .field(FieldSchema::new("title", "Title", SchemaType::String))
    }

    #[test]
    fn test_record_fills_defaults_and_drops_null_optionals() {
        let conformed = search_branch()
            .conform(json!({
                "tool_name_discriminator": "web_search",
                "query": "rust",
                "max_results": null,
                "extra": true
            }))
            .unwrap();
        assert_eq!(
            conformed,
            json!({"tool_name_discriminator": "web_search", "query": "rust", "max_results": 10})
        );
    }

    #[test]
    fn test_missing_required_field_reports_path() {
        let err = search_branch()
            .conform(json!({"tool_name_discriminator": "web_search"}))
            .unwrap_err();
        assert!(err.to_string().contains("$.query"));
    }

    #[test]
    fn test_integer_bounds() {
        let schema = SchemaType::integer(1, 10);
        assert_eq!(schema.conform(json!(3.0)).unwrap(), json!(3));
        assert!(schema.conform(json!(11)).is_err());
        assert!(schema.conform(json!("3")).is_err());
    }

    #[test]
    fn test_array_item_count() {
        let schema = SchemaType::string_list(2, 3);
        assert!(schema.conform(json!(["a"])).is_err());
        assert!(schema.conform(json!(["a", "b"])).is_ok());
        assert!(schema.conform(json!(["a", "b", "c", "d"])).is_err());
        assert!(schema.conform(json!(["a", 1])).is_err());
    }

    #[test]
    fn test_tagged_union_selects_branch_by_tag() {
        let union = SchemaType::TaggedUnion(vec![search_branch(), report_branch()]);
        let value = union
            .conform(json!({"tool_name_discriminator": "create_report", "title": "T"}))
            .unwrap();
        assert_eq!(value["title"], "T");

        let err = union
            .conform(json!({"tool_name_discriminator": "clarification"}))
            .unwrap_err();
        assert!(err.to_string().contains("web_search, create_report"));
    }

    #[test]
    fn test_native_rendering_lists_every_property_as_required() {
        let schema = search_branch().to_json_schema();
        assert_eq!(
            schema["required"],
            json!(["tool_name_discriminator", "query", "max_results"])
        );
        assert_eq!(schema["additionalProperties"], false);
        assert_eq!(schema["properties"]["max_results"]["anyOf"][1]["type"], "null");
        assert_eq!(
            schema["properties"]["tool_name_discriminator"]["enum"],
            json!(["web_search"])
        );
    }
}
