//! Flattens typed schemas into plain JSON Schema for providers without
//! native structured decoding.
//!
//! Discriminator fields (`*_discriminator` literals) are exposed to the model
//! as `kind`, and every tagged union becomes `oneOf` with a
//! `discriminator.propertyName` pointer. The compiled schema carries a
//! transform that maps the model's output back to the typed field names.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value, json};

use crate::error::{AiError, Result};
use crate::schema::types::{FieldSchema, RecordSchema, SchemaType};

/// Property name the compiled schema uses for union tags.
pub const COMPILED_TAG: &str = "kind";

pub type SchemaTransform = Arc<dyn Fn(Value) -> Result<Value> + Send + Sync>;

/// Plain JSON Schema plus the function restoring typed field names
#[derive(Clone)]
pub struct CompiledSchema {
    pub name: String,
    pub schema: Value,
    transform: SchemaTransform,
}

impl CompiledSchema {
    /// Map a value decoded against `schema` back to the typed shape.
    pub fn apply(&self, value: Value) -> Result<Value> {
        (self.transform)(value)
    }
}

impl fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledSchema")
            .field("name", &self.name)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SchemaCompiler {
    pub allow_additional_properties: bool,
}

impl SchemaCompiler {
    pub fn new(allow_additional_properties: bool) -> Self {
        Self {
            allow_additional_properties,
        }
    }

    /// Compile `schema` or fail with [`AiError::SchemaTooComplex`].
    pub fn compile(&self, name: &str, schema: &SchemaType) -> Result<CompiledSchema> {
        let rendered = self.render(schema, name)?;
        let typed = Arc::new(schema.clone());

        Ok(CompiledSchema {
            name: name.to_string(),
            schema: rendered,
            transform: Arc::new(move |value| restore(&typed, value)),
        })
    }

    fn render(&self, schema: &SchemaType, path: &str) -> Result<Value> {
        match schema {
            SchemaType::Object(record) => self.render_record(record, path),
            SchemaType::Array {
                items,
                min_items,
                max_items,
            } => {
                let mut rendered = json!({
                    "type": "array",
                    "items": self.render(items, &format!("{path}[]"))?
                });
                if let Some(min) = min_items {
                    rendered["minItems"] = json!(min);
                }
                if let Some(max) = max_items {
                    rendered["maxItems"] = json!(max);
                }
                Ok(rendered)
            }
            SchemaType::TaggedUnion(branches) => self.render_union(branches, path),
            SchemaType::Map(_) => Err(too_complex(path, "string-keyed maps")),
            SchemaType::Tuple(_) => Err(too_complex(path, "tuples")),
            SchemaType::Union(_) => Err(too_complex(path, "unions without a discriminator")),
            scalar => Ok(scalar.to_json_schema()),
        }
    }

    fn render_record(&self, record: &RecordSchema, path: &str) -> Result<Value> {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for field in &record.fields {
            let field_path = format!("{path}.{}", field.name);
            let (name, mut rendered) = if is_discriminator(field) {
                (COMPILED_TAG.to_string(), field.schema.to_json_schema())
            } else {
                (field.name.clone(), self.render(&field.schema, &field_path)?)
            };

            if let Value::Object(obj) = &mut rendered {
                if !field.description.is_empty() {
                    obj.insert("description".to_string(), json!(field.description));
                }
                if let Some(default) = &field.default {
                    obj.insert("default".to_string(), default.clone());
                }
            }

            if field.required {
                required.push(name.clone());
            }
            properties.insert(name, rendered);
        }

        Ok(json!({
            "type": "object",
            "title": record.name,
            "description": record.description,
            "properties": properties,
            "required": required,
            "additionalProperties": self.allow_additional_properties
        }))
    }

    fn render_union(&self, branches: &[RecordSchema], path: &str) -> Result<Value> {
        let mut tags: Vec<&str> = Vec::with_capacity(branches.len());
        let mut rendered = Vec::with_capacity(branches.len());

        for branch in branches {
            let tag = branch
                .fields
                .iter()
                .find(|f| is_discriminator(f))
                .and_then(|f| match &f.schema {
                    SchemaType::Literal(tag) => Some(tag.as_str()),
                    _ => None,
                })
                .ok_or_else(|| {
                    too_complex(path, &format!("union member {} has no discriminator", branch.name))
                })?;
            if tags.contains(&tag) {
                return Err(too_complex(path, &format!("duplicate union tag '{tag}'")));
            }
            tags.push(tag);
            rendered.push(self.render_record(branch, &format!("{path}<{tag}>"))?);
        }

        Ok(json!({
            "oneOf": rendered,
            "discriminator": { "propertyName": COMPILED_TAG }
        }))
    }
}

fn is_discriminator(field: &FieldSchema) -> bool {
    field.name.ends_with("_discriminator") && matches!(field.schema, SchemaType::Literal(_))
}

fn too_complex(path: &str, what: &str) -> AiError {
    AiError::SchemaTooComplex(format!("{path}: {what} are not supported"))
}

/// Rename `kind` back to each record's discriminator field, recursively.
fn restore(schema: &SchemaType, value: Value) -> Result<Value> {
    match (schema, value) {
        (SchemaType::Object(record), Value::Object(map)) => restore_record(record, map),
        (SchemaType::TaggedUnion(branches), Value::Object(map)) => {
            let tag = map
                .get(COMPILED_TAG)
                .or_else(|| {
                    branches
                        .iter()
                        .find_map(|b| b.discriminator())
                        .and_then(|(field, _)| map.get(field))
                })
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    AiError::InvalidFormat(format!("union value has no '{COMPILED_TAG}' tag"))
                })?
                .to_string();

            let branch = branches
                .iter()
                .find(|b| b.discriminator().is_some_and(|(_, t)| t == tag))
                .ok_or_else(|| AiError::InvalidFormat(format!("unknown discriminator '{tag}'")))?;
            restore_record(branch, map)
        }
        (SchemaType::Array { items, .. }, Value::Array(elements)) => elements
            .into_iter()
            .map(|element| restore(items, element))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        (_, other) => Ok(other),
    }
}

fn restore_record(record: &RecordSchema, mut map: Map<String, Value>) -> Result<Value> {
    for field in &record.fields {
        if is_discriminator(field) {
            if let Some(tag) = map.remove(COMPILED_TAG) {
                map.insert(field.name.clone(), tag);
            }
        } else if let Some(inner) = map.remove(&field.name) {
            map.insert(field.name.clone(), restore(&field.schema, inner)?);
        }
    }
    Ok(Value::Object(map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::DISCRIMINATOR_FIELD;

    fn branch(tag: &str) -> RecordSchema {
        RecordSchema::new(format!("{tag}_args"), format!("{tag} tool"))
            .field(FieldSchema::new(
                DISCRIMINATOR_FIELD,
                "",
                SchemaType::Literal(tag.to_string()),
            ))
            .field(FieldSchema::new("reasoning", "Why", SchemaType::String))
    }

    fn next_step(tags: &[&str]) -> SchemaType {
        SchemaType::Object(
            RecordSchema::new("NextStep", "Decide")
                .field(FieldSchema::new("plan_status", "Status", SchemaType::String))
                .field(FieldSchema::new(
                    "function",
                    "Action",
                    SchemaType::TaggedUnion(tags.iter().map(|t| branch(t)).collect()),
                )),
        )
    }

    #[test]
    fn test_union_has_discriminator_pointer_and_unique_tags() {
        let compiled = SchemaCompiler::default()
            .compile("NextStep", &next_step(&["web_search", "create_report"]))
            .unwrap();
        let function = &compiled.schema["properties"]["function"];

        assert_eq!(function["discriminator"]["propertyName"], "kind");
        let tags: Vec<&Value> = function["oneOf"]
            .as_array()
            .unwrap()
            .iter()
            .map(|b| &b["properties"]["kind"]["enum"])
            .collect();
        assert_eq!(tags, vec![&json!(["web_search"]), &json!(["create_report"])]);
        assert_eq!(function["oneOf"][0]["required"], json!(["kind", "reasoning"]));
        assert_eq!(compiled.schema["additionalProperties"], false);
    }

    #[test]
    fn test_additional_properties_flag() {
        let compiled = SchemaCompiler::new(true)
            .compile("NextStep", &next_step(&["web_search"]))
            .unwrap();
        assert_eq!(compiled.schema["additionalProperties"], true);
    }

    #[test]
    fn test_optional_fields_are_not_required() {
        let schema = SchemaType::Object(
            RecordSchema::new("Args", "")
                .field(FieldSchema::new("query", "", SchemaType::String))
                .field(
                    FieldSchema::new("scrape_content", "", SchemaType::Boolean)
                        .with_default(json!(false)),
                ),
        );
        let compiled = SchemaCompiler::default().compile("Args", &schema).unwrap();
        assert_eq!(compiled.schema["required"], json!(["query"]));
        assert_eq!(compiled.schema["properties"]["scrape_content"]["default"], false);
    }

    #[test]
    fn test_unsupported_constructs_are_too_complex() {
        let compiler = SchemaCompiler::default();
        for schema in [
            SchemaType::Map(Box::new(SchemaType::String)),
            SchemaType::Tuple(vec![SchemaType::String, SchemaType::Boolean]),
            SchemaType::Union(vec![SchemaType::String, SchemaType::Boolean]),
        ] {
            let wrapped = SchemaType::Object(
                RecordSchema::new("Args", "").field(FieldSchema::new("x", "", schema)),
            );
            let err = compiler.compile("Args", &wrapped).unwrap_err();
            assert!(matches!(err, AiError::SchemaTooComplex(ref m) if m.contains("Args.x")));
        }
    }

    #[test]
    fn test_union_without_tag_is_too_complex() {
        let untagged = RecordSchema::new("Plain", "")
            .field(FieldSchema::new("a", "", SchemaType::String));
        let err = SchemaCompiler::default()
            .compile("U", &SchemaType::TaggedUnion(vec![untagged]))
            .unwrap_err();
        assert!(matches!(err, AiError::SchemaTooComplex(_)));
    }

    #[test]
    fn test_transform_restores_discriminator_field() {
        let compiled = SchemaCompiler::default()
            .compile("NextStep", &next_step(&["web_search", "create_report"]))
            .unwrap();
        let restored = compiled
            .apply(json!({
                "plan_status": "ok",
                "function": {"kind": "create_report", "reasoning": "done"}
            }))
            .unwrap();
        assert_eq!(
            restored["function"],
            json!({"tool_name_discriminator": "create_report", "reasoning": "done"})
        );
    }

    #[test]
    fn test_transform_rejects_unknown_tag() {
        let compiled = SchemaCompiler::default()
            .compile("NextStep", &next_step(&["web_search"]))
            .unwrap();
        let err = compiled
            .apply(json!({"plan_status": "ok", "function": {"kind": "clarification"}}))
            .unwrap_err();
        assert!(err.to_string().contains("clarification"));
    }
}
