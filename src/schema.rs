// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The emitted schema subset.
//!
//! Definitions use the fragment of JSON Schema that swagger-style documents
//! rely on: primitives with optional `format`, arrays, objects with
//! `properties`/`required`/`additionalProperties`, `$ref` into
//! `#/definitions/`, inline `enum` values, and `allOf` for a reference that
//! also carries a description. Everything else collapses to the empty
//! schema (any value).
//!
//! Serialization is hand-written so key order is fixed and empty members
//! are omitted; deserialization is tolerant and ignores constructs outside
//! the subset, since operation templates are written by hand and often
//! carry vendor extensions.

use crate::decl::Ref;
use crate::value::Value;
use crate::Str;
use indexmap::{IndexMap, IndexSet};
use lazy_static::lazy_static;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;

const DEFINITIONS_PREFIX: &str = "#/definitions/";

/// A shared, immutable schema node.
#[derive(Debug, Clone)]
pub struct Schema {
    t: Ref<SchemaType>,
}

#[derive(Debug, Clone)]
pub enum SchemaType {
    /// The empty schema; accepts any value.
    Any,
    Reference {
        reference: Str,
    },
    Primitive {
        kind: PrimitiveKind,
        format: Option<Str>,
        /// Inline enumeration of the admissible values; empty when open.
        enum_values: Vec<Value>,
        description: Option<Str>,
    },
    Array {
        items: Schema,
        description: Option<Str>,
    },
    Object {
        /// Insertion order is preserved through serialization.
        properties: IndexMap<Str, Schema>,
        required: Vec<Str>,
        additional_properties: Option<Schema>,
        description: Option<Str>,
    },
    /// Composition, used for a `$ref` that needs its own description.
    AllOf {
        schemas: Vec<Schema>,
        description: Option<Str>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveKind {
    Integer,
    Number,
    String,
    Boolean,
}

impl Schema {
    pub fn new(t: SchemaType) -> Self {
        Schema { t: Ref::new(t) }
    }

    pub fn as_type(&self) -> &SchemaType {
        &self.t
    }

    pub fn any() -> Self {
        Schema::new(SchemaType::Any)
    }

    /// A reference into the shared definitions map.
    pub fn reference(target: &str) -> Self {
        Schema::new(SchemaType::Reference {
            reference: format!("{DEFINITIONS_PREFIX}{target}").into(),
        })
    }

    /// Stand-in for a type that was skipped or could not be resolved.
    pub fn opaque_object() -> Self {
        Schema::new(SchemaType::Object {
            properties: IndexMap::new(),
            required: Vec::new(),
            additional_properties: None,
            description: None,
        })
    }

    /// The definitions key this schema points at. `None` for non-references
    /// and for references outside the local definitions map.
    pub fn ref_target(&self) -> Option<&str> {
        match self.t.as_ref() {
            SchemaType::Reference { reference } => reference.strip_prefix(DEFINITIONS_PREFIX),
            _ => None,
        }
    }
}

impl Serialize for Schema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        match self.t.as_ref() {
            SchemaType::Any => {}
            SchemaType::Reference { reference } => {
                map.serialize_entry("$ref", reference.as_ref())?;
            }
            SchemaType::Primitive {
                kind,
                format,
                enum_values,
                description,
            } => {
                map.serialize_entry("type", kind)?;
                if let Some(f) = format {
                    map.serialize_entry("format", f.as_ref())?;
                }
                if let Some(d) = description {
                    map.serialize_entry("description", d.as_ref())?;
                }
                if !enum_values.is_empty() {
                    map.serialize_entry("enum", enum_values)?;
                }
            }
            SchemaType::Array { items, description } => {
                map.serialize_entry("type", "array")?;
                if let Some(d) = description {
                    map.serialize_entry("description", d.as_ref())?;
                }
                map.serialize_entry("items", items)?;
            }
            SchemaType::Object {
                properties,
                required,
                additional_properties,
                description,
            } => {
                map.serialize_entry("type", "object")?;
                if let Some(d) = description {
                    map.serialize_entry("description", d.as_ref())?;
                }
                if !properties.is_empty() {
                    map.serialize_entry("properties", properties)?;
                }
                if !required.is_empty() {
                    map.serialize_entry("required", required)?;
                }
                if let Some(extra) = additional_properties {
                    map.serialize_entry("additionalProperties", extra)?;
                }
            }
            SchemaType::AllOf {
                schemas,
                description,
            } => {
                if let Some(d) = description {
                    map.serialize_entry("description", d.as_ref())?;
                }
                map.serialize_entry("allOf", schemas)?;
            }
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Schema {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Route through serde_json::Value so the same tolerant reader works
        // for any self-describing format.
        let v: serde_json::Value = Deserialize::deserialize(deserializer)?;
        Ok(from_raw(&v))
    }
}

fn from_raw(v: &serde_json::Value) -> Schema {
    let obj = match v.as_object() {
        Some(m) => m,
        // `true` is a valid schema meaning "anything"; so is garbage, here.
        None => return Schema::any(),
    };
    if let Some(target) = obj.get("$ref").and_then(serde_json::Value::as_str) {
        return Schema::new(SchemaType::Reference {
            reference: target.into(),
        });
    }
    let description: Option<Str> = obj
        .get("description")
        .and_then(serde_json::Value::as_str)
        .map(Into::into);
    if let Some(parts) = obj.get("allOf").and_then(serde_json::Value::as_array) {
        return Schema::new(SchemaType::AllOf {
            schemas: parts.iter().map(from_raw).collect(),
            description,
        });
    }

    let type_tag = obj.get("type").and_then(serde_json::Value::as_str);
    if type_tag == Some("object")
        || obj.contains_key("properties")
        || obj.contains_key("additionalProperties")
    {
        let mut properties = IndexMap::new();
        if let Some(props) = obj.get("properties").and_then(serde_json::Value::as_object) {
            for (name, child) in props {
                properties.insert(name.as_str().into(), from_raw(child));
            }
        }
        let required = obj
            .get("required")
            .and_then(serde_json::Value::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(serde_json::Value::as_str)
                    .map(Into::into)
                    .collect()
            })
            .unwrap_or_default();
        let additional_properties = obj
            .get("additionalProperties")
            .and_then(|extra| match extra {
                serde_json::Value::Bool(true) => Some(Schema::any()),
                serde_json::Value::Bool(false) => None,
                other => Some(from_raw(other)),
            });
        return Schema::new(SchemaType::Object {
            properties,
            required,
            additional_properties,
            description,
        });
    }
    if type_tag == Some("array") || obj.contains_key("items") {
        let items = obj.get("items").map(from_raw).unwrap_or_else(Schema::any);
        return Schema::new(SchemaType::Array { items, description });
    }

    let enum_values: Vec<Value> = obj
        .get("enum")
        .and_then(serde_json::Value::as_array)
        .map(|vals| {
            vals.iter()
                .filter_map(|x| serde_json::from_value(x.clone()).ok())
                .collect()
        })
        .unwrap_or_default();
    let kind = match type_tag {
        Some("integer") => Some(PrimitiveKind::Integer),
        Some("number") => Some(PrimitiveKind::Number),
        Some("string") => Some(PrimitiveKind::String),
        Some("boolean") => Some(PrimitiveKind::Boolean),
        _ => enum_values.first().map(kind_of_value),
    };
    match kind {
        Some(kind) => Schema::new(SchemaType::Primitive {
            kind,
            format: obj
                .get("format")
                .and_then(serde_json::Value::as_str)
                .map(Into::into),
            enum_values,
            description,
        }),
        None => Schema::any(),
    }
}

pub(crate) fn kind_of_value(v: &Value) -> PrimitiveKind {
    match v {
        Value::Int(_) | Value::Uint(_) => PrimitiveKind::Integer,
        Value::Float(_) => PrimitiveKind::Number,
        Value::String(_) => PrimitiveKind::String,
    }
}

/// Append every local definitions key referenced from `schema`, depth-first,
/// keeping first-seen order.
pub(crate) fn collect_refs(schema: &Schema, out: &mut IndexSet<Str>) {
    if let Some(target) = schema.ref_target() {
        out.insert(target.into());
        return;
    }
    match schema.as_type() {
        SchemaType::Array { items, .. } => collect_refs(items, out),
        SchemaType::Object {
            properties,
            additional_properties,
            ..
        } => {
            for child in properties.values() {
                collect_refs(child, out);
            }
            if let Some(extra) = additional_properties {
                collect_refs(extra, out);
            }
        }
        SchemaType::AllOf { schemas, .. } => {
            for child in schemas {
                collect_refs(child, out);
            }
        }
        _ => {}
    }
}

/// Rewrite local references whose target fails `keep` into opaque objects.
/// Returns the rewritten schema and the targets that were dropped.
pub(crate) fn prune_dangling(schema: &Schema, keep: &dyn Fn(&str) -> bool) -> (Schema, Vec<Str>) {
    let mut dropped = Vec::new();
    let pruned = prune(schema, keep, &mut dropped);
    (pruned, dropped)
}

fn prune(schema: &Schema, keep: &dyn Fn(&str) -> bool, dropped: &mut Vec<Str>) -> Schema {
    if let Some(target) = schema.ref_target() {
        if keep(target) {
            return schema.clone();
        }
        dropped.push(target.into());
        return Schema::opaque_object();
    }
    match schema.as_type() {
        SchemaType::Array { items, description } => Schema::new(SchemaType::Array {
            items: prune(items, keep, dropped),
            description: description.clone(),
        }),
        SchemaType::Object {
            properties,
            required,
            additional_properties,
            description,
        } => Schema::new(SchemaType::Object {
            properties: properties
                .iter()
                .map(|(name, child)| (name.clone(), prune(child, keep, dropped)))
                .collect(),
            required: required.clone(),
            additional_properties: additional_properties
                .as_ref()
                .map(|extra| prune(extra, keep, dropped)),
            description: description.clone(),
        }),
        SchemaType::AllOf {
            schemas,
            description,
        } => Schema::new(SchemaType::AllOf {
            schemas: schemas.iter().map(|s| prune(s, keep, dropped)).collect(),
            description: description.clone(),
        }),
        _ => schema.clone(),
    }
}

lazy_static! {
    /// Source primitive name → (schema type, swagger format).
    static ref PRIMITIVES: HashMap<&'static str, (PrimitiveKind, Option<&'static str>)> = {
        let mut m = HashMap::new();
        m.insert("int", (PrimitiveKind::Integer, None));
        m.insert("int8", (PrimitiveKind::Integer, None));
        m.insert("int16", (PrimitiveKind::Integer, None));
        m.insert("int32", (PrimitiveKind::Integer, Some("int32")));
        m.insert("int64", (PrimitiveKind::Integer, Some("int64")));
        m.insert("uint", (PrimitiveKind::Integer, None));
        m.insert("uint8", (PrimitiveKind::Integer, None));
        m.insert("uint16", (PrimitiveKind::Integer, None));
        m.insert("uint32", (PrimitiveKind::Integer, Some("int32")));
        m.insert("uint64", (PrimitiveKind::Integer, Some("int64")));
        m.insert("byte", (PrimitiveKind::Integer, None));
        m.insert("rune", (PrimitiveKind::Integer, Some("int32")));
        m.insert("float32", (PrimitiveKind::Number, Some("float")));
        m.insert("float64", (PrimitiveKind::Number, Some("double")));
        m.insert("string", (PrimitiveKind::String, None));
        m.insert("bool", (PrimitiveKind::Boolean, None));
        m.insert("time.Time", (PrimitiveKind::String, Some("date-time")));
        m.insert("uuid.UUID", (PrimitiveKind::String, Some("uuid")));
        m.insert("decimal.Decimal", (PrimitiveKind::Number, None));
        m
    };
}

pub(crate) fn primitive(name: &str) -> Option<Schema> {
    PRIMITIVES.get(name).map(|(kind, format)| {
        Schema::new(SchemaType::Primitive {
            kind: *kind,
            format: format.map(Into::into),
            enum_values: Vec::new(),
            description: None,
        })
    })
}
