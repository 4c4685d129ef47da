// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Declaration-to-schema projection.
//!
//! [`SchemaBuilder::build`] turns one declaration into one definitions
//! entry. Struct fields are walked in declaration order and classified as
//! primitive, array, map, anonymous struct, inline enum, or reference;
//! references are emitted as `$ref` and the target names are reported back
//! so the orchestrator can build them too. The builder itself never
//! recurses through references, which is what keeps cyclic type graphs
//! terminating: the only in-build recursion is embedded-field flattening,
//! guarded by a visited set.

use crate::decl::{Field, Ref, TypeDecl, TypeExpr};
use crate::enums::{EnumDescriptor, EnumResolver};
use crate::errors::ResolveError;
use crate::generics::Instantiator;
use crate::lookup::resolve_name;
use crate::overrides::{Decision, Overrides};
use crate::registry::DeclRegistry;
use crate::schema::{self, PrimitiveKind, Schema, SchemaType};
use crate::Str;
use indexmap::{IndexMap, IndexSet};
use tracing::{debug, warn};

pub(crate) struct SchemaBuilder<'a> {
    registry: &'a DeclRegistry,
    instantiator: &'a Instantiator,
    enums: &'a mut EnumResolver,
    overrides: &'a Overrides,
    force_required: bool,
}

/// A finished definitions entry plus the reference targets it depends on.
pub(crate) struct Built {
    pub(crate) schema: Schema,
    /// Deduplicated, in discovery order.
    pub(crate) nested: Vec<Str>,
}

impl<'a> SchemaBuilder<'a> {
    pub(crate) fn new(
        registry: &'a DeclRegistry,
        instantiator: &'a Instantiator,
        enums: &'a mut EnumResolver,
        overrides: &'a Overrides,
        force_required: bool,
    ) -> Self {
        Self {
            registry,
            instantiator,
            enums,
            overrides,
            force_required,
        }
    }

    /// Build the schema for `decl`. With `public_only`, fields without a
    /// visibility tier are dropped and every emitted reference targets the
    /// `Public` variant of its type.
    pub(crate) fn build(&mut self, decl: &Ref<TypeDecl>, public_only: bool) -> Built {
        let mut nested = IndexSet::new();
        let mut visited = IndexSet::new();
        visited.insert(self.registry.canonical_name(decl));
        let schema = if decl.is_struct() {
            self.object_schema(decl, public_only, &mut nested, &mut visited)
        } else {
            self.underlying_schema(decl, public_only, &mut nested, &mut visited)
        };
        Built {
            schema,
            nested: nested.into_iter().collect(),
        }
    }

    fn object_schema(
        &mut self,
        decl: &TypeDecl,
        public_only: bool,
        nested: &mut IndexSet<Str>,
        visited: &mut IndexSet<Str>,
    ) -> Schema {
        let mut properties = IndexMap::new();
        let mut required = Vec::new();
        self.project_fields(
            decl,
            &decl.fields,
            public_only,
            &mut properties,
            &mut required,
            nested,
            visited,
        );
        let description = if decl.full_docs() {
            decl.doc.clone()
        } else {
            None
        };
        Schema::new(SchemaType::Object {
            properties,
            required,
            additional_properties: None,
            description,
        })
    }

    /// Alias and enum declarations: expand the underlying type.
    fn underlying_schema(
        &mut self,
        decl: &TypeDecl,
        public_only: bool,
        nested: &mut IndexSet<Str>,
        visited: &mut IndexSet<Str>,
    ) -> Schema {
        if let Some(desc) = self.enums.resolve(self.registry, decl) {
            return inline_enum_schema(decl, &desc);
        }
        match &decl.underlying {
            Some(underlying) => {
                let mut schema =
                    self.field_schema(underlying, decl, public_only, nested, visited);
                if decl.full_docs() {
                    if let Some(doc) = &decl.doc {
                        schema = with_description(&schema, doc.clone());
                    }
                }
                schema
            }
            None => Schema::opaque_object(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn project_fields(
        &mut self,
        owner: &TypeDecl,
        fields: &[Field],
        public_only: bool,
        properties: &mut IndexMap<Str, Schema>,
        required: &mut Vec<Str>,
        nested: &mut IndexSet<Str>,
        visited: &mut IndexSet<Str>,
    ) {
        for field in fields {
            if field.tag.skip || field.tag.ignore {
                continue;
            }
            // An embedded member with an explicit wire name serializes like
            // a regular field; only unnamed embedding flattens.
            if field.embedded && field.tag.rename.is_none() {
                self.flatten_embedded(
                    owner, field, public_only, properties, required, nested, visited,
                );
                continue;
            }
            if public_only && field.tag.tier.is_none() {
                continue;
            }
            let name: Str = field
                .tag
                .rename
                .clone()
                .unwrap_or_else(|| field.name.clone());
            let mut schema = self.field_schema(&field.type_expr, owner, public_only, nested, visited);
            if owner.full_docs() {
                if let Some(doc) = &field.doc {
                    schema = with_description(&schema, doc.clone());
                }
            }
            let is_required = self.force_required
                || field.tag.required.unwrap_or(!field.tag.omit_empty);
            if properties.insert(name.clone(), schema).is_some() {
                required.retain(|r| r != &name);
            }
            if is_required {
                required.push(name);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn flatten_embedded(
        &mut self,
        owner: &TypeDecl,
        field: &Field,
        public_only: bool,
        properties: &mut IndexMap<Str, Schema>,
        required: &mut Vec<Str>,
        nested: &mut IndexSet<Str>,
        visited: &mut IndexSet<Str>,
    ) {
        let mut expr = &field.type_expr;
        while let TypeExpr::Pointer(inner) = expr.as_ref() {
            expr = inner;
        }
        let text = match expr.as_ref() {
            TypeExpr::Named(n) => n.to_string(),
            TypeExpr::Selector { pkg, name } => format!("{pkg}.{name}"),
            other => {
                debug!(expr = %other, "embedded member is not a named type; dropped");
                return;
            }
        };
        let target = if text.contains('[') {
            self.instantiator
                .instantiate(self.registry, &text, &owner.pkg_path)
        } else {
            self.registry
                .resolve_qualified(&owner.pkg_path, &text)
                .or_else(|| resolve_name(self.registry, &text).ok())
        };
        let target = match target {
            Some(t) => t,
            None => {
                debug!(type_text = %text, "embedded type not found; dropped");
                return;
            }
        };

        if !target.is_struct() {
            // A non-struct embedding serializes as a member keyed by the
            // type's short name.
            if public_only && field.tag.tier.is_none() {
                return;
            }
            let name = target.name.clone();
            let schema = self.field_schema(&field.type_expr, owner, public_only, nested, visited);
            let is_required = self.force_required
                || field.tag.required.unwrap_or(!field.tag.omit_empty);
            if properties.insert(name.clone(), schema).is_some() {
                required.retain(|r| r != &name);
            }
            if is_required {
                required.push(name);
            }
            return;
        }

        let canonical = self.registry.canonical_name(&target);
        if !visited.insert(canonical.clone()) {
            let err = ResolveError::CyclicReference {
                name: canonical.to_string(),
            };
            debug!(error = %err, "embedded expansion stopped");
            return;
        }
        self.project_fields(
            &target,
            &target.fields,
            public_only,
            properties,
            required,
            nested,
            visited,
        );
    }

    fn field_schema(
        &mut self,
        expr: &Ref<TypeExpr>,
        owner: &TypeDecl,
        public_only: bool,
        nested: &mut IndexSet<Str>,
        visited: &mut IndexSet<Str>,
    ) -> Schema {
        match expr.as_ref() {
            // Pointers affect optionality, not shape.
            TypeExpr::Pointer(inner) => {
                self.field_schema(inner, owner, public_only, nested, visited)
            }
            TypeExpr::Array(inner) => {
                if let TypeExpr::Named(n) = inner.as_ref() {
                    if n.as_ref() == "byte" {
                        // A byte slice serializes as a base64 string.
                        return schema::primitive("string").unwrap_or_else(Schema::any);
                    }
                }
                Schema::new(SchemaType::Array {
                    items: self.field_schema(inner, owner, public_only, nested, visited),
                    description: None,
                })
            }
            TypeExpr::Map { key, value } => {
                let string_keys =
                    matches!(key.as_ref(), TypeExpr::Named(k) if k.as_ref() == "string");
                if string_keys {
                    Schema::new(SchemaType::Object {
                        properties: IndexMap::new(),
                        required: Vec::new(),
                        additional_properties: Some(
                            self.field_schema(value, owner, public_only, nested, visited),
                        ),
                        description: None,
                    })
                } else {
                    Schema::opaque_object()
                }
            }
            TypeExpr::Struct(fields) => {
                let mut properties = IndexMap::new();
                let mut required = Vec::new();
                self.project_fields(
                    owner,
                    fields,
                    public_only,
                    &mut properties,
                    &mut required,
                    nested,
                    visited,
                );
                Schema::new(SchemaType::Object {
                    properties,
                    required,
                    additional_properties: None,
                    description: None,
                })
            }
            TypeExpr::Named(name) => {
                self.named_schema(name, owner, public_only, nested, visited, true)
            }
            TypeExpr::Selector { pkg, name } => {
                let text = format!("{pkg}.{name}");
                self.named_schema(&text, owner, public_only, nested, visited, true)
            }
        }
    }

    /// Classify a name: any, primitive, instantiation, enum, or reference.
    /// `apply_overrides` is cleared when re-resolving a replacement so two
    /// replace directives cannot chase each other forever.
    #[allow(clippy::too_many_arguments)]
    fn named_schema(
        &mut self,
        text: &str,
        owner: &TypeDecl,
        public_only: bool,
        nested: &mut IndexSet<Str>,
        visited: &mut IndexSet<Str>,
        apply_overrides: bool,
    ) -> Schema {
        if is_any_type(text) {
            return Schema::any();
        }
        if let Some(primitive) = schema::primitive(text) {
            return primitive;
        }
        if apply_overrides {
            match self.overrides.decide(text) {
                Decision::Skip => return Schema::opaque_object(),
                Decision::Replace(with) => {
                    return self.named_schema(&with, owner, public_only, nested, visited, false)
                }
                Decision::Keep => {}
            }
        }

        let decl = if text.contains('[') {
            match self
                .instantiator
                .instantiate(self.registry, text, &owner.pkg_path)
            {
                Some(d) => d,
                None => {
                    warn!(type_text = text, "instantiation failed; emitting opaque object");
                    return Schema::opaque_object();
                }
            }
        } else {
            match self.registry.resolve_qualified(&owner.pkg_path, text) {
                Some(d) => d,
                None => match resolve_name(self.registry, text) {
                    Ok(d) => d,
                    Err(err) => {
                        debug!(error = %err, "field type left opaque");
                        return Schema::opaque_object();
                    }
                },
            }
        };

        let canonical = self.registry.canonical_name(&decl);
        if apply_overrides && canonical.as_ref() != text {
            match self.overrides.decide(&canonical) {
                Decision::Skip => return Schema::opaque_object(),
                Decision::Replace(with) => {
                    return self.named_schema(&with, owner, public_only, nested, visited, false)
                }
                Decision::Keep => {}
            }
        }
        if decl.is_generic() {
            warn!(name = %canonical, "generic type referenced without arguments");
            return Schema::opaque_object();
        }

        if !decl.is_struct() {
            if let Some(desc) = self.enums.resolve(self.registry, &decl) {
                // Enums inline; no definitions entry is created for them.
                return inline_enum_schema(&decl, &desc);
            }
        }

        let target: Str = if public_only {
            format!("{canonical}Public").into()
        } else {
            canonical
        };
        nested.insert(target.clone());
        Schema::reference(&target)
    }
}

fn inline_enum_schema(decl: &TypeDecl, desc: &EnumDescriptor) -> Schema {
    let base = decl.underlying.as_ref().and_then(|u| match u.as_ref() {
        TypeExpr::Named(n) => schema::primitive(n),
        _ => None,
    });
    let (kind, format) = match base.as_ref().map(Schema::as_type) {
        Some(SchemaType::Primitive { kind, format, .. }) => (*kind, format.clone()),
        _ => (
            desc.entries
                .first()
                .map(|e| schema::kind_of_value(&e.value))
                .unwrap_or(PrimitiveKind::Integer),
            None,
        ),
    };
    let description = if decl.full_docs() {
        decl.doc.clone()
    } else {
        None
    };
    Schema::new(SchemaType::Primitive {
        kind,
        format,
        enum_values: desc.entries.iter().map(|e| e.value.clone()).collect(),
        description,
    })
}

/// Attach a field's doc comment. References cannot carry a description
/// directly, so they wrap in `allOf`.
fn with_description(schema: &Schema, doc: Str) -> Schema {
    match schema.as_type() {
        SchemaType::Reference { .. } => Schema::new(SchemaType::AllOf {
            schemas: vec![schema.clone()],
            description: Some(doc),
        }),
        SchemaType::Primitive {
            kind,
            format,
            enum_values,
            ..
        } => Schema::new(SchemaType::Primitive {
            kind: *kind,
            format: format.clone(),
            enum_values: enum_values.clone(),
            description: Some(doc),
        }),
        SchemaType::Array { items, .. } => Schema::new(SchemaType::Array {
            items: items.clone(),
            description: Some(doc),
        }),
        SchemaType::Object {
            properties,
            required,
            additional_properties,
            ..
        } => Schema::new(SchemaType::Object {
            properties: properties.clone(),
            required: required.clone(),
            additional_properties: additional_properties.clone(),
            description: Some(doc),
        }),
        SchemaType::AllOf { schemas, .. } => Schema::new(SchemaType::AllOf {
            schemas: schemas.clone(),
            description: Some(doc),
        }),
        SchemaType::Any => schema.clone(),
    }
}

fn is_any_type(text: &str) -> bool {
    matches!(text, "any" | "interface{}" | "interface {}")
}
