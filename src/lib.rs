// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

// Use README.md as crate documentation.
#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/README.md"))]

mod builder;
mod cache;
mod decl;
mod engine;
mod enums;
mod errors;
mod eval;
mod generics;
mod literal;
mod lookup;
mod overrides;
mod registry;
mod schema;
mod value;

pub use decl::{
    BinaryOp, ConstDecl, ConstExpr, Field, FieldTag, NodeRef, Ref, TypeDecl, TypeExpr, UnaryOp,
    Visibility,
};
pub use engine::{Definitions, Engine, Operation};
pub use errors::ResolveError;
pub use schema::{PrimitiveKind, Schema, SchemaType};
pub use value::Value;

/// Interned string type used throughout the crate.
pub type Str = std::sync::Arc<str>;

/// Items in `unstable` are likely to change.
pub mod unstable {
    pub use crate::cache::{CacheStats, PackageCache, PackageConsts};
    pub use crate::enums::{EnumDescriptor, EnumEntry, EnumResolver};
    pub use crate::eval::{eval_const, ConstResolver};
    pub use crate::generics::Instantiator;
    pub use crate::registry::{DeclRegistry, RegistryConstResolver};
}

#[cfg(test)]
mod tests;
