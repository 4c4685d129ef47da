// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Declaration data model consumed from the collection frontend.
//!
//! Declarations are immutable once registered and are shared as [`Ref`]
//! handles. `Ref` equality is pointer identity, which is what makes interned
//! generic instantiations collapse: two fields instantiating the same
//! (generic, arguments) pair hold the *same* declaration object, not merely
//! an equal one.

use crate::value::Value;
use crate::Str;
use core::cmp;
use core::fmt;
use core::ops::Deref;
use serde::de;
use serde::{Deserialize, Deserializer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Shared handle to an immutable node. Equality and ordering are by pointer
/// identity, not structure.
#[derive(Debug)]
pub struct NodeRef<T> {
    r: Arc<T>,
}

/// All shared declaration and expression nodes use this alias.
pub type Ref<T> = NodeRef<T>;

impl<T> NodeRef<T> {
    pub fn new(t: T) -> Self {
        Self { r: Arc::new(t) }
    }
}

impl<T> Clone for NodeRef<T> {
    fn clone(&self) -> Self {
        Self { r: self.r.clone() }
    }
}

impl<T> cmp::PartialEq for NodeRef<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::as_ptr(&self.r).eq(&Arc::as_ptr(&other.r))
    }
}

impl<T> cmp::Eq for NodeRef<T> {}

impl<T> cmp::PartialOrd for NodeRef<T> {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> cmp::Ord for NodeRef<T> {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        Arc::as_ptr(&self.r).cmp(&Arc::as_ptr(&other.r))
    }
}

impl<T> core::hash::Hash for NodeRef<T> {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.r).hash(state);
    }
}

impl<T> Deref for NodeRef<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.r
    }
}

impl<T> AsRef<T> for NodeRef<T> {
    fn as_ref(&self) -> &T {
        &self.r
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for NodeRef<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        T::deserialize(deserializer).map(NodeRef::new)
    }
}

pub(crate) fn empty_str() -> Str {
    "".into()
}

/// Visibility tier a field's tag may carry. Fields without a tier are
/// dropped from public-view schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    View,
    Edit,
}

/// Serialization metadata parsed from a field's tag by the frontend.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FieldTag {
    /// External (wire) name overriding the declared field name.
    pub rename: Option<Str>,
    /// The field is omitted from serialization when empty.
    pub omit_empty: bool,
    /// The field is never serialized (`-`).
    pub skip: bool,
    /// Explicit required override, taking precedence over `omit_empty`.
    pub required: Option<bool>,
    pub tier: Option<Visibility>,
    /// The field is excluded from documentation output.
    pub ignore: bool,
}

/// One struct member.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    #[serde(default = "empty_str")]
    pub name: Str,
    /// Anonymous member whose own fields flatten into the parent.
    #[serde(default)]
    pub embedded: bool,
    #[serde(rename = "type")]
    pub type_expr: Ref<TypeExpr>,
    #[serde(default)]
    pub tag: FieldTag,
    #[serde(default)]
    pub doc: Option<Str>,
}

/// A field's type reference.
///
/// `Named` carries raw text and may be a primitive, a known type name, a
/// generic formal parameter, or bracketed instantiation text such as
/// `Pair[string,List[int]]`; classification happens at build time.
#[derive(Debug, Clone)]
pub enum TypeExpr {
    Named(Str),
    Selector { pkg: Str, name: Str },
    Pointer(Ref<TypeExpr>),
    Array(Ref<TypeExpr>),
    Map { key: Ref<TypeExpr>, value: Ref<TypeExpr> },
    Struct(Vec<Field>),
}

impl TypeExpr {
    /// Parse the compact textual form: `*X`, `[]X`, `map[K]V`, `pkg.Name`,
    /// `Name`, `Name[Args]`. Returns `None` for text that cannot denote a
    /// type.
    pub fn parse(text: &str) -> Option<Ref<TypeExpr>> {
        Self::parse_expr(text).map(Ref::new)
    }

    fn parse_expr(text: &str) -> Option<TypeExpr> {
        let t = text.trim();
        if t.is_empty() {
            return None;
        }
        if let Some(rest) = t.strip_prefix('*') {
            return Some(TypeExpr::Pointer(Self::parse(rest)?));
        }
        if let Some(rest) = t.strip_prefix("[]") {
            return Some(TypeExpr::Array(Self::parse(rest)?));
        }
        if let Some(rest) = t.strip_prefix("map[") {
            // The key may itself contain brackets; find the matching close.
            let mut depth = 1usize;
            for (i, c) in rest.char_indices() {
                match c {
                    '[' => depth += 1,
                    ']' => {
                        depth -= 1;
                        if depth == 0 {
                            let key = Self::parse(&rest[..i])?;
                            let value = Self::parse(&rest[i + 1..])?;
                            return Some(TypeExpr::Map { key, value });
                        }
                    }
                    _ => {}
                }
            }
            return None;
        }
        if t.contains('[') {
            // Instantiation text stays whole; the instantiator splits it.
            return Some(TypeExpr::Named(t.into()));
        }
        match t.rsplit_once('.') {
            Some((pkg, name)) if !pkg.is_empty() && !name.is_empty() => Some(TypeExpr::Selector {
                pkg: pkg.into(),
                name: name.into(),
            }),
            _ => Some(TypeExpr::Named(t.into())),
        }
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Named(n) => f.write_str(n),
            TypeExpr::Selector { pkg, name } => write!(f, "{pkg}.{name}"),
            TypeExpr::Pointer(x) => write!(f, "*{}", x.as_ref()),
            TypeExpr::Array(x) => write!(f, "[]{}", x.as_ref()),
            TypeExpr::Map { key, value } => {
                write!(f, "map[{}]{}", key.as_ref(), value.as_ref())
            }
            TypeExpr::Struct(_) => f.write_str("struct{..}"),
        }
    }
}

impl<'de> Deserialize<'de> for TypeExpr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse_expr(&text)
            .ok_or_else(|| de::Error::custom(format!("invalid type reference `{text}`")))
    }
}

/// A named type from one package.
///
/// Immutable after construction except for the uniqueness flag, which the
/// registry sets in a single pass once every package has been seen.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeDecl {
    pub name: Str,
    pub pkg_path: Str,
    /// Package name of the declaring file, used for canonical names.
    pub pkg_name: Str,
    #[serde(default = "empty_str")]
    pub file: Str,
    /// Generic formal parameters, empty for concrete types.
    #[serde(default)]
    pub type_params: Vec<Str>,
    /// Struct members, in declaration order.
    #[serde(default)]
    pub fields: Vec<Field>,
    /// Underlying type for aliases and enum bases. `None` means struct.
    #[serde(default)]
    pub underlying: Option<Ref<TypeExpr>>,
    #[serde(default)]
    pub doc: Option<Str>,
    #[serde(skip)]
    pub(crate) full_docs: bool,
    #[serde(skip)]
    unique: AtomicBool,
}

impl TypeDecl {
    pub fn new(name: &str, pkg_path: &str, pkg_name: &str) -> Self {
        Self {
            name: name.into(),
            pkg_path: pkg_path.into(),
            pkg_name: pkg_name.into(),
            file: empty_str(),
            type_params: Vec::new(),
            fields: Vec::new(),
            underlying: None,
            doc: None,
            full_docs: true,
            unique: AtomicBool::new(false),
        }
    }

    pub fn is_struct(&self) -> bool {
        self.underlying.is_none()
    }

    pub fn is_generic(&self) -> bool {
        !self.type_params.is_empty()
    }

    /// Whether the declaring file was flagged for full documentation.
    pub fn full_docs(&self) -> bool {
        self.full_docs
    }

    /// True once `finalize_names` determined no other package declares this
    /// short name.
    pub fn is_unique(&self) -> bool {
        self.unique.load(Ordering::Relaxed)
    }

    pub(crate) fn set_unique(&self, unique: bool) {
        self.unique.store(unique, Ordering::Relaxed);
    }
}

impl Clone for TypeDecl {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            pkg_path: self.pkg_path.clone(),
            pkg_name: self.pkg_name.clone(),
            file: self.file.clone(),
            type_params: self.type_params.clone(),
            fields: self.fields.clone(),
            underlying: self.underlying.clone(),
            doc: self.doc.clone(),
            full_docs: self.full_docs,
            unique: AtomicBool::new(self.is_unique()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UnaryOp {
    Neg,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    AndNot,
    Shl,
    Shr,
}

/// The restricted constant-expression grammar.
///
/// Literal variants carry raw source text (radix prefixes and escape
/// sequences intact); decoding happens during evaluation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConstExpr {
    Int(Str),
    Float(Str),
    Str(Str),
    Char(Str),
    /// Same-package constant, or the block counter identifier `iota`.
    Ident(Str),
    /// Cross-package constant reference.
    Selector { pkg: Str, name: Str },
    Unary { op: UnaryOp, expr: Ref<ConstExpr> },
    Binary {
        op: BinaryOp,
        lhs: Ref<ConstExpr>,
        rhs: Ref<ConstExpr>,
    },
    Paren(Ref<ConstExpr>),
    /// Explicit conversion such as `int32(x)`.
    Call { fcn: Str, args: Vec<Ref<ConstExpr>> },
}

/// A constant declaration, optionally associated with an enum type.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstDecl {
    pub name: Str,
    pub pkg_path: Str,
    #[serde(default = "empty_str")]
    pub file: Str,
    /// Declared type name. `None` means the member can never join an enum:
    /// untyped constants are omitted, not inferred.
    #[serde(default)]
    pub decl_type: Option<Str>,
    /// Ordinal within the declaring constant block; the value of `iota` in
    /// the expression.
    #[serde(default)]
    pub block_index: u32,
    pub expr: Ref<ConstExpr>,
    #[serde(default)]
    pub doc: Option<Str>,
    #[serde(skip)]
    pub(crate) full_docs: bool,
    #[serde(skip)]
    evaluated: OnceLock<Option<Value>>,
}

impl ConstDecl {
    pub fn new(name: &str, pkg_path: &str, expr: Ref<ConstExpr>) -> Self {
        Self {
            name: name.into(),
            pkg_path: pkg_path.into(),
            file: empty_str(),
            decl_type: None,
            block_index: 0,
            expr,
            doc: None,
            full_docs: true,
            evaluated: OnceLock::new(),
        }
    }

    pub fn full_docs(&self) -> bool {
        self.full_docs
    }

    /// `Some` once evaluation ran; the inner value is still `None` when the
    /// expression could not be evaluated.
    pub(crate) fn cached_value(&self) -> Option<Option<Value>> {
        self.evaluated.get().cloned()
    }

    /// First result wins; evaluation is idempotent so a racing duplicate is
    /// identical anyway.
    pub(crate) fn memoize(&self, value: Option<Value>) {
        let _ = self.evaluated.set(value);
    }
}
