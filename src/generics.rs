// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! On-demand expansion of generic type instantiations.
//!
//! An instantiation is written in source form, e.g. `Box[a.Item]` or
//! `Pair[string,List[int]]`. Expansion resolves the base declaration,
//! normalizes every type argument to a fully qualified spelling, deep-copies
//! the generic with formals replaced, and caches the result under the
//! normalized key so that repeated requests observe the same node.

use crate::decl::{Ref, TypeDecl, TypeExpr};
use crate::errors::ResolveError;
use crate::lookup::resolve_name;
use crate::registry::DeclRegistry;
use crate::Str;
use dashmap::DashMap;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Default)]
pub struct Instantiator {
    /// Normalized instantiation key → expanded declaration. Shared across
    /// engine clones so equal requests stay pointer-identical.
    cache: DashMap<Str, Ref<TypeDecl>>,
}

impl Instantiator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expand `text` (e.g. `Box[a.Item]`) into a concrete declaration.
    /// `from_pkg` anchors unqualified base and argument names. Returns
    /// `None` for malformed syntax, unknown bases, or arity mismatches;
    /// callers degrade to an opaque schema.
    pub fn instantiate(
        &self,
        registry: &DeclRegistry,
        text: &str,
        from_pkg: &str,
    ) -> Option<Ref<TypeDecl>> {
        let (base, arg_texts) = match split_instantiation(text) {
            Some(parts) => parts,
            None => {
                let err = ResolveError::MalformedGenericSyntax { text: text.into() };
                debug!(error = %err, "cannot expand instantiation");
                return None;
            }
        };

        let generic = match registry
            .resolve_qualified(from_pkg, &base)
            .or_else(|| resolve_name(registry, &base).ok())
        {
            Some(d) => d,
            None => {
                debug!(base = %base, "generic base declaration not found");
                return None;
            }
        };
        if generic.type_params.len() != arg_texts.len() || generic.type_params.is_empty() {
            debug!(
                name = %generic.name,
                expected = generic.type_params.len(),
                got = arg_texts.len(),
                "type argument count mismatch"
            );
            return None;
        }

        let mut args = Vec::with_capacity(arg_texts.len());
        let mut full_names = Vec::with_capacity(arg_texts.len());
        for arg in &arg_texts {
            let (expr, full) = self.resolve_arg(registry, arg, from_pkg)?;
            args.push(expr);
            full_names.push(full);
        }

        let key: Str = format!(
            "{}.{}[{}]",
            generic.pkg_path,
            generic.name,
            full_names.join(",")
        )
        .into();
        if let Some(hit) = self.cache.get(&key) {
            return Some(hit.clone());
        }
        let expanded = substitute(&generic, &args, &full_names);
        let node = self
            .cache
            .entry(key)
            .or_insert_with(|| Ref::new(expanded))
            .clone();
        Some(node)
    }

    /// Normalize one type argument to (substitution expression, qualified
    /// spelling used in names and cache keys).
    fn resolve_arg(
        &self,
        registry: &DeclRegistry,
        arg: &str,
        from_pkg: &str,
    ) -> Option<(Ref<TypeExpr>, Str)> {
        if arg.starts_with('*') || arg.starts_with("[]") || arg.starts_with("map[") {
            let expr = TypeExpr::parse(arg)?;
            let full: Str = expr.to_string().into();
            return Some((expr, full));
        }
        if arg.ends_with(']') && arg.contains('[') {
            let inner = self.instantiate(registry, arg, from_pkg)?;
            let full = registry.canonical_name(&inner);
            return Some((Ref::new(TypeExpr::Named(full.clone())), full));
        }
        if let Some(decl) = registry
            .resolve_qualified(from_pkg, arg)
            .or_else(|| resolve_name(registry, arg).ok())
        {
            let full = registry.canonical_name(&decl);
            return Some((Ref::new(TypeExpr::Named(full.clone())), full));
        }
        // Primitives and anything else irreducible pass through verbatim.
        Some((Ref::new(TypeExpr::Named(arg.into())), arg.into()))
    }
}

/// Split `Base[a,b,...]` into the base name and top-level argument texts.
/// Arguments may themselves contain balanced brackets.
fn split_instantiation(text: &str) -> Option<(String, Vec<String>)> {
    let text = text.trim();
    if !text.ends_with(']') {
        return None;
    }
    let open = text.find('[')?;
    let base = text[..open].trim();
    if base.is_empty() {
        return None;
    }
    let inner = &text[open + 1..text.len() - 1];
    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in inner.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => {
                if depth == 0 {
                    return None;
                }
                depth -= 1;
            }
            ',' if depth == 0 => {
                args.push(inner[start..i].trim().to_string());
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return None;
    }
    args.push(inner[start..].trim().to_string());
    if args.iter().any(String::is_empty) {
        return None;
    }
    Some((base.to_string(), args))
}

/// Deep-copy `generic` with every formal parameter replaced. The result is
/// concrete: no formals remain and `type_params` is empty.
fn substitute(generic: &Ref<TypeDecl>, args: &[Ref<TypeExpr>], full_names: &[Str]) -> TypeDecl {
    let map: HashMap<&str, Ref<TypeExpr>> = generic
        .type_params
        .iter()
        .map(Str::as_ref)
        .zip(args.iter().cloned())
        .collect();

    let mut decl = (**generic).clone();
    decl.name = format!("{}[{}]", generic.name, full_names.join(",")).into();
    decl.type_params = Vec::new();
    decl.fields = generic
        .fields
        .iter()
        .map(|f| {
            let mut out = f.clone();
            out.type_expr = subst_expr(&f.type_expr, &map);
            out
        })
        .collect();
    decl.underlying = generic.underlying.as_ref().map(|u| subst_expr(u, &map));
    decl
}

fn subst_expr(expr: &Ref<TypeExpr>, map: &HashMap<&str, Ref<TypeExpr>>) -> Ref<TypeExpr> {
    match expr.as_ref() {
        TypeExpr::Named(n) => {
            if let Some(rep) = map.get(n.as_ref()) {
                rep.clone()
            } else if n.ends_with(']') && n.contains('[') {
                // A nested instantiation mentioning formals by name, e.g.
                // `List[T]` inside `Box[T]`. Rewritten textually and expanded
                // later when the schema for this field is requested.
                Ref::new(TypeExpr::Named(rewrite_call_args(n, map).into()))
            } else {
                expr.clone()
            }
        }
        TypeExpr::Selector { .. } => expr.clone(),
        TypeExpr::Pointer(inner) => Ref::new(TypeExpr::Pointer(subst_expr(inner, map))),
        TypeExpr::Array(inner) => Ref::new(TypeExpr::Array(subst_expr(inner, map))),
        TypeExpr::Map { key, value } => Ref::new(TypeExpr::Map {
            key: subst_expr(key, map),
            value: subst_expr(value, map),
        }),
        TypeExpr::Struct(fields) => Ref::new(TypeExpr::Struct(
            fields
                .iter()
                .map(|f| {
                    let mut out = f.clone();
                    out.type_expr = subst_expr(&f.type_expr, map);
                    out
                })
                .collect(),
        )),
    }
}

fn rewrite_call_args(text: &str, map: &HashMap<&str, Ref<TypeExpr>>) -> String {
    match split_instantiation(text) {
        Some((base, args)) => {
            let rewritten: Vec<String> = args
                .iter()
                .map(|a| match map.get(a.as_str()) {
                    Some(rep) => rep.to_string(),
                    None => rewrite_call_args(a, map),
                })
                .collect();
            format!("{}[{}]", base, rewritten.join(","))
        }
        None => text.to_string(),
    }
}
