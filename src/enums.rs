// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Detection of enum-like named types.
//!
//! A named type is enum-like when its declaring package contains constants
//! declared with that type. Detection evaluates each candidate member;
//! members whose expressions cannot be reduced to a value are dropped, as
//! are later members repeating an already-seen value.

use crate::cache::{build_package_consts, PackageCache, PackageConsts};
use crate::decl::{Ref, TypeDecl};
use crate::errors::ResolveError;
use crate::eval::eval_const;
use crate::registry::{DeclRegistry, RegistryConstResolver};
use crate::value::Value;
use crate::Str;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct EnumEntry {
    pub label: Str,
    pub value: Value,
    /// Member documentation; absent when the declaring file is not eligible
    /// for full docs.
    pub comment: Option<Str>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumDescriptor {
    /// Canonical name of the enum type.
    pub type_name: Str,
    pub entries: Vec<EnumEntry>,
}

/// Resolves enum membership with a private first tier over the shared
/// package cache. The local tier makes repeated asks within one build
/// lock-free; the shared tier deduplicates grouping work across builds.
pub struct EnumResolver {
    shared: Arc<PackageCache>,
    local: HashMap<Str, Ref<PackageConsts>>,
}

impl EnumResolver {
    pub fn new(shared: Arc<PackageCache>) -> Self {
        Self {
            shared,
            local: HashMap::new(),
        }
    }

    fn package_consts(&mut self, registry: &DeclRegistry, pkg_path: &Str) -> Ref<PackageConsts> {
        if let Some(found) = self.local.get(pkg_path) {
            return found.clone();
        }
        let node = match self.shared.get(pkg_path) {
            Some(node) => node,
            None => {
                let built = build_package_consts(registry.const_decls(pkg_path));
                self.shared.insert_if_absent(pkg_path, built)
            }
        };
        self.local.insert(pkg_path.clone(), node.clone());
        node
    }

    /// Determine whether `decl` is enum-like and, if so, its entries in
    /// declaration order. `None` means "not an enum": no typed constants,
    /// or none of them evaluated.
    pub fn resolve(
        &mut self,
        registry: &DeclRegistry,
        decl: &TypeDecl,
    ) -> Option<EnumDescriptor> {
        let consts = self.package_consts(registry, &decl.pkg_path);
        let members = consts.members(&decl.name);
        if members.is_empty() {
            return None;
        }

        let resolver = RegistryConstResolver::new(registry);
        let mut entries: Vec<EnumEntry> = Vec::with_capacity(members.len());
        for member in members {
            let value = match eval_const(member, &resolver) {
                Some(v) => v,
                None => {
                    let err = ResolveError::ConstantEvaluationFailure {
                        name: member.name.to_string(),
                    };
                    debug!(error = %err, "enum member dropped");
                    continue;
                }
            };
            if let Some(kept) = entries.iter().find(|e| e.value == value) {
                debug!(
                    label = %member.name,
                    kept = %kept.label,
                    value = %value,
                    "duplicate enum value skipped"
                );
                continue;
            }
            let comment = if member.full_docs() {
                member.doc.clone()
            } else {
                None
            };
            entries.push(EnumEntry {
                label: member.name.clone(),
                value,
                comment,
            });
        }

        if entries.is_empty() {
            return None;
        }
        Some(EnumDescriptor {
            type_name: registry.canonical_name(decl),
            entries,
        })
    }
}
