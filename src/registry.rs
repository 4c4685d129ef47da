// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Package-indexed declaration store.
//!
//! Ingestion is sequential and idempotent: registering the same qualified
//! name twice keeps the later declaration (logged at debug, never fatal).
//! Short-name uniqueness cannot be judged until every package has been
//! seen, so [`DeclRegistry::finalize_names`] runs as a single pass before
//! canonical names are derived.

use crate::decl::{ConstDecl, Ref, TypeDecl};
use crate::eval::ConstResolver;
use crate::Str;
use indexmap::IndexMap;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

#[derive(Debug, Clone)]
pub(crate) struct Package {
    pub(crate) name: Str,
    /// File identity → full-docs eligibility.
    files: BTreeMap<Str, bool>,
    /// Types in declaration order; replacement keeps the original position.
    pub(crate) types: IndexMap<Str, Ref<TypeDecl>>,
    /// Constants in declaration order.
    pub(crate) consts: Vec<Ref<ConstDecl>>,
    const_index: HashMap<Str, usize>,
}

impl Package {
    fn new(name: Str) -> Self {
        Self {
            name,
            files: BTreeMap::new(),
            types: IndexMap::new(),
            consts: Vec::new(),
            const_index: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeclRegistry {
    packages: BTreeMap<Str, Package>,
}

impl DeclRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source file and whether its declarations are eligible for
    /// full documentation. Files never registered default to full docs.
    pub fn add_file(&mut self, pkg_path: &str, pkg_name: &str, file: &str, full_docs: bool) {
        let pkg = self
            .packages
            .entry(pkg_path.into())
            .or_insert_with(|| Package::new(pkg_name.into()));
        pkg.files.insert(file.into(), full_docs);
    }

    pub fn add_type(&mut self, mut decl: TypeDecl) -> Ref<TypeDecl> {
        let pkg = self
            .packages
            .entry(decl.pkg_path.clone())
            .or_insert_with(|| Package::new(decl.pkg_name.clone()));
        decl.full_docs = pkg.files.get(&decl.file).copied().unwrap_or(true);
        let r = Ref::new(decl);
        if pkg.types.insert(r.name.clone(), r.clone()).is_some() {
            debug!(name = %r.name, pkg = %r.pkg_path, "duplicate type declaration replaced");
        }
        r
    }

    pub fn add_constant(&mut self, mut decl: ConstDecl) -> Ref<ConstDecl> {
        let pkg_name: Str = decl
            .pkg_path
            .rsplit('/')
            .next()
            .unwrap_or(decl.pkg_path.as_ref())
            .into();
        let pkg = self
            .packages
            .entry(decl.pkg_path.clone())
            .or_insert_with(|| Package::new(pkg_name));
        decl.full_docs = pkg.files.get(&decl.file).copied().unwrap_or(true);
        let r = Ref::new(decl);
        match pkg.const_index.get(&r.name) {
            Some(&i) => {
                debug!(name = %r.name, pkg = %r.pkg_path, "duplicate constant replaced");
                pkg.consts[i] = r.clone();
            }
            None => {
                pkg.const_index.insert(r.name.clone(), pkg.consts.len());
                pkg.consts.push(r.clone());
            }
        }
        r
    }

    /// Exact lookup by (package path, type name).
    pub fn resolve_qualified(&self, pkg_path: &str, name: &str) -> Option<Ref<TypeDecl>> {
        self.packages.get(pkg_path)?.types.get(name).cloned()
    }

    /// Best-effort search across every package, in package-path order.
    /// O(packages); callers keep this out of hot loops.
    pub fn resolve_short(&self, name: &str) -> Option<Ref<TypeDecl>> {
        let mut found: Option<Ref<TypeDecl>> = None;
        for (path, pkg) in &self.packages {
            if let Some(d) = pkg.types.get(name) {
                if let Some(first) = &found {
                    debug!(name, kept = %first.pkg_path, ignored = %path.as_ref(),
                           "short-name lookup is ambiguous");
                    break;
                }
                found = Some(d.clone());
            }
        }
        found
    }

    /// Set uniqueness flags now that the whole declaration set is known.
    /// Safe to run again after late registrations.
    pub fn finalize_names(&mut self) {
        let mut counts: HashMap<&str, u32> = HashMap::new();
        for pkg in self.packages.values() {
            for name in pkg.types.keys() {
                *counts.entry(name.as_ref()).or_default() += 1;
            }
        }
        for pkg in self.packages.values() {
            for (name, decl) in &pkg.types {
                decl.set_unique(counts.get(name.as_ref()).copied() == Some(1));
            }
        }
    }

    /// The unique output key for a declaration. Requires `finalize_names`
    /// to have run for collision-accurate results.
    pub fn canonical_name(&self, decl: &TypeDecl) -> Str {
        if decl.is_unique() {
            format!("{}.{}", decl.pkg_name, decl.name).into()
        } else {
            format!("{}.{}", sanitize_path(&decl.pkg_path), decl.name).into()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.packages
            .values()
            .all(|p| p.types.is_empty() && p.consts.is_empty())
    }

    pub fn type_count(&self) -> usize {
        self.packages.values().map(|p| p.types.len()).sum()
    }

    pub(crate) fn packages(&self) -> impl Iterator<Item = (&Str, &Package)> {
        self.packages.iter()
    }

    pub(crate) fn packages_by_name<'a>(
        &'a self,
        pkg_name: &'a str,
    ) -> impl Iterator<Item = (&'a Str, &'a Package)> {
        self.packages
            .iter()
            .filter(move |(_, p)| p.name.as_ref() == pkg_name)
    }

    pub(crate) fn const_decls(&self, pkg_path: &str) -> &[Ref<ConstDecl>] {
        self.packages
            .get(pkg_path)
            .map(|p| p.consts.as_slice())
            .unwrap_or(&[])
    }

    pub(crate) fn resolve_const(&self, pkg_path: &str, name: &str) -> Option<Ref<ConstDecl>> {
        let pkg = self.packages.get(pkg_path)?;
        pkg.const_index
            .get(name)
            .and_then(|i| pkg.consts.get(*i))
            .cloned()
    }
}

/// Path separators are encoded into collision-proof canonical names.
pub(crate) fn sanitize_path(path: &str) -> String {
    path.chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect()
}

/// Registry-backed identifier resolution for the constant evaluator.
pub struct RegistryConstResolver<'a> {
    registry: &'a DeclRegistry,
}

impl<'a> RegistryConstResolver<'a> {
    pub fn new(registry: &'a DeclRegistry) -> Self {
        Self { registry }
    }
}

impl ConstResolver for RegistryConstResolver<'_> {
    fn resolve(&self, pkg_path: &str, name: &str) -> Option<Ref<ConstDecl>> {
        self.registry.resolve_const(pkg_path, name)
    }

    fn resolve_qualified(&self, _from_pkg: &str, pkg: &str, name: &str) -> Option<Ref<ConstDecl>> {
        // The selector may name a full path or a declaring-file package name.
        if let Some(c) = self.registry.resolve_const(pkg, name) {
            return Some(c);
        }
        for (path, _) in self.registry.packages_by_name(pkg) {
            if let Some(c) = self.registry.resolve_const(path, name) {
                return Some(c);
            }
        }
        None
    }
}
