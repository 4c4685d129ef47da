// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Shared per-package constant groupings.
//!
//! Grouping a package's constants by their declared type is pure work over
//! immutable declarations, so concurrent builders may race to produce the
//! same grouping. The cache resolves such races first-writer-wins: later
//! publications are discarded and every caller ends up holding the same
//! shared node.

use crate::decl::{ConstDecl, Ref};
use crate::registry::DeclRegistry;
use crate::Str;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// One package's constants, grouped by the type they are declared with.
/// Members keep declaration order inside each group. Untyped constants are
/// absent; they can never be enum members.
#[derive(Debug, Clone, Default)]
pub struct PackageConsts {
    by_type: IndexMap<Str, Vec<Ref<ConstDecl>>>,
}

impl PackageConsts {
    pub fn members(&self, type_name: &str) -> &[Ref<ConstDecl>] {
        self.by_type
            .get(type_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}

pub(crate) fn build_package_consts(consts: &[Ref<ConstDecl>]) -> PackageConsts {
    let mut by_type: IndexMap<Str, Vec<Ref<ConstDecl>>> = IndexMap::new();
    for c in consts {
        if let Some(t) = &c.decl_type {
            by_type.entry(t.clone()).or_default().push(c.clone());
        }
    }
    PackageConsts { by_type }
}

/// Counters observed via [`PackageCache::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Process-wide cache of [`PackageConsts`], keyed by package path.
#[derive(Debug, Default)]
pub struct PackageCache {
    inner: RwLock<HashMap<Str, Ref<PackageConsts>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl PackageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, pkg_path: &str) -> Option<Ref<PackageConsts>> {
        let found = self.inner.read().get(pkg_path).cloned();
        match &found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    /// Publish a grouping for `pkg_path` unless one already exists. The
    /// returned node is the surviving entry, which may be an earlier
    /// publication by another thread.
    pub fn insert_if_absent(&self, pkg_path: &str, value: PackageConsts) -> Ref<PackageConsts> {
        self.inner
            .write()
            .entry(pkg_path.into())
            .or_insert_with(|| Ref::new(value))
            .clone()
    }

    /// Eagerly populate the cache for every package in the registry.
    pub fn seed(&self, registry: &DeclRegistry) {
        for (path, pkg) in registry.packages() {
            self.insert_if_absent(path, build_package_consts(&pkg.consts));
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.inner.read().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::decl::{ConstExpr, TypeDecl};

    fn typed_const(name: &str, decl_type: Option<&str>, text: &str) -> ConstDecl {
        let mut c = ConstDecl::new(name, "p", Ref::new(ConstExpr::Int(text.into())));
        c.decl_type = decl_type.map(Into::into);
        c
    }

    #[test]
    fn grouping_keeps_declaration_order_and_drops_untyped() {
        let mut reg = DeclRegistry::new();
        reg.add_type(TypeDecl::new("Role", "p", "p"));
        reg.add_constant(typed_const("RoleAdmin", Some("Role"), "1"));
        reg.add_constant(typed_const("MaxRetries", None, "5"));
        reg.add_constant(typed_const("RoleUser", Some("Role"), "2"));

        let cache = PackageCache::new();
        cache.seed(&reg);
        let consts = cache.get("p").unwrap();
        let names: Vec<&str> = consts
            .members("Role")
            .iter()
            .map(|c| c.name.as_ref())
            .collect();
        assert_eq!(names, vec!["RoleAdmin", "RoleUser"]);
        assert!(consts.members("Retries").is_empty());
    }

    #[test]
    fn first_publication_survives() {
        let cache = PackageCache::new();
        let first = cache.insert_if_absent("p", build_package_consts(&[]));
        let second = cache.insert_if_absent(
            "p",
            build_package_consts(&[Ref::new(typed_const("RoleAdmin", Some("Role"), "1"))]),
        );
        // Pointer identity: the loser of the race observes the winner's node.
        assert_eq!(first, second);
        assert!(second.is_empty());
        assert_eq!(cache.stats().entries, 1);
    }

    #[test]
    fn racing_writers_converge_on_one_node() {
        let cache = PackageCache::new();
        let published: Vec<Ref<PackageConsts>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let cache = &cache;
                    s.spawn(move || {
                        let c = typed_const(&format!("C{i}"), Some("Role"), "1");
                        cache.insert_if_absent("p", build_package_consts(&[Ref::new(c)]))
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for node in &published {
            assert_eq!(node, &published[0]);
        }
    }

    #[test]
    fn stats_count_hits_and_misses() {
        let cache = PackageCache::new();
        assert!(cache.get("p").is_none());
        cache.insert_if_absent("p", build_package_consts(&[]));
        assert!(cache.get("p").is_some());
        assert!(cache.get("q").is_none());
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.entries, 1);
    }
}
