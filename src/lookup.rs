// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Name-to-declaration resolution.
//!
//! Schemas and operations refer to types in several spellings: package-name
//! qualified (`user.User`), full-path qualified (`example.com/api/user.User`),
//! bare short names (`User`), and sanitized-path canonical keys
//! (`example.com_api_user.User`). Each spelling is a [`LookupStrategy`];
//! [`resolve_name`] tries them in order and keeps the first hit.

use crate::decl::{Ref, TypeDecl};
use crate::errors::ResolveError;
use crate::registry::{sanitize_path, DeclRegistry};
use tracing::debug;

pub(crate) trait LookupStrategy: Sync {
    fn name(&self) -> &'static str;
    fn resolve(&self, registry: &DeclRegistry, name: &str) -> Option<Ref<TypeDecl>>;
}

/// `pkg.Name` where `pkg` is a package path or a declared package name.
struct QualifiedLookup;

impl LookupStrategy for QualifiedLookup {
    fn name(&self) -> &'static str {
        "qualified"
    }

    fn resolve(&self, registry: &DeclRegistry, name: &str) -> Option<Ref<TypeDecl>> {
        let (qual, short) = name.rsplit_once('.')?;
        if qual.is_empty() || short.is_empty() {
            return None;
        }
        if qual.contains('/') {
            return registry.resolve_qualified(qual, short);
        }
        if let Some(d) = registry.resolve_qualified(qual, short) {
            return Some(d);
        }
        for (_, pkg) in registry.packages_by_name(qual) {
            if let Some(d) = pkg.types.get(short) {
                return Some(d.clone());
            }
        }
        None
    }
}

/// Bare `Name`, searched across every package.
struct ShortNameLookup;

impl LookupStrategy for ShortNameLookup {
    fn name(&self) -> &'static str {
        "short"
    }

    fn resolve(&self, registry: &DeclRegistry, name: &str) -> Option<Ref<TypeDecl>> {
        if name.contains('.') {
            return None;
        }
        registry.resolve_short(name)
    }
}

/// Canonical collision keys where path separators were rewritten to `_`.
struct SanitizedPathLookup;

impl LookupStrategy for SanitizedPathLookup {
    fn name(&self) -> &'static str {
        "sanitized-path"
    }

    fn resolve(&self, registry: &DeclRegistry, name: &str) -> Option<Ref<TypeDecl>> {
        let (qual, short) = name.rsplit_once('.')?;
        for (path, pkg) in registry.packages() {
            if sanitize_path(path) == qual {
                if let Some(d) = pkg.types.get(short) {
                    return Some(d.clone());
                }
            }
        }
        None
    }
}

fn strategies() -> [&'static dyn LookupStrategy; 3] {
    [&QualifiedLookup, &ShortNameLookup, &SanitizedPathLookup]
}

pub(crate) fn resolve_name(
    registry: &DeclRegistry,
    name: &str,
) -> Result<Ref<TypeDecl>, ResolveError> {
    for strategy in strategies() {
        if let Some(d) = strategy.resolve(registry, name) {
            debug!(name, strategy = strategy.name(), "resolved declaration");
            return Ok(d);
        }
    }
    Err(ResolveError::NotFound { name: name.into() })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::decl::TypeDecl;

    fn registry() -> DeclRegistry {
        let mut reg = DeclRegistry::new();
        reg.add_type(TypeDecl::new("User", "example.com/api/user", "user"));
        reg.add_type(TypeDecl::new("Item", "a", "a"));
        reg.add_type(TypeDecl::new("Item", "b", "b"));
        reg.finalize_names();
        reg
    }

    #[test]
    fn qualified_by_package_name() {
        let reg = registry();
        let d = resolve_name(&reg, "user.User").unwrap();
        assert_eq!(d.pkg_path.as_ref(), "example.com/api/user");
    }

    #[test]
    fn qualified_by_full_path() {
        let reg = registry();
        let d = resolve_name(&reg, "example.com/api/user.User").unwrap();
        assert_eq!(d.name.as_ref(), "User");
    }

    #[test]
    fn bare_short_name_scans_packages() {
        let reg = registry();
        let d = resolve_name(&reg, "User").unwrap();
        assert_eq!(d.pkg_path.as_ref(), "example.com/api/user");
    }

    #[test]
    fn sanitized_canonical_key_round_trips() {
        let reg = registry();
        let d = resolve_name(&reg, "example.com_api_user.User").unwrap();
        assert_eq!(d.pkg_path.as_ref(), "example.com/api/user");
    }

    #[test]
    fn unknown_names_report_not_found() {
        let reg = registry();
        let err = resolve_name(&reg, "ghost.Spirit").unwrap_err();
        assert_eq!(
            err,
            ResolveError::NotFound {
                name: "ghost.Spirit".into()
            }
        );
    }
}
