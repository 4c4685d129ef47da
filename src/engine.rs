// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::builder::SchemaBuilder;
use crate::cache::{CacheStats, PackageCache};
use crate::decl::{empty_str, ConstDecl, Ref, TypeDecl};
use crate::enums::EnumResolver;
use crate::errors::ResolveError;
use crate::generics::Instantiator;
use crate::lookup::resolve_name;
use crate::overrides::{Decision, Overrides};
use crate::registry::DeclRegistry;
use crate::schema::{self, Schema};
use crate::Str;

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use anyhow::{bail, Result};
use indexmap::IndexSet;
use rayon::prelude::*;
use serde::Deserialize;
use tracing::{debug, warn};

/// The assembled output: canonical name to schema, sorted by name.
pub type Definitions = BTreeMap<Str, Schema>;

/// One documented endpoint. Only its schema references matter here; they
/// are the roots the demand-driven build grows from.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub name: Str,
    /// Source file the operation was collected from. Grouping by file keeps
    /// the parallel reference scan deterministic.
    #[serde(default = "empty_str")]
    pub file: Str,
    #[serde(default)]
    pub parameters: Vec<Schema>,
    #[serde(default)]
    pub responses: Vec<Schema>,
}

/// The schema synthesis engine.
#[derive(Clone)]
pub struct Engine {
    registry: DeclRegistry,
    instantiator: Arc<Instantiator>,
    package_cache: Arc<PackageCache>,
    overrides: Overrides,
    operations: Vec<Operation>,
    force_required: bool,
    prepared: bool,
}

/// Create a default engine.
impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::with_caches(Arc::new(PackageCache::new()), Arc::new(Instantiator::new()))
    }

    /// Share the constant-membership and instantiation caches with other
    /// engines, e.g. across incremental documentation runs.
    pub fn with_caches(package_cache: Arc<PackageCache>, instantiator: Arc<Instantiator>) -> Self {
        Self {
            registry: DeclRegistry::new(),
            instantiator,
            package_cache,
            overrides: Overrides::default(),
            operations: Vec::new(),
            force_required: false,
            prepared: false,
        }
    }

    pub fn add_file(&mut self, pkg_path: &str, pkg_name: &str, file: &str, full_docs: bool) {
        self.registry.add_file(pkg_path, pkg_name, file, full_docs);
        // if declarations change, names need to be finalized again
        self.prepared = false;
    }

    pub fn add_type(&mut self, decl: TypeDecl) -> Ref<TypeDecl> {
        self.prepared = false;
        self.registry.add_type(decl)
    }

    pub fn add_constant(&mut self, decl: ConstDecl) -> Ref<ConstDecl> {
        self.prepared = false;
        self.registry.add_constant(decl)
    }

    pub fn add_operation(&mut self, operation: Operation) {
        self.operations.push(operation);
    }

    /// Load operations from a JSON array, as emitted by route scanners.
    pub fn add_operations_json(&mut self, json: &str) -> Result<()> {
        let operations: Vec<Operation> = serde_json::from_str(json)?;
        self.operations.extend(operations);
        Ok(())
    }

    /// Parse `skip` and `replace` directives and merge them in.
    pub fn add_overrides(&mut self, text: &str) {
        self.overrides.parse_into(text);
    }

    /// Mark every field required regardless of its omit-empty tag.
    pub fn set_force_required(&mut self, force: bool) {
        self.force_required = force;
    }

    /// Pre-populate the shared constant-membership cache for all registered
    /// packages so later builds start warm.
    pub fn seed_package_cache(&self) {
        self.package_cache.seed(&self.registry);
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.package_cache.stats()
    }

    pub fn registry(&self) -> &DeclRegistry {
        &self.registry
    }

    fn prepare(&mut self) {
        if !self.prepared {
            self.registry.finalize_names();
            self.prepared = true;
        }
    }

    /// Resolve every type reachable from the registered operations and
    /// assemble the definitions map.
    pub fn build(&mut self) -> Result<Definitions> {
        self.prepare();

        let roots = self.collect_referenced();
        if self.registry.is_empty() {
            if roots.is_empty() {
                return Ok(Definitions::new());
            }
            bail!(
                "no declarations registered; {} referenced type(s) cannot be resolved",
                roots.len()
            );
        }

        let mut defs = Definitions::new();
        let mut enums = EnumResolver::new(self.package_cache.clone());
        let mut worklist: VecDeque<Str> = roots.into_iter().collect();
        let mut processed: BTreeSet<Str> = BTreeSet::new();
        while let Some(name) = worklist.pop_front() {
            if !processed.insert(name.clone()) {
                continue;
            }
            self.process_name(&name, &mut defs, &mut enums, &mut worklist);
        }

        self.redirect_short_names(&mut defs);
        prune_dangling_refs(&mut defs);
        Ok(defs)
    }

    /// Gather `$ref` targets from all operations. Operations are grouped by
    /// source file and scanned in parallel; the per-file buffers are merged
    /// in sorted file order so the root list never depends on thread timing.
    fn collect_referenced(&self) -> Vec<Str> {
        let mut by_file: BTreeMap<&str, Vec<&Operation>> = BTreeMap::new();
        for op in &self.operations {
            by_file.entry(op.file.as_ref()).or_default().push(op);
        }
        let groups: Vec<(&str, Vec<&Operation>)> = by_file.into_iter().collect();
        let mut per_file: Vec<(&str, IndexSet<Str>)> = groups
            .par_iter()
            .map(|(file, ops)| {
                let mut refs = IndexSet::new();
                for op in ops {
                    for s in op.parameters.iter().chain(op.responses.iter()) {
                        schema::collect_refs(s, &mut refs);
                    }
                }
                (*file, refs)
            })
            .collect();
        per_file.sort_by(|a, b| a.0.cmp(b.0));

        let mut merged: IndexSet<Str> = IndexSet::new();
        for (_, refs) in per_file {
            merged.extend(refs);
        }
        merged.into_iter().collect()
    }

    fn process_name(
        &self,
        name: &Str,
        defs: &mut Definitions,
        enums: &mut EnumResolver,
        worklist: &mut VecDeque<Str>,
    ) {
        if defs.contains_key(name) {
            return;
        }
        match self.overrides.decide(name) {
            Decision::Skip => {
                debug!(name = %name, "referenced type skipped by override");
                return;
            }
            Decision::Replace(with) => {
                worklist.push_back(with);
                return;
            }
            Decision::Keep => {}
        }
        let (decl, public_variant) = match self.resolve_root(name) {
            Some(found) => found,
            None => {
                let err = ResolveError::NotFound {
                    name: name.to_string(),
                };
                debug!(error = %err, "referenced type has no declaration");
                return;
            }
        };

        let mut builder = SchemaBuilder::new(
            &self.registry,
            &self.instantiator,
            enums,
            &self.overrides,
            self.force_required,
        );
        let canonical = self.registry.canonical_name(&decl);
        if decl.is_struct() {
            // Both tiers are materialized whenever either is referenced, so
            // a public consumer and an internal one agree on what exists.
            let public_key: Str = format!("{canonical}Public").into();
            if !defs.contains_key(&canonical) {
                let built = builder.build(&decl, false);
                defs.insert(canonical.clone(), built.schema);
                worklist.extend(built.nested);
            }
            if !defs.contains_key(&public_key) {
                let built = builder.build(&decl, true);
                defs.insert(public_key, built.schema);
                worklist.extend(built.nested);
            }
        } else {
            let key: Str = if public_variant {
                format!("{canonical}Public").into()
            } else {
                canonical
            };
            let built = builder.build(&decl, public_variant);
            defs.insert(key, built.schema);
            worklist.extend(built.nested);
        }
    }

    /// Resolve a referenced name, treating a `Public` suffix as a request
    /// for the public projection of the base declaration.
    fn resolve_root(&self, name: &str) -> Option<(Ref<TypeDecl>, bool)> {
        if let Some(decl) = self.resolve_plain(name) {
            return Some((decl, false));
        }
        if let Some(base) = name.strip_suffix("Public") {
            if !base.is_empty() {
                if let Some(decl) = self.resolve_plain(base) {
                    return Some((decl, true));
                }
            }
        }
        None
    }

    fn resolve_plain(&self, name: &str) -> Option<Ref<TypeDecl>> {
        if name.contains('[') {
            self.instantiator.instantiate(&self.registry, name, "")
        } else {
            resolve_name(&self.registry, name).ok()
        }
    }

    /// Add alias entries so qualified definitions can also be referenced by
    /// their bare type name. First qualified key wins; later claims on the
    /// same short name are logged and dropped.
    fn redirect_short_names(&self, defs: &mut Definitions) {
        let mut aliases: BTreeMap<Str, Str> = BTreeMap::new();
        for key in defs.keys() {
            let Some(dot) = key.rfind('.') else { continue };
            let suffix = &key[dot + 1..];
            // Instantiated names carry brackets past the last dot; those
            // never get a short alias.
            if suffix.is_empty()
                || !suffix
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                continue;
            }
            if defs.contains_key(suffix) {
                continue;
            }
            match aliases.entry(suffix.into()) {
                Entry::Vacant(slot) => {
                    slot.insert(key.clone());
                }
                Entry::Occupied(slot) => {
                    let err = ResolveError::AmbiguousRedirect {
                        short: slot.key().to_string(),
                        kept: slot.get().to_string(),
                        ignored: key.to_string(),
                    };
                    warn!(error = %err, "short-name alias dropped");
                }
            }
        }
        for (short, target) in aliases {
            defs.insert(short, Schema::reference(&target));
        }
    }
}

/// Replace references to names that never produced a definition with opaque
/// objects, so the emitted document has no dangling pointers.
fn prune_dangling_refs(defs: &mut Definitions) {
    let keep: BTreeSet<Str> = defs.keys().cloned().collect();
    let live = |target: &str| keep.contains(target);
    for (name, schema) in defs.iter_mut() {
        let (pruned, dropped) = schema::prune_dangling(schema, &live);
        if dropped.is_empty() {
            continue;
        }
        for target in dropped {
            let err = ResolveError::NotFound {
                name: target.to_string(),
            };
            warn!(definition = %name, error = %err, "dangling reference replaced with opaque object");
        }
        *schema = pruned;
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::decl::{ConstExpr, Field, FieldTag, TypeExpr, Visibility};
    use serde_json::json;

    fn field(name: &str, type_text: &str, wire: &str) -> Field {
        Field {
            name: name.into(),
            embedded: false,
            type_expr: TypeExpr::parse(type_text).unwrap(),
            tag: FieldTag {
                rename: Some(wire.into()),
                ..Default::default()
            },
            doc: None,
        }
    }

    fn op(file: &str, refs: &[&str]) -> Operation {
        Operation {
            name: "endpoint".into(),
            file: file.into(),
            parameters: Vec::new(),
            responses: refs.iter().map(|r| Schema::reference(r)).collect(),
        }
    }

    fn user_engine() -> Engine {
        let mut engine = Engine::new();
        engine.add_file("example.com/user", "user", "user.go", true);

        let mut role = TypeDecl::new("RoleEnum", "example.com/user", "user");
        role.underlying = Some(TypeExpr::parse("int").unwrap());
        engine.add_type(role);
        for (name, value, index) in [("Admin", "1", 0u32), ("User", "2", 1)] {
            let mut c = ConstDecl::new(
                name,
                "example.com/user",
                Ref::new(ConstExpr::Int(value.into())),
            );
            c.decl_type = Some("RoleEnum".into());
            c.block_index = index;
            engine.add_constant(c);
        }

        let mut user = TypeDecl::new("User", "example.com/user", "user");
        user.fields = vec![
            {
                let mut f = field("ID", "int64", "id");
                f.tag.tier = Some(Visibility::View);
                f
            },
            {
                let mut f = field("Name", "string", "name");
                f.tag.omit_empty = true;
                f
            },
            field("Role", "RoleEnum", "role"),
        ];
        engine.add_type(user);
        engine
    }

    #[test]
    fn build_produces_both_tiers_and_short_aliases() {
        let mut engine = user_engine();
        engine.add_operation(op("user_routes.go", &["user.User"]));

        let defs = engine.build().unwrap();
        let keys: Vec<&str> = defs.keys().map(Str::as_ref).collect();
        assert_eq!(
            keys,
            vec!["User", "UserPublic", "user.User", "user.UserPublic"]
        );
        assert_eq!(
            serde_json::to_value(&defs["user.User"]).unwrap(),
            json!({
                "type": "object",
                "properties": {
                    "id": {"type": "integer", "format": "int64"},
                    "name": {"type": "string"},
                    "role": {"type": "integer", "enum": [1, 2]}
                },
                "required": ["id", "role"]
            })
        );
        assert_eq!(
            serde_json::to_value(&defs["user.UserPublic"]).unwrap(),
            json!({
                "type": "object",
                "properties": {
                    "id": {"type": "integer", "format": "int64"}
                },
                "required": ["id"]
            })
        );
        assert_eq!(
            serde_json::to_value(&defs["User"]).unwrap(),
            json!({"$ref": "#/definitions/user.User"})
        );

        // A second build observes the same fixed point.
        let again = engine.build().unwrap();
        assert_eq!(
            serde_json::to_value(&again).unwrap(),
            serde_json::to_value(&defs).unwrap()
        );
    }

    #[test]
    fn empty_registry_is_fatal_only_with_roots() {
        let mut engine = Engine::new();
        assert!(engine.build().unwrap().is_empty());

        engine.add_operation(op("user_routes.go", &["user.User"]));
        assert!(engine.build().is_err());
    }

    #[test]
    fn unresolvable_roots_are_logged_not_fatal() {
        let mut engine = user_engine();
        engine.add_operation(op("routes.go", &["ghost.Spirit", "user.User"]));

        let defs = engine.build().unwrap();
        assert!(defs.contains_key("user.User"));
        assert!(!defs.contains_key("ghost.Spirit"));
    }

    #[test]
    fn overrides_skip_and_replace_roots() {
        let mut engine = user_engine();
        let mut secret = TypeDecl::new("Secret", "example.com/internal", "internal");
        secret.fields = vec![field("Key", "string", "key")];
        engine.add_type(secret);
        engine.add_overrides("skip internal.Secret\nreplace old.Thing user.User\n");
        engine.add_operation(op("routes.go", &["internal.Secret", "old.Thing"]));

        let defs = engine.build().unwrap();
        assert!(!defs.contains_key("internal.Secret"));
        assert!(!defs.contains_key("old.Thing"));
        assert!(defs.contains_key("user.User"));
        assert!(defs.contains_key("user.UserPublic"));
    }

    #[test]
    fn nested_references_are_built_to_a_fixed_point() {
        let mut engine = user_engine();
        let mut profile = TypeDecl::new("Profile", "example.com/user", "user");
        profile.fields = vec![field("Bio", "string", "bio")];
        engine.add_type(profile);
        let mut account = TypeDecl::new("Account", "example.com/user", "user");
        account.fields = vec![{
            let mut f = field("Profile", "*Profile", "profile");
            f.tag.tier = Some(Visibility::Edit);
            f
        }];
        engine.add_type(account);
        engine.add_operation(op("routes.go", &["user.Account"]));

        let defs = engine.build().unwrap();
        for key in [
            "user.Account",
            "user.AccountPublic",
            "user.Profile",
            "user.ProfilePublic",
        ] {
            assert!(defs.contains_key(key), "missing {key}");
        }
        assert_eq!(
            serde_json::to_value(&defs["user.AccountPublic"]).unwrap(),
            json!({
                "type": "object",
                "properties": {
                    "profile": {"$ref": "#/definitions/user.ProfilePublic"}
                },
                "required": ["profile"]
            })
        );
    }

    #[test]
    fn self_referencing_structs_terminate_with_a_ref_cycle() {
        let mut engine = Engine::new();
        let mut node = TypeDecl::new("Node", "example.com/list", "list");
        node.fields = vec![field("Next", "*Node", "next"), field("Val", "int", "val")];
        engine.add_type(node);
        engine.add_operation(op("routes.go", &["list.Node"]));

        let defs = engine.build().unwrap();
        assert_eq!(
            serde_json::to_value(&defs["list.Node"]).unwrap(),
            json!({
                "type": "object",
                "properties": {
                    "next": {"$ref": "#/definitions/list.Node"},
                    "val": {"type": "integer"}
                },
                "required": ["next", "val"]
            })
        );
    }

    #[test]
    fn colliding_short_names_alias_first_in_order() {
        let mut engine = Engine::new();
        let mut a = TypeDecl::new("Item", "example.com/a", "a");
        a.fields = vec![field("N", "int", "n")];
        engine.add_type(a);
        let mut b = TypeDecl::new("Item", "example.com/b", "b");
        b.fields = vec![field("S", "string", "s")];
        engine.add_type(b);
        engine.add_operation(op("routes.go", &["a.Item", "b.Item"]));

        let defs = engine.build().unwrap();
        assert!(defs.contains_key("example.com_a.Item"));
        assert!(defs.contains_key("example.com_b.Item"));
        assert_eq!(
            serde_json::to_value(&defs["Item"]).unwrap(),
            json!({"$ref": "#/definitions/example.com_a.Item"})
        );
    }

    #[test]
    fn replace_into_skipped_target_is_pruned() {
        let mut engine = Engine::new();
        let mut new = TypeDecl::new("New", "example.com/b", "b");
        new.fields = vec![field("N", "int", "n")];
        engine.add_type(new);
        let mut doc = TypeDecl::new("Doc", "example.com/p", "p");
        doc.fields = vec![field("Old", "a.Old", "old")];
        engine.add_type(doc);
        engine.add_overrides("replace a.Old b.New\nskip b.New\n");
        engine.add_operation(op("routes.go", &["p.Doc"]));

        let defs = engine.build().unwrap();
        assert!(!defs.contains_key("b.New"));
        // The replacement resolved at projection time, then its definition
        // was suppressed; the leftover pointer degrades to an opaque object.
        assert_eq!(
            serde_json::to_value(&defs["p.Doc"]).unwrap(),
            json!({
                "type": "object",
                "properties": {"old": {"type": "object"}},
                "required": ["old"]
            })
        );
    }

    #[test]
    fn force_required_applies_to_every_build() {
        let mut engine = user_engine();
        engine.set_force_required(true);
        engine.add_operation(op("routes.go", &["user.User"]));

        let defs = engine.build().unwrap();
        match defs["user.User"].as_type() {
            crate::schema::SchemaType::Object { required, .. } => {
                let names: Vec<&str> = required.iter().map(Str::as_ref).collect();
                assert_eq!(names, vec!["id", "name", "role"]);
            }
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[test]
    fn operations_load_from_json() {
        let mut engine = user_engine();
        engine
            .add_operations_json(
                r##"[
                    {
                        "name": "getUser",
                        "file": "user_routes.go",
                        "responses": [{"$ref": "#/definitions/user.User"}]
                    },
                    {
                        "name": "listUsers",
                        "responses": [
                            {"type": "array", "items": {"$ref": "#/definitions/user.UserPublic"}}
                        ]
                    }
                ]"##,
            )
            .unwrap();

        let defs = engine.build().unwrap();
        assert!(defs.contains_key("user.User"));
        assert!(defs.contains_key("user.UserPublic"));
    }

    #[test]
    fn cache_seeding_reports_stats() {
        let engine = user_engine();
        engine.seed_package_cache();
        let stats = engine.cache_stats();
        assert_eq!(stats.entries, 1);
    }
}
