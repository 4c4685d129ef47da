// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use anyhow::Result;
use declgen::unstable::{Instantiator, PackageCache};
use declgen::*;
use serde_json::json;
use std::sync::Arc;

fn wire_field(name: &str, type_text: &str, wire: &str) -> Result<Field> {
    Ok(Field {
        name: name.into(),
        embedded: false,
        type_expr: TypeExpr::parse(type_text)
            .ok_or_else(|| anyhow::anyhow!("bad type text {type_text}"))?,
        tag: FieldTag {
            rename: Some(wire.into()),
            ..Default::default()
        },
        doc: None,
    })
}

#[test]
fn end_to_end() -> Result<()> {
    let mut engine = Engine::new();
    engine.add_file("example.com/store", "store", "store.go", true);

    let mut status = TypeDecl::new("Status", "example.com/store", "store");
    status.underlying = TypeExpr::parse("string");
    engine.add_type(status);
    for (name, text, index) in [("StatusOpen", "open", 0u32), ("StatusClosed", "closed", 1)] {
        let mut c = ConstDecl::new(
            name,
            "example.com/store",
            Ref::new(ConstExpr::Str(text.into())),
        );
        c.decl_type = Some("Status".into());
        c.block_index = index;
        engine.add_constant(c);
    }

    let mut order = TypeDecl::new("Order", "example.com/store", "store");
    order.fields = vec![
        {
            let mut f = wire_field("ID", "int64", "id")?;
            f.tag.tier = Some(Visibility::View);
            f
        },
        wire_field("Status", "Status", "status")?,
        {
            let mut f = wire_field("Note", "*string", "note")?;
            f.tag.omit_empty = true;
            f
        },
        wire_field("Items", "[]int", "items")?,
    ];
    engine.add_type(order);

    engine.add_operations_json(
        r##"[
            {
                "name": "getOrder",
                "file": "store_routes.go",
                "responses": [{"$ref": "#/definitions/store.Order"}]
            },
            {
                "name": "listOrders",
                "file": "store_routes.go",
                "responses": [
                    {"type": "array", "items": {"$ref": "#/definitions/store.OrderPublic"}}
                ]
            }
        ]"##,
    )?;

    let defs = engine.build()?;
    let keys: Vec<&str> = defs.keys().map(|k| k.as_ref()).collect();
    assert_eq!(
        keys,
        vec!["Order", "OrderPublic", "store.Order", "store.OrderPublic"]
    );
    assert_eq!(
        serde_json::to_value(&defs["store.Order"])?,
        json!({
            "type": "object",
            "properties": {
                "id": {"type": "integer", "format": "int64"},
                "status": {"type": "string", "enum": ["open", "closed"]},
                "note": {"type": "string"},
                "items": {"type": "array", "items": {"type": "integer"}}
            },
            "required": ["id", "status", "items"]
        })
    );
    assert_eq!(
        serde_json::to_value(&defs["store.OrderPublic"])?,
        json!({
            "type": "object",
            "properties": {
                "id": {"type": "integer", "format": "int64"}
            },
            "required": ["id"]
        })
    );
    assert_eq!(
        serde_json::to_value(&defs["Order"])?,
        json!({"$ref": "#/definitions/store.Order"})
    );

    // Building again reaches the same fixed point.
    let again = engine.build()?;
    assert_eq!(serde_json::to_value(&again)?, serde_json::to_value(&defs)?);
    Ok(())
}

#[test]
fn cloned_engines_share_caches_but_not_declarations() -> Result<()> {
    let mut engine = Engine::new();
    engine.add_file("example.com/user", "user", "user.go", true);
    let mut user = TypeDecl::new("User", "example.com/user", "user");
    user.fields = vec![wire_field("Name", "string", "name")?];
    engine.add_type(user);
    engine.add_operation(Operation {
        name: "getUser".into(),
        file: "routes.go".into(),
        parameters: Vec::new(),
        responses: vec![Schema::reference("user.User")],
    });
    engine.seed_package_cache();

    let mut other = engine.clone();
    let mut audit = TypeDecl::new("Audit", "example.com/user", "user");
    audit.fields = vec![wire_field("Actor", "string", "actor")?];
    other.add_type(audit);
    other.add_operation(Operation {
        name: "getAudit".into(),
        file: "routes.go".into(),
        parameters: Vec::new(),
        responses: vec![Schema::reference("user.Audit")],
    });

    // Declarations added after the clone stay on that clone.
    let defs = engine.build()?;
    assert!(defs.contains_key("user.User"));
    assert!(!defs.contains_key("user.Audit"));

    let other_defs = other.build()?;
    assert!(other_defs.contains_key("user.User"));
    assert!(other_defs.contains_key("user.Audit"));

    // The constant-membership cache rides along with the clone.
    assert_eq!(engine.cache_stats().entries, other.cache_stats().entries);
    Ok(())
}

#[test]
fn seeded_cache_feeds_a_second_engine() -> Result<()> {
    let package_cache = Arc::new(PackageCache::new());
    let instantiator = Arc::new(Instantiator::new());

    // First engine knows the constants and publishes the grouping.
    let mut first = Engine::with_caches(package_cache.clone(), instantiator.clone());
    first.add_type({
        let mut t = TypeDecl::new("RoleEnum", "example.com/user", "user");
        t.underlying = TypeExpr::parse("int");
        t
    });
    for (name, value, index) in [("RoleAdmin", "1", 0u32), ("RoleUser", "2", 1)] {
        let mut c = ConstDecl::new(
            name,
            "example.com/user",
            Ref::new(ConstExpr::Int(value.into())),
        );
        c.decl_type = Some("RoleEnum".into());
        c.block_index = index;
        first.add_constant(c);
    }
    first.seed_package_cache();

    // Second engine declares the type but none of its constants; enum
    // membership comes from the shared cache.
    let mut second = Engine::with_caches(package_cache.clone(), instantiator);
    second.add_type({
        let mut t = TypeDecl::new("RoleEnum", "example.com/user", "user");
        t.underlying = TypeExpr::parse("int");
        t
    });
    let mut account = TypeDecl::new("Account", "example.com/acct", "acct");
    account.fields = vec![wire_field("Role", "user.RoleEnum", "role")?];
    second.add_type(account);
    second.add_operation(Operation {
        name: "getAccount".into(),
        file: "routes.go".into(),
        parameters: Vec::new(),
        responses: vec![Schema::reference("acct.Account")],
    });

    let defs = second.build()?;
    assert_eq!(
        serde_json::to_value(&defs["acct.Account"])?,
        json!({
            "type": "object",
            "properties": {
                "role": {"type": "integer", "enum": [1, 2]}
            },
            "required": ["role"]
        })
    );
    assert!(second.cache_stats().hits >= 1);
    Ok(())
}
