// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![allow(
    clippy::panic,
    clippy::panic_in_result_fn,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::print_stdout
)] // test harness asserts and unwraps to validate engine behavior

use crate::unstable::{Instantiator, PackageCache};
use crate::*;

use anyhow::{bail, Result};
use serde::Deserialize;
use std::sync::Arc;
use test_generator::test_resources;

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct FileSpec {
    pkg_path: String,
    pkg_name: String,
    file: String,
    #[serde(default = "default_full_docs")]
    full_docs: bool,
}

fn default_full_docs() -> bool {
    true
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct TestCase {
    note: String,
    #[serde(default)]
    files: Vec<FileSpec>,
    #[serde(default)]
    types: Vec<TypeDecl>,
    #[serde(default)]
    constants: Vec<ConstDecl>,
    #[serde(default)]
    operations: Vec<Operation>,
    #[serde(default)]
    overrides: Option<String>,
    #[serde(default)]
    force_required: bool,
    want_definitions: Option<serde_json::Value>,
    error: Option<String>,
    skip: Option<bool>,
}

#[derive(Deserialize, Debug)]
struct YamlTest {
    cases: Vec<TestCase>,
}

fn build_definitions(case: &mut TestCase) -> Result<Definitions> {
    let mut engine =
        Engine::with_caches(Arc::new(PackageCache::new()), Arc::new(Instantiator::new()));
    for f in &case.files {
        engine.add_file(&f.pkg_path, &f.pkg_name, &f.file, f.full_docs);
    }
    for decl in case.types.drain(..) {
        engine.add_type(decl);
    }
    for decl in case.constants.drain(..) {
        engine.add_constant(decl);
    }
    for op in case.operations.drain(..) {
        engine.add_operation(op);
    }
    if let Some(text) = &case.overrides {
        engine.add_overrides(text);
    }
    engine.set_force_required(case.force_required);
    engine.seed_package_cache();
    engine.build()
}

fn yaml_test_impl(file: &str) -> Result<()> {
    let yaml_str = std::fs::read_to_string(file)?;
    let test: YamlTest = serde_yaml::from_str(&yaml_str)?;

    std::println!("running {file}");

    for mut case in test.cases {
        std::print!("case {} ", case.note);
        if case.skip == Some(true) {
            std::println!("skipped");
            continue;
        }

        if case.want_definitions.is_none() && case.error.is_none() {
            panic!("either wantDefinitions or error must be specified in test case.");
        }

        match build_definitions(&mut case) {
            Ok(defs) => {
                let Some(want) = case.want_definitions else {
                    bail!("build succeeded and did not produce any errors");
                };
                let got = serde_json::to_value(&defs)?;
                if got != want {
                    std::println!(
                        "definitions mismatch:\nwant {}\ngot  {}",
                        serde_json::to_string_pretty(&want)?,
                        serde_json::to_string_pretty(&got)?
                    );
                    bail!("definitions mismatch in case `{}`", case.note);
                }
            }
            Err(actual) => match &case.error {
                Some(expected) => {
                    let actual = actual.to_string();
                    if !actual.contains(expected) {
                        bail!(
                            "Error message\n`{}`\ndoes not contain `{}`",
                            actual,
                            expected
                        );
                    }
                    std::println!("{actual}");
                }
                _ => return Err(actual),
            },
        }

        std::println!("passed");
    }

    Ok(())
}

fn yaml_test(file: &str) -> Result<()> {
    match yaml_test_impl(file) {
        Ok(_) => Ok(()),
        Err(e) => {
            // If Err is returned, it doesn't always get printed by cargo test.
            // Therefore, panic with the error.
            panic!("{e}");
        }
    }
}

#[test]
fn yaml_test_basic() -> Result<()> {
    yaml_test("tests/engine/cases/user_roles.yaml")
}

#[test_resources("tests/engine/**/*.yaml")]
fn run(path: &str) {
    yaml_test(path).unwrap()
}
