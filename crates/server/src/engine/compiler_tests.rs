// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::io::Write;

use super::BuiltinCompiler;
use crate::engine::Compiler;

const VALID: &str = r#"
model ants
global {
    int food <- 10;
    init { create ant number: 2; }
}
species ant {
    int carried <- 0;
    reflex gather when: food > 0 {
        carried <- carried + 1;
        food <- food - 1;
    }
    action drop {
        int dropped <- carried;
        carried <- 0;
        return dropped;
    }
}
experiment forage { parameter "Food" var: food; }
"#;

#[test]
fn compiles_model_file() -> anyhow::Result<()> {
    let mut file = tempfile::Builder::new().suffix(".gaml").tempfile()?;
    file.write_all(VALID.as_bytes())?;
    let model = BuiltinCompiler.compile(file.path()).map_err(|e| anyhow::anyhow!("{e:?}"))?;
    assert_eq!(model.name, "ants");
    assert_eq!(model.path.as_deref(), Some(file.path()));
    Ok(())
}

#[test]
fn unreadable_file_is_a_diagnostic() {
    let errors = BuiltinCompiler
        .compile(std::path::Path::new("/nonexistent/model.gaml"))
        .err()
        .unwrap_or_default();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("unable to read"), "{errors:?}");
}

#[test]
fn valid_model_has_no_diagnostics() {
    assert!(BuiltinCompiler.validate(VALID, false).is_empty());
}

#[yare::parameterized(
    unknown_variable = { "model m\nglobal { init { write speed; } }", "Unknown variable: speed" },
    unknown_species = { "model m\nglobal { init { create wolf; } }", "Unknown species: wolf" },
    unknown_operator = { "model m\nglobal { int x <- norm(3); }", "Unknown operator: norm" },
    unknown_action = { "model m\nglobal { init { do fly; } }", "Unknown action: fly" },
    bad_parameter = { "model m\nexperiment e { parameter \"P\" var: p; }", "unknown variable p" },
    duplicate_species = { "model m\nspecies a;\nspecies a;", "declared twice" },
)]
fn semantic_errors(source: &str, expected: &str) {
    let errors = BuiltinCompiler.validate(source, false);
    assert!(errors.iter().any(|d| d.message.contains(expected)), "{errors:?}");
    assert!(BuiltinCompiler.validate(source, true).is_empty());
}

#[test]
fn locals_are_scoped_to_their_block() {
    let source = "model m\nglobal { init { if true { int x <- 1; } write x; } }";
    let errors = BuiltinCompiler.validate(source, false);
    assert_eq!(errors.len(), 1, "{errors:?}");
    assert_eq!(errors[0].to_string(), "global init: Unknown variable: x");
}

#[test]
fn syntax_errors_fail_even_in_syntax_mode() {
    let errors = BuiltinCompiler.validate("model m\nglobal { int <- 3; }", true);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].line, 2);
}

#[test]
fn documentation_lookup() {
    assert!(BuiltinCompiler.documentation("create").is_some_and(|d| d.contains("number")));
    assert_eq!(BuiltinCompiler.documentation("teleport"), None);
}
