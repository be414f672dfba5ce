//! Template rendering feeding the deployer

use dfxtest::template::{output_path_for, placeholders, render_to_dir};
use dfxtest::{CanisterManager, HarnessConfig, TemplateError, VariableContext};
use dfxtest_exec::FakeDfx;
use std::fs;
use tempfile::TempDir;

const LEDGER_TEMPLATE: &str = r#"(variant { Init = record {
    minting_account = "{minter}";
    initial_values = vec { record { "{owner}"; 100_000 } };
} })
"#;

#[test]
fn test_configured_variables_render_ledger_arguments() {
    let dir = TempDir::new().unwrap();
    let template = dir.path().join("ledger.template");
    fs::write(&template, LEDGER_TEMPLATE).unwrap();

    let config = HarnessConfig::from_toml(
        r#"
        [variables]
        minter = "minter-principal"
        owner = "owner-principal"
        "#,
    )
    .unwrap();

    let output = render_to_dir(&template, &config.variable_context(), &dir.path().join("args"))
        .unwrap();

    assert_eq!(output, dir.path().join("args/ledger.candid"));
    let rendered = fs::read_to_string(&output).unwrap();
    assert!(rendered.contains("minting_account = \"minter-principal\";"));
    assert!(rendered.contains("record { \"owner-principal\"; 100_000 }"));
    // Candid braces survive untouched
    assert!(rendered.starts_with("(variant { Init = record {"));
    assert!(placeholders(&rendered).unwrap().is_empty());
}

#[test]
fn test_rendered_file_becomes_install_argument() {
    let dir = TempDir::new().unwrap();
    let template = dir.path().join("backend.template");
    fs::write(&template, "( \"{greeting}\" )\n").unwrap();

    let mut vars = VariableContext::new();
    vars.set("greeting", "hello");
    let output = render_to_dir(&template, &vars, dir.path()).unwrap();

    let dfx = FakeDfx::new();
    let mut canisters = CanisterManager::new(&dfx);
    canisters.deploy("backend", Some(&output)).unwrap();

    assert_eq!(
        dfx.canister("backend").unwrap().argument.as_deref(),
        Some("( \"hello\" )")
    );
    canisters.remove_all_canisters();
}

#[test]
fn test_failed_render_leaves_no_arguments_behind() {
    let dir = TempDir::new().unwrap();
    let template = dir.path().join("backend.template");
    let output = output_path_for(&template, dir.path());

    fs::write(&template, "( \"{greeting}\" )").unwrap();
    let vars: VariableContext = [("greeting", "hi")].into_iter().collect();
    render_to_dir(&template, &vars, dir.path()).unwrap();
    assert!(output.exists());

    fs::write(&template, "( \"{greeting}\", \"{missing}\" )").unwrap();
    let err = render_to_dir(&template, &vars, dir.path()).unwrap_err();

    match err {
        TemplateError::MissingVariables { names, .. } => assert_eq!(names, vec!["missing"]),
        other => panic!("Expected MissingVariables, got {other:?}"),
    }
    assert!(!output.exists());
}
