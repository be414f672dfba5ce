//! Identity, deployment and cleanup working together

use dfxtest::harness::{Reporter, Session};
use dfxtest::model::DEFAULT_IDENTITY;
use dfxtest::{CanisterManager, IdentityManager, ScriptInput, TestScript, VariableContext};
use dfxtest_exec::FakeDfx;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_identities_and_canisters_are_gone_after_cleanup() {
    let dfx = FakeDfx::new();
    let mut identities = IdentityManager::new(&dfx);
    let mut canisters = CanisterManager::new(&dfx);

    let alice = identities.create("alice").unwrap();
    let bob = identities.create("bob").unwrap();
    assert_ne!(alice.principal, bob.principal);
    assert_eq!(dfx.active(), DEFAULT_IDENTITY);

    canisters.deploy("backend", None).unwrap();
    canisters.deploy("frontend", None).unwrap();
    assert_eq!(dfx.canisters(), vec!["backend", "frontend"]);

    let reports = canisters.remove_all_canisters();
    assert!(reports.iter().all(|report| report.is_clean()));
    assert!(identities.remove_all());

    assert!(dfx.canisters().is_empty());
    assert_eq!(dfx.identities(), vec![DEFAULT_IDENTITY]);
    assert_eq!(dfx.active(), DEFAULT_IDENTITY);
}

#[test]
fn test_deploy_runs_under_default_identity() {
    let dfx = FakeDfx::new();
    let mut identities = IdentityManager::new(&dfx);
    identities.create("tester").unwrap();
    dfx.set_active("tester");

    let mut canisters = CanisterManager::new(&dfx);
    canisters.deploy("backend", None).unwrap();

    let calls = dfx.calls();
    let create = calls.iter().position(|c| c == "canister create backend").unwrap();
    let last_switch = calls[..create]
        .iter()
        .rev()
        .find(|c| c.starts_with("identity use"))
        .unwrap();
    assert_eq!(last_switch, "identity use default");
    // the caller's identity is back afterwards
    assert_eq!(dfx.active(), "tester");

    canisters.remove_all_canisters();
    identities.remove_all();
}

struct TransferScript;

impl TestScript for TransferScript {
    fn name(&self) -> &str {
        "transfer"
    }

    fn run(&self, session: &mut Session<'_>) -> Result<(), dfxtest::HarnessError> {
        let owner = session.create_identity("owner")?;
        session.set_variable("owner", owner.principal.clone());
        session.render_templates();
        session.deploy_and_validate("ledger");
        session.validate("Owner principal", &owner.principal, "owner-principal");
        session.validate("Balance", "0", "100");
        Ok(())
    }
}

#[test]
fn test_script_session_end_to_end() {
    let dir = TempDir::new().unwrap();
    let template = dir.path().join("ledger.template");
    fs::write(&template, "( record { owner = \"{owner}\" } )").unwrap();

    let input = ScriptInput::from_json(&format!(
        r#"{{"canisters": {{"ledger": {{"template_path": "{}"}}}}, "selected_canister": "ledger"}}"#,
        template.display()
    ))
    .unwrap();

    let dfx = FakeDfx::new();
    let session = Session::new(
        &dfx,
        input,
        dir.path().join("args"),
        VariableContext::new(),
        Reporter::quiet(),
    )
    .unwrap();
    let summary = session.run(&TransferScript);

    assert_eq!(summary.tally.total, 3);
    assert_eq!(summary.tally.success, 2);
    assert_eq!(summary.tally.failed, 1);
    assert!(!summary.passed());
    assert_eq!(summary.outcomes[2].to_string(), "TEST 3 FAILED: Balance (Expected: 100, Got: 0)");

    assert_eq!(
        fs::read_to_string(dir.path().join("args/ledger.candid")).unwrap(),
        "( record { owner = \"owner-principal\" } )"
    );
    assert!(summary.cleanup.is_clean());
    assert!(dfx.canisters().is_empty());
    assert_eq!(dfx.identities(), vec![DEFAULT_IDENTITY]);
}
