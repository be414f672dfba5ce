//! Test harness for dfx canister tests
//!
//! Ties the template renderer and the dfx layer together: a [`Session`]
//! renders argument files, runs a [`TestScript`], reports each validation and
//! removes every canister and identity it created.

pub mod config;
pub mod error;
pub mod report;
pub mod script;
pub mod session;

pub use config::{DEFAULT_CONFIG_FILE, HarnessConfig};
pub use error::HarnessError;
pub use report::{Reporter, RunLog};
pub use script::{DeployScript, ExternalScript, TestScript, available_scripts, load_script};
pub use session::{CleanupSummary, RunSummary, Session, Stage};

use dfxtest_model::ScriptInput;

/// Script input for `canister` out of the configured canisters
///
/// # Errors
///
/// Returns `HarnessError::UnknownCanister` if `canister` is not configured
pub fn select_canister(config: &HarnessConfig, canister: &str) -> Result<ScriptInput, HarnessError> {
    if !config.canisters.contains_key(canister) {
        return Err(HarnessError::UnknownCanister(canister.to_string()));
    }
    Ok(config.script_input(canister))
}

/// Check that a Script Input names a canister it also describes
///
/// # Errors
///
/// Returns `HarnessError::NoSelectedCanister` or `HarnessError::UnknownCanister`
pub fn check_input(input: &ScriptInput) -> Result<(), HarnessError> {
    if input.selected_canister.is_empty() {
        return Err(HarnessError::NoSelectedCanister);
    }
    if !input.canisters.contains_key(&input.selected_canister) {
        return Err(HarnessError::UnknownCanister(input.selected_canister.clone()));
    }
    Ok(())
}
