//! dfxtest
//!
//! Repeatable canister test runs on top of `dfx`: render Candid init
//! arguments from templates, deploy under throwaway identities, validate, and
//! remove everything again.
//!
//! The work is split over the member crates re-exported here.

pub use dfxtest_exec as exec;
pub use dfxtest_harness as harness;
pub use dfxtest_model as model;
pub use dfxtest_template as template;

pub use dfxtest_exec::{CanisterManager, Dfx, DfxCli, IdentityManager, IdentityScope};
pub use dfxtest_harness::{HarnessConfig, HarnessError, Session, TestScript};
pub use dfxtest_model::{CanisterRecord, IdentityRecord, ScriptInput, Tally, TestOutcome};
pub use dfxtest_template::{TemplateError, VariableContext, render_file};
