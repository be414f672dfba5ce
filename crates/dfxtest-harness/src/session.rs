//! One test run
//!
//! A session walks `Init -> Deploy -> Validate -> Cleanup -> Done`. Templates
//! are rendered at `Init`, the test script deploys and validates, and cleanup
//! always runs before the session reports.

use crate::error::HarnessError;
use crate::report::Reporter;
use crate::script::TestScript;
use dfxtest_exec::{CanisterManager, CleanupReport, Dfx, IdentityManager};
use dfxtest_model::{CanisterRecord, IdentityRecord, ScriptInput, Tally, TestOutcome};
use dfxtest_template::{VariableContext, output_path_for, render_to_dir};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const SUCCESS: &str = "Success";
pub const FAILED: &str = "Failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Init,
    Deploy,
    Validate,
    Cleanup,
    Done,
}

impl Stage {
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Init => Some(Self::Deploy),
            Self::Deploy => Some(Self::Validate),
            Self::Validate => Some(Self::Cleanup),
            Self::Cleanup => Some(Self::Done),
            Self::Done => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Init => "init",
            Self::Deploy => "deploy",
            Self::Validate => "validate",
            Self::Cleanup => "cleanup",
            Self::Done => "done",
        })
    }
}

/// How teardown went
#[derive(Debug)]
pub struct CleanupSummary {
    pub canisters: Vec<CleanupReport>,
    pub identities_removed: bool,
}

impl CleanupSummary {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.identities_removed && self.canisters.iter().all(CleanupReport::is_clean)
    }
}

/// What a finished session hands back
#[derive(Debug)]
pub struct RunSummary {
    pub tally: Tally,
    pub outcomes: Vec<TestOutcome>,
    pub cleanup: CleanupSummary,
    pub log_path: Option<PathBuf>,
}

impl RunSummary {
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.tally.all_passed()
    }
}

pub struct Session<'a> {
    stage: Stage,
    input: ScriptInput,
    args_dir: PathBuf,
    variables: VariableContext,
    identities: IdentityManager<'a, dyn Dfx + 'a>,
    canisters: CanisterManager<'a, dyn Dfx + 'a>,
    tally: Tally,
    outcomes: Vec<TestOutcome>,
    reporter: Reporter,
}

impl<'a> Session<'a> {
    /// Start a session for `input`
    ///
    /// `configured` holds the variables known up front; values set while the
    /// session runs shadow them.
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::NoSelectedCanister` if the input selects nothing
    pub fn new(
        dfx: &'a (dyn Dfx + 'a),
        input: ScriptInput,
        args_dir: impl Into<PathBuf>,
        configured: VariableContext,
        reporter: Reporter,
    ) -> Result<Self, HarnessError> {
        if input.selected_canister.is_empty() {
            return Err(HarnessError::NoSelectedCanister);
        }
        Ok(Self {
            stage: Stage::Init,
            input,
            args_dir: args_dir.into(),
            variables: VariableContext::with_parent(configured),
            identities: IdentityManager::new(dfx),
            canisters: CanisterManager::new(dfx),
            tally: Tally::new(),
            outcomes: Vec::new(),
            reporter,
        })
    }

    #[must_use]
    pub const fn stage(&self) -> Stage {
        self.stage
    }

    #[must_use]
    pub fn input(&self) -> &ScriptInput {
        &self.input
    }

    #[must_use]
    pub fn selected_canister(&self) -> &str {
        &self.input.selected_canister
    }

    /// Where rendered argument files are written
    #[must_use]
    pub fn args_dir(&self) -> &Path {
        &self.args_dir
    }

    #[must_use]
    pub const fn tally(&self) -> &Tally {
        &self.tally
    }

    pub fn reporter(&mut self) -> &mut Reporter {
        &mut self.reporter
    }

    /// Move to the next stage
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::Stage` if `to` does not directly follow the
    /// current stage
    pub fn advance(&mut self, to: Stage) -> Result<(), HarnessError> {
        if self.stage.next() != Some(to) {
            return Err(HarnessError::Stage {
                action: "advance",
                stage: self.stage,
            });
        }
        info!(from = %self.stage, to = %to, "session stage");
        self.stage = to;
        Ok(())
    }

    /// Step forward until `to`, leaving later stages alone
    fn advance_to(&mut self, to: Stage) {
        while self.stage < to {
            let Some(next) = self.stage.next() else { break };
            if let Err(err) = self.advance(next) {
                warn!(%err, "cannot advance session");
                break;
            }
        }
    }

    fn ensure_running(&self, action: &'static str) -> Result<(), HarnessError> {
        if self.stage >= Stage::Cleanup {
            return Err(HarnessError::Stage {
                action,
                stage: self.stage,
            });
        }
        Ok(())
    }

    /// Set a template variable for the rest of the run
    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.variables.set(name, value);
    }

    #[must_use]
    pub fn variable(&self, name: &str) -> Option<&str> {
        self.variables.get(name)
    }

    /// Render the argument file of every canister that has a template
    ///
    /// A canister whose template fails to render gets no argument file; the
    /// others are still rendered. Returns `true` if all rendered.
    pub fn render_templates(&mut self) -> bool {
        let mut all_ok = true;
        let templates: Vec<(String, PathBuf)> = self
            .input
            .canisters
            .iter()
            .filter_map(|(name, spec)| {
                spec.template_path
                    .as_ref()
                    .map(|path| (name.clone(), path.clone()))
            })
            .collect();

        for (canister, template) in templates {
            if !template.is_file() {
                warn!(canister = %canister, template = %template.display(), "template not found, skipping");
                continue;
            }
            match render_to_dir(&template, &self.variables, &self.args_dir) {
                Ok(output) => {
                    info!(canister = %canister, output = %output.display(), "rendered init arguments");
                }
                Err(err) => {
                    self.reporter
                        .warning(&format!("cannot generate arguments for {canister}: {err}"));
                    all_ok = false;
                }
            }
        }
        all_ok
    }

    /// Rendered argument file of `canister`, if one exists
    #[must_use]
    pub fn args_path(&self, canister: &str) -> Option<PathBuf> {
        self.input
            .template_path(canister)
            .filter(|template| template.is_file())
            .map(|template| output_path_for(template, &self.args_dir))
            .filter(|output| output.is_file())
    }

    /// Deploy `canister`, with its rendered arguments when there are any
    ///
    /// # Errors
    ///
    /// Returns `HarnessError` if the session is past its test stages or dfx
    /// fails; either way nothing is left deployed untracked
    pub fn deploy(&mut self, canister: &str) -> Result<CanisterRecord, HarnessError> {
        self.ensure_running("deploy")?;
        self.reporter.section(&format!("Deploy canister {canister}"));
        let args = self.args_path(canister);
        Ok(self.canisters.deploy(canister, args.as_deref())?)
    }

    /// Deploy `canister` and record the outcome as a test
    pub fn deploy_and_validate(&mut self, canister: &str) -> bool {
        let actual = match self.deploy(canister) {
            Ok(_) => SUCCESS,
            Err(err) => {
                self.reporter.warning(&err.to_string());
                FAILED
            }
        };
        self.validate(&format!("Deploy {canister}"), actual, SUCCESS)
    }

    #[must_use]
    pub fn canister(&self, name: &str) -> Option<&CanisterRecord> {
        self.canisters.get(name)
    }

    /// Create an identity for this run
    ///
    /// # Errors
    ///
    /// Returns `HarnessError` if the session is past its test stages or dfx
    /// fails
    pub fn create_identity(&mut self, name: &str) -> Result<IdentityRecord, HarnessError> {
        self.ensure_running("create an identity")?;
        self.reporter.section(&format!("Create identity '{name}'"));
        Ok(self.identities.create(name)?)
    }

    /// Remove an identity created in this run before the session ends
    ///
    /// # Errors
    ///
    /// Returns `HarnessError` if dfx fails
    pub fn remove_identity(&mut self, name: &str) -> Result<bool, HarnessError> {
        self.reporter.section(&format!("Remove identity '{name}'"));
        Ok(self.identities.remove(name)?)
    }

    /// Compare `actual` with `expected` and record the outcome
    pub fn validate(&mut self, label: &str, actual: &str, expected: &str) -> bool {
        let outcome = self.tally.record(label, actual, expected);
        self.reporter.outcome(&outcome);
        let passed = outcome.passed();
        self.outcomes.push(outcome);
        passed
    }

    /// Remove every canister and identity this session created
    pub fn cleanup(&mut self) -> CleanupSummary {
        let canisters = self.canisters.remove_all_canisters();
        for report in canisters.iter().filter(|report| !report.is_clean()) {
            self.reporter.line(&report.to_string());
        }
        if canisters.iter().any(|report| !report.is_clean()) {
            self.reporter
                .warning("remove_all_canisters encountered an error.");
        }

        let identities_removed = self.identities.remove_all();
        if !identities_removed {
            self.reporter
                .warning("remove_all_identities encountered an error.");
        }

        CleanupSummary {
            canisters,
            identities_removed,
        }
    }

    /// Run `script` through every stage
    ///
    /// Script failures become failed outcomes; cleanup runs regardless.
    pub fn run(mut self, script: &dyn TestScript) -> RunSummary {
        info!(script = script.name(), canister = %self.input.selected_canister, "starting run");

        // Init
        self.render_templates();

        self.advance_to(Stage::Deploy);
        if let Err(err) = script.run(&mut self) {
            warn!(script = script.name(), %err, "script failed");
            self.validate(&format!("Script {}", script.name()), &err.to_string(), SUCCESS);
        }

        self.advance_to(Stage::Validate);
        let tally = self.tally;
        self.reporter.summary(&tally);

        self.advance_to(Stage::Cleanup);
        let cleanup = self.cleanup();

        self.advance_to(Stage::Done);
        RunSummary {
            tally: self.tally,
            outcomes: self.outcomes,
            cleanup,
            log_path: self.reporter.log_path().map(Path::to_path_buf),
        }
    }
}
