//! Canister deployment

use crate::cleanup::cleanup;
use crate::dfx::{Dfx, DfxError};
use crate::identity::IdentityScope;
use dfxtest_model::{CanisterRecord, DEFAULT_IDENTITY};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Step of a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployStage {
    Create,
    Build,
    Install,
    Id,
}

impl fmt::Display for DeployStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "canister create",
            Self::Build => "build",
            Self::Install => "canister install",
            Self::Id => "canister id",
        })
    }
}

#[derive(thiserror::Error, Debug)]
pub enum DeployError {
    #[error("cannot switch to the default identity to deploy {canister}: {source}")]
    Identity {
        canister: String,
        #[source]
        source: DfxError,
    },

    #[error("cannot read install arguments {} for {canister}: {source}", .path.display())]
    Arguments {
        canister: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("deploying {canister} failed at `{stage}`: {source}")]
    Step {
        canister: String,
        stage: DeployStage,
        #[source]
        source: DfxError,
    },
}

/// Canisters deployed during a run
pub struct CanisterManager<'a, D: Dfx + ?Sized> {
    pub(crate) dfx: &'a D,
    pub(crate) deployed: BTreeMap<String, CanisterRecord>,
}

impl<'a, D: Dfx + ?Sized> CanisterManager<'a, D> {
    #[must_use]
    pub fn new(dfx: &'a D) -> Self {
        Self {
            dfx,
            deployed: BTreeMap::new(),
        }
    }

    /// Create, build and install `name` under the default identity
    ///
    /// `args_path` names a rendered Candid argument file passed to install.
    /// When a step after creation fails the half-deployed canister is
    /// cleaned up before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns `DeployError` naming the failing step
    pub fn deploy(
        &mut self,
        name: &str,
        args_path: Option<&Path>,
    ) -> Result<CanisterRecord, DeployError> {
        let argument = args_path
            .map(|path| {
                fs::read_to_string(path)
                    .map(|text| text.trim_end().to_string())
                    .map_err(|source| DeployError::Arguments {
                        canister: name.to_string(),
                        path: path.to_path_buf(),
                        source,
                    })
            })
            .transpose()?;

        let scope =
            IdentityScope::enter(self.dfx, DEFAULT_IDENTITY).map_err(|source| {
                DeployError::Identity {
                    canister: name.to_string(),
                    source,
                }
            })?;

        info!(canister = name, with_arguments = argument.is_some(), "deploying canister");
        let step = |stage: DeployStage| {
            move |source: DfxError| DeployError::Step {
                canister: name.to_string(),
                stage,
                source,
            }
        };

        self.dfx
            .create_canister(name)
            .map_err(step(DeployStage::Create))?;

        let canister_id = self
            .dfx
            .build_canister(name)
            .map_err(step(DeployStage::Build))
            .and_then(|()| {
                self.dfx
                    .install_canister(name, argument.as_deref())
                    .map_err(step(DeployStage::Install))
            })
            .and_then(|()| self.dfx.canister_id(name).map_err(step(DeployStage::Id)));

        let canister_id = match canister_id {
            Ok(canister_id) => canister_id,
            Err(err) => {
                warn!(canister = name, %err, "deployment failed, removing the canister");
                let report = cleanup(self.dfx, name);
                if !report.is_clean() {
                    // keep tracking it so the final cleanup retries and reports it
                    warn!(canister = name, "{report}");
                    self.deployed.insert(
                        name.to_string(),
                        CanisterRecord {
                            name: name.to_string(),
                            canister_id: name.to_string(),
                        },
                    );
                }
                return Err(err);
            }
        };

        let record = CanisterRecord {
            name: name.to_string(),
            canister_id,
        };
        self.deployed.insert(name.to_string(), record.clone());
        info!(canister = name, id = %record.canister_id, "canister deployed");

        if let Err(err) = scope.restore() {
            warn!(%err, "cannot switch back to the caller identity after deploying");
        }
        Ok(record)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CanisterRecord> {
        self.deployed.get(name)
    }

    pub fn records(&self) -> impl Iterator<Item = &CanisterRecord> {
        self.deployed.values()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deployed.is_empty()
    }
}
