//! Best-effort canister teardown

use crate::deploy::CanisterManager;
use crate::dfx::{Dfx, DfxError};
use crate::identity::IdentityScope;
use dfxtest_model::DEFAULT_IDENTITY;
use std::fmt;
use std::mem;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupStage {
    SwitchIdentity,
    Stop,
    Uninstall,
    Delete,
}

impl fmt::Display for CleanupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SwitchIdentity => "identity use default",
            Self::Stop => "canister stop",
            Self::Uninstall => "canister uninstall-code",
            Self::Delete => "canister delete",
        })
    }
}

/// What went wrong while tearing down one canister
#[derive(Debug)]
pub struct CleanupReport {
    pub canister: String,
    pub failures: Vec<(CleanupStage, DfxError)>,
}

impl CleanupReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for CleanupReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_clean() {
            return write!(f, "{} removed", self.canister);
        }
        write!(f, "cleanup of {} incomplete:", self.canister)?;
        for (stage, err) in &self.failures {
            write!(f, " [{stage}: {err}]")?;
        }
        Ok(())
    }
}

/// Stop, uninstall and delete `canister` under the default identity
///
/// Every stage is attempted even when an earlier one fails.
pub fn cleanup<D: Dfx + ?Sized>(dfx: &D, canister: &str) -> CleanupReport {
    let mut failures = Vec::new();
    info!(canister, "cleaning up canister");

    let scope = match IdentityScope::enter(dfx, DEFAULT_IDENTITY) {
        Ok(scope) => Some(scope),
        Err(err) => {
            warn!(canister, %err, "cleaning up without switching to the default identity");
            failures.push((CleanupStage::SwitchIdentity, err));
            None
        }
    };

    for stage in [CleanupStage::Stop, CleanupStage::Uninstall, CleanupStage::Delete] {
        let result = match stage {
            CleanupStage::Stop => dfx.stop_canister(canister),
            CleanupStage::Uninstall => dfx.uninstall_code(canister),
            CleanupStage::Delete => dfx.delete_canister(canister),
            CleanupStage::SwitchIdentity => continue,
        };
        if let Err(err) = result {
            warn!(canister, %stage, %err, "cleanup step failed");
            failures.push((stage, err));
        }
    }

    if let Some(scope) = scope {
        if let Err(err) = scope.restore() {
            warn!(%err, "cannot switch back to the caller identity after cleanup");
        }
    }

    CleanupReport {
        canister: canister.to_string(),
        failures,
    }
}

impl<D: Dfx + ?Sized> CanisterManager<'_, D> {
    /// Clean up every deployed canister and forget them
    ///
    /// Returns one report per canister, in name order.
    pub fn remove_all_canisters(&mut self) -> Vec<CleanupReport> {
        mem::take(&mut self.deployed)
            .into_values()
            .map(|record| cleanup(self.dfx, &record.canister_id))
            .collect()
    }
}
