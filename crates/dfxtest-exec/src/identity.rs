//! Identity switching and bookkeeping

use crate::dfx::{Dfx, DfxError};
use dfxtest_model::{DEFAULT_IDENTITY, IdentityRecord};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// The active dfx identity switched for the lifetime of a value
///
/// Entering remembers which identity was active and switches to the requested
/// one. The previous identity is switched back by [`IdentityScope::restore`]
/// or, failing that, when the scope is dropped.
pub struct IdentityScope<'a, D: Dfx + ?Sized> {
    dfx: &'a D,
    active: String,
    previous: Option<String>,
    done: bool,
}

impl<'a, D: Dfx + ?Sized> IdentityScope<'a, D> {
    /// Switch to `name`
    ///
    /// # Errors
    ///
    /// Returns `DfxError` if the switch fails; the previous identity has been
    /// switched back by then
    pub fn enter(dfx: &'a D, name: &str) -> Result<Self, DfxError> {
        let previous = match dfx.whoami() {
            Ok(previous) => Some(previous),
            Err(err) => {
                warn!(%err, "cannot tell the active identity, it will not be restored");
                None
            }
        };

        if previous.as_deref() != Some(name) {
            debug!(identity = name, ?previous, "switching identity");
            if let Err(err) = dfx.use_identity(name) {
                if let Some(previous) = &previous {
                    if let Err(revert) = dfx.use_identity(previous) {
                        warn!(identity = %previous, err = %revert, "cannot switch identity back");
                    }
                }
                return Err(err);
            }
        }

        Ok(Self {
            dfx,
            active: name.to_string(),
            previous,
            done: false,
        })
    }

    /// Identity active inside the scope
    #[must_use]
    pub fn active(&self) -> &str {
        &self.active
    }

    /// Identity that was active before the scope was entered
    #[must_use]
    pub fn previous(&self) -> Option<&str> {
        self.previous.as_deref()
    }

    /// Switch back to the previous identity
    ///
    /// # Errors
    ///
    /// Returns `DfxError` if dfx refuses the switch
    pub fn restore(mut self) -> Result<(), DfxError> {
        self.done = true;
        self.switch_back()
    }

    /// Leave the scoped identity active, e.g. because the previous one no
    /// longer exists
    pub fn keep(mut self) {
        self.done = true;
    }

    fn switch_back(&self) -> Result<(), DfxError> {
        match &self.previous {
            Some(previous) if *previous != self.active => {
                debug!(identity = %previous, "reverting identity");
                self.dfx.use_identity(previous)
            }
            _ => Ok(()),
        }
    }
}

impl<D: Dfx + ?Sized> Drop for IdentityScope<'_, D> {
    fn drop(&mut self) {
        if !self.done {
            if let Err(err) = self.switch_back() {
                warn!(%err, "cannot switch identity back");
            }
        }
    }
}

/// Creates identities for a run and removes them again
pub struct IdentityManager<'a, D: Dfx + ?Sized> {
    dfx: &'a D,
    created: BTreeMap<String, IdentityRecord>,
}

impl<'a, D: Dfx + ?Sized> IdentityManager<'a, D> {
    #[must_use]
    pub fn new(dfx: &'a D) -> Self {
        Self {
            dfx,
            created: BTreeMap::new(),
        }
    }

    /// Create `name`, record its principal and switch back to the caller's identity
    ///
    /// # Errors
    ///
    /// Returns `DfxError` if any dfx step fails. An identity that was created
    /// before the failure is removed again.
    pub fn create(&mut self, name: &str) -> Result<IdentityRecord, DfxError> {
        info!(identity = name, "creating identity");
        self.dfx.new_identity(name)?;

        let principal = IdentityScope::enter(self.dfx, name).and_then(|scope| {
            let principal = self.dfx.principal()?;
            scope.restore()?;
            Ok(principal)
        });

        match principal {
            Ok(principal) => {
                let record = IdentityRecord {
                    name: name.to_string(),
                    principal,
                };
                self.created.insert(name.to_string(), record.clone());
                Ok(record)
            }
            Err(err) => {
                if let Err(remove_err) = self.dfx.remove_identity(name) {
                    warn!(identity = name, err = %remove_err, "cannot remove half-created identity");
                }
                Err(err)
            }
        }
    }

    /// Remove a tracked identity from under the default identity
    ///
    /// Returns `false` when `name` was not created by this manager.
    ///
    /// # Errors
    ///
    /// Returns `DfxError` if switching identities or the removal fails
    pub fn remove(&mut self, name: &str) -> Result<bool, DfxError> {
        let scope = IdentityScope::enter(self.dfx, DEFAULT_IDENTITY)?;

        if !self.created.contains_key(name) {
            debug!(identity = name, "identity not created in this run, leaving it");
            scope.restore()?;
            return Ok(false);
        }

        info!(identity = name, "removing identity");
        self.dfx.remove_identity(name)?;
        self.created.remove(name);

        if scope.previous() == Some(name) {
            scope.keep();
            Ok(true)
        } else {
            scope.restore().map(|()| true)
        }
    }

    /// Remove every identity created in this run except `default`
    ///
    /// Returns `true` if every removal succeeded.
    pub fn remove_all(&mut self) -> bool {
        let names: Vec<String> = self.created.keys().cloned().collect();
        let mut all_ok = true;
        for name in names.iter().filter(|name| *name != DEFAULT_IDENTITY) {
            if let Err(err) = self.remove(name) {
                warn!(identity = %name, %err, "failed to remove identity");
                all_ok = false;
            }
        }
        all_ok
    }

    /// Identities dfx knows about
    ///
    /// # Errors
    ///
    /// Returns `DfxError` if `dfx identity list` fails
    pub fn list(&self) -> Result<Vec<String>, DfxError> {
        self.dfx.list_identities()
    }

    #[must_use]
    pub fn principal(&self, name: &str) -> Option<&str> {
        self.created.get(name).map(|record| record.principal.as_str())
    }

    pub fn records(&self) -> impl Iterator<Item = &IdentityRecord> {
        self.created.values()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.created.is_empty()
    }
}
