//! In-memory dfx used by tests
//!
//! Keeps identities and canisters in memory, records every call in dfx's own
//! command syntax and fails any call registered with [`FakeDfx::fail_on`].

use crate::dfx::{Dfx, DfxError};
use dfxtest_model::DEFAULT_IDENTITY;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanisterStatus {
    Created,
    Built,
    Running,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct FakeCanister {
    pub id: String,
    pub status: CanisterStatus,
    pub installed: bool,
    pub argument: Option<String>,
}

#[derive(Debug)]
struct State {
    identities: BTreeMap<String, String>,
    active: String,
    canisters: BTreeMap<String, FakeCanister>,
    next_id: u32,
    calls: Vec<String>,
    failing: HashSet<String>,
}

#[derive(Debug)]
pub struct FakeDfx {
    state: RefCell<State>,
}

impl FakeDfx {
    /// A dfx with only the `default` identity, which is active
    #[must_use]
    pub fn new() -> Self {
        let mut identities = BTreeMap::new();
        identities.insert(DEFAULT_IDENTITY.to_string(), principal_for(DEFAULT_IDENTITY));
        Self {
            state: RefCell::new(State {
                identities,
                active: DEFAULT_IDENTITY.to_string(),
                canisters: BTreeMap::new(),
                next_id: 1,
                calls: Vec::new(),
                failing: HashSet::new(),
            }),
        }
    }

    /// Make every later call rendered as `call` fail, e.g. `"build backend"`
    pub fn fail_on(&self, call: &str) {
        self.state.borrow_mut().failing.insert(call.to_string());
    }

    pub fn clear_failures(&self) {
        self.state.borrow_mut().failing.clear();
    }

    pub fn add_identity(&self, name: &str) {
        self.state
            .borrow_mut()
            .identities
            .insert(name.to_string(), principal_for(name));
    }

    pub fn set_active(&self, name: &str) {
        self.state.borrow_mut().active = name.to_string();
    }

    #[must_use]
    pub fn active(&self) -> String {
        self.state.borrow().active.clone()
    }

    #[must_use]
    pub fn identities(&self) -> Vec<String> {
        self.state.borrow().identities.keys().cloned().collect()
    }

    #[must_use]
    pub fn principal_of(&self, name: &str) -> Option<String> {
        self.state.borrow().identities.get(name).cloned()
    }

    /// Names of canisters that still exist
    #[must_use]
    pub fn canisters(&self) -> Vec<String> {
        self.state.borrow().canisters.keys().cloned().collect()
    }

    #[must_use]
    pub fn canister(&self, name: &str) -> Option<FakeCanister> {
        self.state.borrow().canisters.get(name).cloned()
    }

    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.state.borrow().calls.clone()
    }

    /// Record `call` and fail it when registered
    fn call(&self, call: String) -> Result<(), DfxError> {
        let mut state = self.state.borrow_mut();
        let fails = state.failing.contains(&call);
        state.calls.push(call.clone());
        if fails {
            return Err(failed(call, "injected failure"));
        }
        Ok(())
    }

    fn find_canister(state: &State, canister: &str) -> Option<String> {
        state
            .canisters
            .iter()
            .find(|(name, record)| *name == canister || record.id == canister)
            .map(|(name, _)| name.clone())
    }

    fn with_canister<T>(
        &self,
        call: String,
        canister: &str,
        apply: impl FnOnce(&mut State, &str) -> Result<T, &'static str>,
    ) -> Result<T, DfxError> {
        self.call(call.clone())?;
        let mut state = self.state.borrow_mut();
        let name = Self::find_canister(&state, canister)
            .ok_or_else(|| failed(call.clone(), "canister not found"))?;
        apply(&mut state, &name).map_err(|message| failed(call, message))
    }
}

impl Default for FakeDfx {
    fn default() -> Self {
        Self::new()
    }
}

fn principal_for(name: &str) -> String {
    format!("{name}-principal")
}

fn failed(command: String, message: &str) -> DfxError {
    DfxError::Failed {
        command,
        code: Some(255),
        output: message.to_string(),
    }
}

impl Dfx for FakeDfx {
    fn whoami(&self) -> Result<String, DfxError> {
        self.call("identity whoami".to_string())?;
        Ok(self.active())
    }

    fn use_identity(&self, name: &str) -> Result<(), DfxError> {
        let call = format!("identity use {name}");
        self.call(call.clone())?;
        let mut state = self.state.borrow_mut();
        if !state.identities.contains_key(name) {
            return Err(failed(call, "identity does not exist"));
        }
        state.active = name.to_string();
        Ok(())
    }

    fn new_identity(&self, name: &str) -> Result<(), DfxError> {
        let call = format!("identity new {name}");
        self.call(call.clone())?;
        let mut state = self.state.borrow_mut();
        if state.identities.contains_key(name) {
            return Err(failed(call, "identity already exists"));
        }
        state.identities.insert(name.to_string(), principal_for(name));
        Ok(())
    }

    fn remove_identity(&self, name: &str) -> Result<(), DfxError> {
        let call = format!("identity remove {name}");
        self.call(call.clone())?;
        let mut state = self.state.borrow_mut();
        if name == DEFAULT_IDENTITY || state.active == name {
            return Err(failed(call, "cannot remove the default or active identity"));
        }
        if state.identities.remove(name).is_none() {
            return Err(failed(call, "identity does not exist"));
        }
        Ok(())
    }

    fn list_identities(&self) -> Result<Vec<String>, DfxError> {
        self.call("identity list".to_string())?;
        Ok(self.identities())
    }

    fn principal(&self) -> Result<String, DfxError> {
        self.call("identity get-principal".to_string())?;
        let state = self.state.borrow();
        Ok(state
            .identities
            .get(&state.active)
            .cloned()
            .unwrap_or_default())
    }

    fn create_canister(&self, name: &str) -> Result<(), DfxError> {
        self.call(format!("canister create {name}"))?;
        let mut state = self.state.borrow_mut();
        if !state.canisters.contains_key(name) {
            let id = format!("fake{:04}-cai", state.next_id);
            state.next_id += 1;
            state.canisters.insert(
                name.to_string(),
                FakeCanister {
                    id,
                    status: CanisterStatus::Created,
                    installed: false,
                    argument: None,
                },
            );
        }
        Ok(())
    }

    fn build_canister(&self, name: &str) -> Result<(), DfxError> {
        self.with_canister(format!("build {name}"), name, |state, name| {
            if let Some(canister) = state.canisters.get_mut(name) {
                canister.status = CanisterStatus::Built;
            }
            Ok(())
        })
    }

    fn install_canister(&self, name: &str, argument: Option<&str>) -> Result<(), DfxError> {
        self.with_canister(format!("canister install {name}"), name, |state, name| {
            let canister = state.canisters.get_mut(name).ok_or("canister not found")?;
            if canister.status == CanisterStatus::Created {
                return Err("canister has not been built");
            }
            canister.installed = true;
            canister.status = CanisterStatus::Running;
            canister.argument = argument.map(str::to_string);
            Ok(())
        })
    }

    fn canister_id(&self, name: &str) -> Result<String, DfxError> {
        self.with_canister(format!("canister id {name}"), name, |state, name| {
            state
                .canisters
                .get(name)
                .map(|canister| canister.id.clone())
                .ok_or("canister not found")
        })
    }

    fn stop_canister(&self, canister: &str) -> Result<(), DfxError> {
        self.with_canister(format!("canister stop {canister}"), canister, |state, name| {
            let canister = state.canisters.get_mut(name).ok_or("canister not found")?;
            canister.status = CanisterStatus::Stopped;
            Ok(())
        })
    }

    fn uninstall_code(&self, canister: &str) -> Result<(), DfxError> {
        self.with_canister(
            format!("canister uninstall-code {canister}"),
            canister,
            |state, name| {
                let canister = state.canisters.get_mut(name).ok_or("canister not found")?;
                canister.installed = false;
                canister.argument = None;
                Ok(())
            },
        )
    }

    fn delete_canister(&self, canister: &str) -> Result<(), DfxError> {
        self.with_canister(format!("canister delete {canister}"), canister, |state, name| {
            let status = state.canisters.get(name).map(|canister| canister.status);
            if matches!(status, Some(CanisterStatus::Running)) {
                return Err("canister must be stopped before it is deleted");
            }
            state.canisters.remove(name);
            Ok(())
        })
    }
}
