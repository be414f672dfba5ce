//! dfx process layer
//!
//! Everything that touches the external `dfx` tool goes through the [`Dfx`]
//! trait: identity switching, canister deployment and teardown.

pub mod cleanup;
pub mod deploy;
pub mod dfx;
pub mod identity;

#[cfg(any(test, feature = "testing"))]
pub mod fake;

pub use cleanup::{CleanupReport, CleanupStage, cleanup};
pub use deploy::{CanisterManager, DeployError, DeployStage};
pub use dfx::{Dfx, DfxCli, DfxError};
pub use identity::{IdentityManager, IdentityScope};

#[cfg(any(test, feature = "testing"))]
pub use fake::FakeDfx;
