use crate::session::Stage;
use dfxtest_exec::{DeployError, DfxError};
use dfxtest_template::TemplateError;
use std::io;
use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum HarnessError {
    #[error("invalid configuration: {0}")]
    Config(#[from] config::ConfigError),

    #[error("invalid script input: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unknown test script `{0}`")]
    UnknownScript(String),

    #[error("unknown canister `{0}`")]
    UnknownCanister(String),

    #[error("no selected canister specified")]
    NoSelectedCanister,

    #[error("cannot {action} in the {stage} stage")]
    Stage { action: &'static str, stage: Stage },

    #[error("script {script} failed: {message}")]
    Script { script: String, message: String },

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Dfx(#[from] DfxError),

    #[error(transparent)]
    Deploy(#[from] DeployError),
}

impl HarnessError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
