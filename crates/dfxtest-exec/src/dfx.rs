//! The `Dfx` capability and its process-backed implementation

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

#[derive(thiserror::Error, Debug)]
pub enum DfxError {
    #[error("cannot run {}: {source}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` failed with return code {}: {output}", .code.map_or_else(|| "none".to_string(), |code| code.to_string()))]
    Failed {
        command: String,
        code: Option<i32>,
        output: String,
    },

    #[error("`{command}` printed nothing")]
    EmptyOutput { command: String },
}

/// Every dfx operation the harness needs
///
/// Identity operations act on dfx's single active identity; callers switch it
/// through [`crate::IdentityScope`] only.
pub trait Dfx {
    /// `dfx identity whoami`
    fn whoami(&self) -> Result<String, DfxError>;
    /// `dfx identity use <name>`
    fn use_identity(&self, name: &str) -> Result<(), DfxError>;
    /// `dfx identity new <name>`
    fn new_identity(&self, name: &str) -> Result<(), DfxError>;
    /// `dfx identity remove <name>`
    fn remove_identity(&self, name: &str) -> Result<(), DfxError>;
    /// `dfx identity list`
    fn list_identities(&self) -> Result<Vec<String>, DfxError>;
    /// `dfx identity get-principal` for the active identity
    fn principal(&self) -> Result<String, DfxError>;

    fn create_canister(&self, name: &str) -> Result<(), DfxError>;
    fn build_canister(&self, name: &str) -> Result<(), DfxError>;
    /// Install code, passing `argument` as the Candid init argument when given
    fn install_canister(&self, name: &str, argument: Option<&str>) -> Result<(), DfxError>;
    fn canister_id(&self, name: &str) -> Result<String, DfxError>;

    fn stop_canister(&self, canister: &str) -> Result<(), DfxError>;
    fn uninstall_code(&self, canister: &str) -> Result<(), DfxError>;
    fn delete_canister(&self, canister: &str) -> Result<(), DfxError>;
}

/// Runs the real `dfx` executable
#[derive(Debug, Clone)]
pub struct DfxCli {
    program: PathBuf,
    network: Option<String>,
    project_dir: Option<PathBuf>,
}

impl DfxCli {
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            network: None,
            project_dir: None,
        }
    }

    /// Pass `--network <network>` to canister and build commands
    #[must_use]
    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    /// Run dfx inside `dir` (the directory holding `dfx.json`)
    #[must_use]
    pub fn with_project_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.project_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    fn command_line(&self, args: &[&str]) -> String {
        let mut line = self.program.display().to_string();
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    /// Run dfx with `args` and return its stdout
    fn run(&self, args: &[&str]) -> Result<String, DfxError> {
        let command = self.command_line(args);
        debug!(%command, "running");

        let mut cmd = Command::new(&self.program);
        cmd.args(args).stdin(Stdio::null());
        if let Some(dir) = &self.project_dir {
            cmd.current_dir(dir);
        }

        let output = cmd.output().map_err(|source| DfxError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        for line in stdout.lines().chain(stderr.lines()) {
            debug!(target: "dfxtest_exec::dfx::output", "{line}");
        }

        if output.status.success() {
            Ok(stdout)
        } else {
            let combined = format!("{}{}", stdout, stderr);
            Err(DfxError::Failed {
                command,
                code: output.status.code(),
                output: combined.trim().to_string(),
            })
        }
    }

    /// Like [`DfxCli::run`] with `--network` appended when configured
    fn run_on_network(&self, args: &[&str]) -> Result<String, DfxError> {
        match &self.network {
            Some(network) => {
                let mut args = args.to_vec();
                args.extend(["--network", network.as_str()]);
                self.run(&args)
            }
            None => self.run(args),
        }
    }

    /// First non-empty stdout line of a command
    fn read_line(&self, args: &[&str], on_network: bool) -> Result<String, DfxError> {
        let stdout = if on_network {
            self.run_on_network(args)?
        } else {
            self.run(args)?
        };
        stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .ok_or_else(|| DfxError::EmptyOutput {
                command: self.command_line(args),
            })
    }
}

impl Default for DfxCli {
    fn default() -> Self {
        Self::new("dfx")
    }
}

/// Names printed by `dfx identity list`, without the active-identity marker
#[must_use]
pub fn parse_identity_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(|line| line.trim().trim_end_matches('*').trim_end())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

impl Dfx for DfxCli {
    fn whoami(&self) -> Result<String, DfxError> {
        self.read_line(&["identity", "whoami"], false)
    }

    fn use_identity(&self, name: &str) -> Result<(), DfxError> {
        self.run(&["identity", "use", name]).map(drop)
    }

    fn new_identity(&self, name: &str) -> Result<(), DfxError> {
        // stdin is closed, so a passphrase prompt would fail the command
        self.run(&["identity", "new", name, "--storage-mode", "plaintext"])
            .map(drop)
    }

    fn remove_identity(&self, name: &str) -> Result<(), DfxError> {
        self.run(&["identity", "remove", name]).map(drop)
    }

    fn list_identities(&self) -> Result<Vec<String>, DfxError> {
        self.run(&["identity", "list"])
            .map(|stdout| parse_identity_list(&stdout))
    }

    fn principal(&self) -> Result<String, DfxError> {
        self.read_line(&["identity", "get-principal"], false)
    }

    fn create_canister(&self, name: &str) -> Result<(), DfxError> {
        self.run_on_network(&["canister", "create", name]).map(drop)
    }

    fn build_canister(&self, name: &str) -> Result<(), DfxError> {
        self.run_on_network(&["build", name]).map(drop)
    }

    fn install_canister(&self, name: &str, argument: Option<&str>) -> Result<(), DfxError> {
        let result = match argument {
            Some(argument) => {
                self.run_on_network(&["canister", "install", name, "--argument", argument])
            }
            None => self.run_on_network(&["canister", "install", name]),
        };
        result.map(drop)
    }

    fn canister_id(&self, name: &str) -> Result<String, DfxError> {
        self.read_line(&["canister", "id", name], true)
    }

    fn stop_canister(&self, canister: &str) -> Result<(), DfxError> {
        self.run_on_network(&["canister", "stop", canister]).map(drop)
    }

    fn uninstall_code(&self, canister: &str) -> Result<(), DfxError> {
        self.run_on_network(&["canister", "uninstall-code", canister])
            .map(drop)
    }

    fn delete_canister(&self, canister: &str) -> Result<(), DfxError> {
        self.run_on_network(&["canister", "delete", canister])
            .map(drop)
    }
}
