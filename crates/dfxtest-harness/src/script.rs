//! Test scripts
//!
//! A script drives one session. `deploy` is built in; anything else is an
//! executable in the scripts directory.

use crate::error::HarnessError;
use crate::session::{FAILED, SUCCESS, Session};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// Name of the built-in script
pub const DEPLOY_SCRIPT: &str = "deploy";

/// Environment variable holding the deployed canister id for external scripts
pub const CANISTER_ID_ENV: &str = "DFXTEST_CANISTER_ID";
/// Environment variable holding the rendered arguments directory
pub const ARGS_DIR_ENV: &str = "DFXTEST_ARGS_DIR";

pub trait TestScript {
    fn name(&self) -> &str;

    /// Run against `session`, recording outcomes through it
    ///
    /// # Errors
    ///
    /// An error ends the script; the session records it as a failed test
    fn run(&self, session: &mut Session<'_>) -> Result<(), HarnessError>;
}

/// Deploy the selected canister and check that it worked
#[derive(Debug, Clone, Copy, Default)]
pub struct DeployScript;

impl TestScript for DeployScript {
    fn name(&self) -> &str {
        DEPLOY_SCRIPT
    }

    fn run(&self, session: &mut Session<'_>) -> Result<(), HarnessError> {
        let canister = session.selected_canister().to_string();
        session.deploy_and_validate(&canister);
        Ok(())
    }
}

/// An executable run as `<path> <script input json>`
///
/// The selected canister is deployed first. Exit status 0 is a pass and the
/// last non-empty stdout line becomes the test label.
#[derive(Debug, Clone)]
pub struct ExternalScript {
    name: String,
    path: PathBuf,
}

impl ExternalScript {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        Self { name, path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TestScript for ExternalScript {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, session: &mut Session<'_>) -> Result<(), HarnessError> {
        let canister = session.selected_canister().to_string();
        let record = session.deploy(&canister)?;
        let input = session.input().to_json()?;

        info!(script = %self.path.display(), "running external script");
        let output = Command::new(&self.path)
            .arg(&input)
            .env(CANISTER_ID_ENV, &record.canister_id)
            .env(ARGS_DIR_ENV, session.args_dir())
            .stdin(Stdio::null())
            .output()
            .map_err(|source| HarnessError::io(&self.path, source))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let lines: Vec<&str> = stdout.lines().filter(|l| !l.trim().is_empty()).collect();
        let (message, rest) = match lines.split_last() {
            Some((last, rest)) => (last.trim().to_string(), rest),
            None => (format!("Script {}", self.name), &[][..]),
        };
        for line in rest {
            session.reporter().line(line);
        }
        for line in stderr.lines() {
            debug!(script = %self.name, "{line}");
        }

        let actual = if output.status.success() { SUCCESS } else { FAILED };
        session.validate(&message, actual, SUCCESS);
        Ok(())
    }
}

/// Names of the scripts that can be run: `deploy` and every file in
/// `scripts_dir`, sorted
///
/// # Errors
///
/// Returns `HarnessError::Io` if `scripts_dir` exists but cannot be read
pub fn available_scripts(scripts_dir: &Path) -> Result<Vec<String>, HarnessError> {
    let mut names = vec![DEPLOY_SCRIPT.to_string()];
    let entries = match fs::read_dir(scripts_dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(names),
        Err(err) => return Err(HarnessError::io(scripts_dir, err)),
    };

    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| HarnessError::io(scripts_dir, err))?;
        if entry.path().is_file() {
            found.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    found.sort();
    names.extend(found.into_iter().filter(|name| name != DEPLOY_SCRIPT));
    Ok(names)
}

/// Resolve `name` to a script
///
/// # Errors
///
/// Returns `HarnessError::UnknownScript` if `name` is neither built in nor a
/// file in `scripts_dir`
pub fn load_script(name: &str, scripts_dir: &Path) -> Result<Box<dyn TestScript>, HarnessError> {
    if name == DEPLOY_SCRIPT {
        return Ok(Box::new(DeployScript));
    }
    // only plain names, never a path out of the scripts directory
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(HarnessError::UnknownScript(name.to_string()));
    }
    let path = scripts_dir.join(name);
    if !path.is_file() {
        return Err(HarnessError::UnknownScript(name.to_string()));
    }
    Ok(Box::new(ExternalScript::new(path)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Reporter;
    use dfxtest_exec::FakeDfx;
    use dfxtest_model::ScriptInput;
    use dfxtest_template::VariableContext;
    use tempfile::TempDir;

    #[test]
    fn test_available_scripts() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("transfer.sh"), "").unwrap();
        fs::write(dir.path().join("approve.sh"), "").unwrap();
        fs::create_dir(dir.path().join("fixtures")).unwrap();

        assert_eq!(
            available_scripts(dir.path()).unwrap(),
            vec!["deploy", "approve.sh", "transfer.sh"]
        );
        assert_eq!(
            available_scripts(&dir.path().join("missing")).unwrap(),
            vec!["deploy"]
        );
    }

    #[test]
    fn test_load_script() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("transfer.sh"), "").unwrap();

        assert_eq!(load_script("deploy", dir.path()).unwrap().name(), "deploy");
        assert_eq!(
            load_script("transfer.sh", dir.path()).unwrap().name(),
            "transfer.sh"
        );
        assert!(matches!(
            load_script("nope", dir.path()),
            Err(HarnessError::UnknownScript(name)) if name == "nope"
        ));
        assert!(matches!(
            load_script("../transfer.sh", dir.path()),
            Err(HarnessError::UnknownScript(_))
        ));
    }

    #[cfg(unix)]
    fn executable(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    fn run_external(body: &str) -> (crate::session::RunSummary, FakeDfx) {
        let dir = TempDir::new().unwrap();
        let path = executable(dir.path(), "check.sh", body);
        let dfx = FakeDfx::new();
        let mut input = ScriptInput {
            selected_canister: "backend".to_string(),
            ..ScriptInput::default()
        };
        input
            .canisters
            .insert("backend".to_string(), Default::default());

        let summary = {
            let session = Session::new(
                &dfx,
                input,
                dir.path().join("args"),
                VariableContext::new(),
                Reporter::quiet(),
            )
            .unwrap();
            session.run(&ExternalScript::new(path))
        };
        (summary, dfx)
    }

    #[cfg(unix)]
    #[test]
    fn test_external_script_passes() {
        let (summary, dfx) = run_external(
            "echo \"working on $DFXTEST_CANISTER_ID\"\n\
             echo \"$1\" | grep -q selected_canister || exit 3\n\
             echo 'balance check'",
        );

        assert!(summary.passed());
        assert_eq!(summary.outcomes.len(), 1);
        assert_eq!(summary.outcomes[0].label, "balance check");
        assert!(dfx.canisters().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_external_script_fails() {
        let (summary, _) = run_external("echo 'transfer rejected'\nexit 1");

        assert!(!summary.passed());
        assert_eq!(summary.outcomes[0].label, "transfer rejected");
        assert_eq!(summary.outcomes[0].actual, FAILED);
    }
}
