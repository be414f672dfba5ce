//! Harness configuration
//!
//! Layered with the `config` crate: defaults, then `dfxtest.toml` in the
//! working directory, then an explicit file, then `DFXTEST_*` variables
//! (`DFXTEST_DFX__NETWORK=ic` sets `dfx.network`).

use dfxtest_exec::DfxCli;
use dfxtest_model::{CanisterSpec, ScriptInput};
use dfxtest_template::VariableContext;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Looked up in the working directory when no file is given explicitly
pub const DEFAULT_CONFIG_FILE: &str = "dfxtest.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DfxConfig {
    pub program: PathBuf,
    pub network: Option<String>,
    pub project_dir: Option<PathBuf>,
}

impl Default for DfxConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("dfx"),
            network: None,
            project_dir: None,
        }
    }
}

impl DfxConfig {
    #[must_use]
    pub fn client(&self) -> DfxCli {
        let mut dfx = DfxCli::new(&self.program);
        if let Some(network) = &self.network {
            dfx = dfx.with_network(network);
        }
        if let Some(dir) = &self.project_dir {
            dfx = dfx.with_project_dir(dir);
        }
        dfx
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Rendered `.candid` argument files
    pub args_dir: PathBuf,
    /// One log file per run
    pub logs_dir: PathBuf,
    /// External test scripts
    pub scripts_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            args_dir: PathBuf::from("args"),
            logs_dir: PathBuf::from("logs"),
            scripts_dir: PathBuf::from("tests"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub max_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            max_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub dfx: DfxConfig,
    pub paths: PathsConfig,
    pub canisters: BTreeMap<String, CanisterSpec>,
    /// Template variables known before the run starts
    pub variables: BTreeMap<String, String>,
    pub logging: LoggingConfig,
}

impl HarnessConfig {
    /// Load the layered configuration
    ///
    /// # Errors
    ///
    /// Returns `config::ConfigError` if a source cannot be read or the
    /// merged result does not match the expected shape
    pub fn load(explicit_file: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut s = config::Config::builder();

        s = s.add_source(
            config::File::new(DEFAULT_CONFIG_FILE, config::FileFormat::Toml).required(false),
        );

        if let Some(explicit) = explicit_file {
            s = s.add_source(
                config::File::new(&explicit.to_string_lossy(), config::FileFormat::Toml)
                    .required(true),
            );
        }

        s = s.add_source(
            config::Environment::with_prefix("DFXTEST")
                .prefix_separator("_")
                .separator("__"),
        );

        s.build()?.try_deserialize()
    }

    /// Parse configuration from TOML text, without files or environment
    ///
    /// # Errors
    ///
    /// Returns `config::ConfigError` if the text is not valid configuration
    pub fn from_toml(text: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(text, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    /// Configured variables as the parent layer of a run's variables
    #[must_use]
    pub fn variable_context(&self) -> VariableContext {
        self.variables
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect()
    }

    /// Script input for the configured canisters with `selected` chosen
    #[must_use]
    pub fn script_input(&self, selected: &str) -> ScriptInput {
        ScriptInput {
            canisters: self.canisters.clone(),
            selected_canister: selected.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::from_toml("").unwrap();

        assert_eq!(config.dfx.program, PathBuf::from("dfx"));
        assert!(config.dfx.network.is_none());
        assert_eq!(config.paths.args_dir, PathBuf::from("args"));
        assert_eq!(config.paths.logs_dir, PathBuf::from("logs"));
        assert_eq!(config.paths.scripts_dir, PathBuf::from("tests"));
        assert!(config.canisters.is_empty());
        assert_eq!(config.logging.max_level, "info");
    }

    #[test]
    fn test_full_file() {
        let config = HarnessConfig::from_toml(
            r#"
            [dfx]
            program = "/opt/dfx/bin/dfx"
            network = "local"

            [paths]
            args_dir = "build/args"

            [canisters.backend]
            template_path = "templates/backend.template"

            [canisters.frontend]

            [variables]
            owner_principal = "aaaaa-aa"
            "#,
        )
        .unwrap();

        assert_eq!(config.dfx.program, PathBuf::from("/opt/dfx/bin/dfx"));
        assert_eq!(config.dfx.network.as_deref(), Some("local"));
        assert_eq!(config.paths.args_dir, PathBuf::from("build/args"));
        assert_eq!(config.paths.logs_dir, PathBuf::from("logs"));

        let input = config.script_input("backend");
        assert_eq!(input.selected_canister, "backend");
        assert_eq!(
            input.template_path("backend"),
            Some(&PathBuf::from("templates/backend.template"))
        );
        assert_eq!(input.template_path("frontend"), None);

        let vars = config.variable_context();
        assert_eq!(vars.get("owner_principal"), Some("aaaaa-aa"));
    }

    #[test]
    fn test_invalid_shape() {
        assert!(HarnessConfig::from_toml("paths = 3").is_err());
    }

    #[test]
    fn test_client_uses_program() {
        let mut config = HarnessConfig::default();
        config.dfx.program = PathBuf::from("/usr/local/bin/dfx");

        assert_eq!(config.dfx.client().program(), Path::new("/usr/local/bin/dfx"));
    }
}
