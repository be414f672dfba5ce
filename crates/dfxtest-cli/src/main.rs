//! dfxtest CLI
//!
//! Runs one test script against one canister and exits non-zero when any
//! validation failed.

use anyhow::{Context, bail};
use clap::{Arg, ArgAction, ArgMatches, Command};
use dfxtest_harness::{
    HarnessConfig, Reporter, RunLog, Session, available_scripts, check_input, load_script,
    select_canister,
};
use dfxtest_model::ScriptInput;
use inquire::InquireError;
use std::io::{self, Write};
use std::path::Path;
use std::process;
use std::str::FromStr;
use termcolor::ColorChoice;
use tracing::{Level, info};
use tracing_subscriber::filter::Targets;
use tracing_subscriber::prelude::*;

fn build_cli() -> Command {
    Command::new("dfxtest")
        .version("0.1.0")
        .about("Deploy, validate and tear down canisters through dfx")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file, layered over dfxtest.toml")
                .num_args(1),
        )
        .arg(
            Arg::new("script")
                .short('s')
                .long("script")
                .value_name("NAME")
                .help("Test script to run")
                .num_args(1),
        )
        .arg(
            Arg::new("canister")
                .short('n')
                .long("canister")
                .value_name("NAME")
                .help("Canister to test")
                .num_args(1),
        )
        .arg(
            Arg::new("input")
                .long("input")
                .value_name("JSON")
                .help("Script input JSON, replacing the configured canisters")
                .num_args(1)
                .conflicts_with("canister"),
        )
        .arg(
            Arg::new("list")
                .short('l')
                .long("list")
                .help("List scripts and canisters, then exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Log dfx commands and their output")
                .action(ArgAction::SetTrue),
        )
}

fn main() {
    let matches = build_cli().get_matches();

    match run(&matches) {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            process::exit(1);
        }
    }
}

fn run(matches: &ArgMatches) -> anyhow::Result<i32> {
    let config_file = matches.get_one::<String>("config").map(Path::new);
    let config = HarnessConfig::load(config_file).context("loading configuration")?;

    let level = if matches.get_flag("verbose") {
        Level::DEBUG
    } else {
        parse_level(&config.logging.max_level)?
    };
    setup_tracing(level)?;

    let scripts = available_scripts(&config.paths.scripts_dir)?;
    if matches.get_flag("list") {
        list(&mut io::stdout().lock(), &scripts, &config)?;
        return Ok(0);
    }

    let input = if let Some(json) = matches.get_one::<String>("input") {
        let input = ScriptInput::from_json(json)?;
        check_input(&input)?;
        input
    } else {
        let canister = match matches.get_one::<String>("canister") {
            Some(name) => name.clone(),
            None => {
                let names: Vec<String> = config.canisters.keys().cloned().collect();
                prompt_choice("canister", names)?
            }
        };
        select_canister(&config, &canister)?
    };

    let script_name = match matches.get_one::<String>("script") {
        Some(name) => name.clone(),
        None => prompt_choice("script", scripts)?,
    };
    let script = load_script(&script_name, &config.paths.scripts_dir)?;

    let log = RunLog::create(&config.paths.logs_dir, script.name())
        .with_context(|| format!("creating run log in {}", config.paths.logs_dir.display()))?;
    let reporter = Reporter::stdout(ColorChoice::Auto).with_log(log);

    let dfx = config.dfx.client();
    let session = Session::new(
        &dfx,
        input,
        &config.paths.args_dir,
        config.variable_context(),
        reporter,
    )?;
    let summary = session.run(script.as_ref());

    if let Some(path) = &summary.log_path {
        println!("Log written to {}", path.display());
    }
    info!(
        passed = summary.tally.success,
        failed = summary.tally.failed,
        clean = summary.cleanup.is_clean(),
        "run finished"
    );

    Ok(if summary.passed() { 0 } else { 1 })
}

fn parse_level(text: &str) -> anyhow::Result<Level> {
    Level::from_str(text.trim()).map_err(|_| anyhow::anyhow!("invalid log level `{text}`"))
}

fn setup_tracing(level: Level) -> anyhow::Result<()> {
    let filter = Targets::new()
        .with_target("dfxtest", level)
        .with_target("dfxtest_cli", level)
        .with_target("dfxtest_exec", level)
        .with_target("dfxtest_harness", level)
        .with_target("dfxtest_template", level);

    tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(io::stderr)
        .finish()
        .with(filter)
        .try_init()?;

    Ok(())
}

fn list(out: &mut impl Write, scripts: &[String], config: &HarnessConfig) -> io::Result<()> {
    writeln!(out, "Scripts:")?;
    for script in scripts {
        writeln!(out, "  {script}")?;
    }
    writeln!(out, "Canisters:")?;
    for (name, spec) in &config.canisters {
        match &spec.template_path {
            Some(template) => writeln!(out, "  {name} ({})", template.display())?,
            None => writeln!(out, "  {name}")?,
        }
    }
    Ok(())
}

/// Ask for one of `options`
fn prompt_choice(what: &str, options: Vec<String>) -> anyhow::Result<String> {
    if options.is_empty() {
        bail!("no {what} to choose from");
    }
    let message = format!("which {what} would you like to run?");
    selection(what, inquire::Select::new(&message, options).prompt())
}

/// A prompt that could not be answered means nothing was selected
fn selection(what: &str, answer: Result<String, InquireError>) -> anyhow::Result<String> {
    match answer {
        Ok(choice) => Ok(choice),
        Err(
            InquireError::NotTTY
            | InquireError::OperationCanceled
            | InquireError::OperationInterrupted,
        ) => bail!("no {what} selected"),
        Err(err) => Err(err).context("reading selection"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_selection() {
        assert_eq!(
            selection("canister", Ok("ledger".to_string())).unwrap(),
            "ledger"
        );
    }

    #[test]
    fn test_unanswered_prompt_selects_nothing() {
        for err in [
            InquireError::NotTTY,
            InquireError::OperationCanceled,
            InquireError::OperationInterrupted,
        ] {
            let message = selection("script", Err(err)).unwrap_err().to_string();
            assert_eq!(message, "no script selected");
        }
    }

    #[test]
    fn test_prompt_without_options() {
        let err = prompt_choice("canister", Vec::new()).unwrap_err();
        assert_eq!(err.to_string(), "no canister to choose from");
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug").unwrap(), Level::DEBUG);
        assert_eq!(parse_level("WARN").unwrap(), Level::WARN);
        assert!(parse_level("chatty").is_err());
    }

    #[test]
    fn test_list_output() {
        let config = HarnessConfig::from_toml(
            r#"
            [canisters.backend]
            template_path = "templates/backend.template"

            [canisters.frontend]
            "#,
        )
        .unwrap();
        let mut out = Vec::new();

        list(&mut out, &options(&["deploy", "transfer.sh"]), &config).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("  deploy\n  transfer.sh\n"));
        assert!(text.contains("  backend (templates/backend.template)\n"));
        assert!(text.contains("  frontend\n"));
    }

    #[test]
    fn test_input_conflicts_with_canister() {
        let result = build_cli().try_get_matches_from([
            "dfxtest",
            "--input",
            "{}",
            "--canister",
            "backend",
        ]);
        assert!(result.is_err());
    }
}
