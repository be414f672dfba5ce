//! User-facing test output
//!
//! Coloured blocks on the terminal, the same text without colour in the
//! run's log file.

use dfxtest_model::{Tally, TestOutcome};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use termcolor::{Color, ColorChoice, ColorSpec, NoColor, StandardStream, WriteColor};
use tracing::warn;

const RULE: &str = "========================================================";

/// Plain-text log of one run
pub struct RunLog {
    path: PathBuf,
    file: File,
}

impl RunLog {
    /// Create `<logs_dir>/<script>-<timestamp>.log`
    ///
    /// # Errors
    ///
    /// Returns `io::Error` if the directory or file cannot be created
    pub fn create(logs_dir: &Path, script: &str) -> io::Result<Self> {
        fs::create_dir_all(logs_dir)?;
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        let script: String = script
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        let path = logs_dir.join(format!("{script}-{stamp}.log"));
        let file = File::options().create(true).append(true).open(&path)?;
        Ok(Self { path, file })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_line(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.file, "{text}")
    }
}

pub struct Reporter {
    out: Box<dyn WriteColor>,
    log: Option<RunLog>,
}

impl Reporter {
    #[must_use]
    pub fn stdout(color: ColorChoice) -> Self {
        Self::with_writer(StandardStream::stdout(color))
    }

    /// Reporter that discards terminal output, still writing the log if attached
    #[must_use]
    pub fn quiet() -> Self {
        Self::with_writer(NoColor::new(io::sink()))
    }

    #[must_use]
    pub fn with_writer(out: impl WriteColor + 'static) -> Self {
        Self {
            out: Box::new(out),
            log: None,
        }
    }

    #[must_use]
    pub fn with_log(mut self, log: RunLog) -> Self {
        self.log = Some(log);
        self
    }

    #[must_use]
    pub fn log_path(&self) -> Option<&Path> {
        self.log.as_ref().map(RunLog::path)
    }

    /// Heading printed before a group of dfx steps
    pub fn section(&mut self, title: &str) {
        self.emit(bold(), &format!("\n==== {title} ====\n"));
    }

    pub fn outcome(&mut self, outcome: &TestOutcome) {
        if outcome.passed() {
            let green = colored(Color::Green, false);
            self.emit(
                green.clone(),
                &format!(
                    "\n^^^^^^^^^^^^^^^^^^ TEST {} SUCCESSFUL ^^^^^^^^^^^^^^^^^^",
                    outcome.id
                ),
            );
            self.emit(green.clone(), &outcome.label);
            self.emit(green, &format!("{RULE}\n"));
        } else {
            let red = colored(Color::Red, true);
            self.emit(
                red.clone(),
                &format!(
                    "\n^^^^^^^^^^^^^^^^^^ TEST {} FAILED ^^^^^^^^^^^^^^^^^^",
                    outcome.id
                ),
            );
            self.emit(red.clone(), &outcome.label);
            self.emit(
                red.clone(),
                &format!("Expected: {}, Got: {}", outcome.expected, outcome.actual),
            );
            self.emit(red, &format!("{RULE}\n"));
        }
    }

    pub fn summary(&mut self, tally: &Tally) {
        self.emit(bold(), "\n<<< TESTING COMPLETED >>>\n");
        self.emit(
            colored(Color::Green, false),
            &format!("Tests Passed: {}", tally.success),
        );
        self.emit(
            colored(Color::Red, false),
            &format!("Tests Failed: {}", tally.failed),
        );
        self.emit(
            colored(Color::Yellow, true),
            &format!("Total Tests: {}", tally.total),
        );
    }

    pub fn warning(&mut self, message: &str) {
        self.emit(colored(Color::Red, true), &format!("WARNING: {message}"));
    }

    /// Uncoloured text, e.g. output captured from a script
    pub fn line(&mut self, text: &str) {
        self.emit(ColorSpec::new(), text);
    }

    fn emit(&mut self, spec: ColorSpec, text: &str) {
        let written = self
            .out
            .set_color(&spec)
            .and_then(|()| writeln!(self.out, "{text}"))
            .and_then(|()| self.out.reset());
        if let Err(err) = written {
            warn!(%err, "cannot write test output");
        }

        if let Some(log) = &mut self.log {
            if let Err(err) = log.write_line(text) {
                warn!(path = %log.path.display(), %err, "cannot write run log");
            }
        }
    }
}

fn bold() -> ColorSpec {
    let mut spec = ColorSpec::new();
    spec.set_bold(true);
    spec
}

fn colored(color: Color, bold: bool) -> ColorSpec {
    let mut spec = ColorSpec::new();
    spec.set_fg(Some(color)).set_bold(bold);
    spec
}
