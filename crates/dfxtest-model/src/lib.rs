//! Data model shared by the dfxtest crates
//!
//! Everything the harness records during a run: identities, canisters,
//! test outcomes and the JSON document handed to test scripts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Identity that always exists and is never removed by the harness
pub const DEFAULT_IDENTITY: &str = "default";

/// Byte range inside a template source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    #[must_use]
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// Line and column position in source text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    #[must_use]
    pub const fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// Convert byte offsets to line/column positions
pub struct SourceMap {
    line_starts: Vec<usize>,
}

impl SourceMap {
    #[must_use]
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (pos, ch) in source.char_indices() {
            if ch == '\n' {
                line_starts.push(pos + 1);
            }
        }
        Self { line_starts }
    }

    #[must_use]
    pub fn position(&self, byte_offset: usize) -> Position {
        match self.line_starts.binary_search(&byte_offset) {
            Ok(line) => Position::new(line + 1, 1),
            Err(line) => {
                let line_start = self.line_starts[line - 1];
                Position::new(line, byte_offset - line_start + 1)
            }
        }
    }
}

/// An identity created during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub name: String,
    pub principal: String,
}

/// A canister deployed during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanisterRecord {
    pub name: String,
    pub canister_id: String,
}

/// Result of a single validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestOutcome {
    pub id: u32,
    pub label: String,
    pub actual: String,
    pub expected: String,
}

impl TestOutcome {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.actual == self.expected
    }
}

impl fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.passed() {
            write!(f, "TEST {} SUCCESSFUL: {}", self.id, self.label)
        } else {
            write!(
                f,
                "TEST {} FAILED: {} (Expected: {}, Got: {})",
                self.id, self.label, self.expected, self.actual
            )
        }
    }
}

/// Running counters across a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    /// Id handed to the next validation
    pub id: u32,
    pub total: u32,
    pub success: u32,
    pub failed: u32,
}

impl Tally {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            id: 1,
            total: 0,
            success: 0,
            failed: 0,
        }
    }

    /// Compare `actual` against `expected`, update the counters and return
    /// the outcome under the next free id
    pub fn record(&mut self, label: &str, actual: &str, expected: &str) -> TestOutcome {
        let outcome = TestOutcome {
            id: self.id,
            label: label.to_string(),
            actual: actual.to_string(),
            expected: expected.to_string(),
        };
        self.total += 1;
        if outcome.passed() {
            self.success += 1;
        } else {
            self.failed += 1;
        }
        self.id += 1;
        outcome
    }

    #[must_use]
    pub const fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

impl Default for Tally {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-canister entry of the script input
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanisterSpec {
    #[serde(default)]
    pub template_path: Option<PathBuf>,
}

/// JSON document passed to every test script
///
/// `{"canisters": {"name": {"template_path": "..."}}, "selected_canister": "name"}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptInput {
    #[serde(default)]
    pub canisters: BTreeMap<String, CanisterSpec>,
    #[serde(default)]
    pub selected_canister: String,
}

impl ScriptInput {
    /// Parse the script input from its JSON form
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if the text is not a JSON object of the expected shape
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Encode the script input as a single-line JSON argument
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if serialization fails
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    #[must_use]
    pub fn template_path(&self, canister: &str) -> Option<&PathBuf> {
        self.canisters
            .get(canister)
            .and_then(|spec| spec.template_path.as_ref())
    }
}
