//! Public types shared between the engine and its hosts.
//!
//! Hosts construct [`CheckerSettings`], receive [`CheckerEvent`]s, and read
//! [`Diagnostic`]s out of whatever [`DiagnosticCollection`] they hand to the
//! engine.
//!
//! [`DiagnosticCollection`]: crate::host::DiagnosticCollection

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;

use serde::Deserialize;
use url::Url;

/// Sentinel argument telling a checker to read the document from stdin.
pub const STDIN_SENTINEL: &str = "-";

const DEFAULT_DELAY_MS: u64 = 500;

const fn default_delay() -> u64 {
    DEFAULT_DELAY_MS
}

/// Settings for the checker subsystem, as read from configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckerSettings {
    /// Debounce interval in milliseconds, shared by all checkers. Default: 500.
    #[serde(default = "default_delay")]
    pub delay: u64,
    /// One entry per external checker tool.
    #[serde(default)]
    pub checkers: Vec<CheckerEntry>,
}

impl Default for CheckerSettings {
    fn default() -> Self {
        Self {
            delay: DEFAULT_DELAY_MS,
            checkers: Vec::new(),
        }
    }
}

/// A single configured checker, before normalization.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckerEntry {
    /// Executable command (e.g. "gcc").
    pub command: String,
    /// Name shown as the diagnostic source and used for the collection.
    #[serde(alias = "displayName")]
    pub display_name: String,
    /// Arguments passed before the stdin sentinel.
    #[serde(default)]
    pub arguments: Vec<String>,
    /// Language identifiers this checker handles (compared case-insensitively).
    #[serde(alias = "languageIds")]
    pub language_ids: Vec<String>,
}

/// Normalized, immutable checker configuration.
///
/// Language ids are lower-cased once here and the stdin sentinel is already
/// appended to the argument list, so a `CheckerConfig` is ready to launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckerConfig {
    command: String,
    display_name: String,
    arguments: Vec<String>,
    language_ids: BTreeSet<String>,
}

impl CheckerConfig {
    #[must_use]
    pub fn from_entry(entry: &CheckerEntry) -> Self {
        let mut arguments = entry.arguments.clone();
        arguments.push(STDIN_SENTINEL.to_string());
        Self {
            command: entry.command.clone(),
            display_name: entry.display_name.clone(),
            arguments,
            language_ids: entry
                .language_ids
                .iter()
                .map(|id| id.to_lowercase())
                .collect(),
        }
    }

    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Arguments including the trailing stdin sentinel.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    #[must_use]
    pub fn language_ids(&self) -> &BTreeSet<String> {
        &self.language_ids
    }

    /// Whether documents with this language id are eligible for this checker.
    #[must_use]
    pub fn handles(&self, language_id: &str) -> bool {
        self.language_ids.contains(&language_id.to_lowercase())
    }
}

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Error = 1,
    Warning = 2,
    Information = 3,
}

impl Severity {
    /// Classify a checker's raw severity word.
    ///
    /// Total: anything that is not an error or a warning is informational.
    #[must_use]
    pub fn classify(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "error" | "fatal error" => Self::Error,
            "warning" => Self::Warning,
            _ => Self::Information,
        }
    }

    #[must_use]
    pub fn is_error(self) -> bool {
        self == Self::Error
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Information => "info",
        }
    }
}

/// A 0-based line/character position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    #[must_use]
    pub const fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// A half-open range between two positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    #[must_use]
    pub const fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Range on a single line from `start` to `end` characters.
    #[must_use]
    pub const fn on_line(line: u32, start: u32, end: u32) -> Self {
        Self::new(Position::new(line, start), Position::new(line, end))
    }
}

/// One diagnostic exactly as a checker reported it.
///
/// `line` and `column` are 1-based as printed by the checker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDiagnostic {
    pub path: String,
    pub line: u32,
    pub column: u32,
    pub severity: String,
    pub message: String,
}

impl RawDiagnostic {
    /// 0-based anchor position, clamped at zero.
    #[must_use]
    pub fn anchor(&self) -> Position {
        Position::new(self.line.saturating_sub(1), self.column.saturating_sub(1))
    }

    /// Single-character range at the anchor: `[line, col-1]..[line, col]`.
    #[must_use]
    pub fn point_range(&self) -> Range {
        let anchor = self.anchor();
        Range::on_line(anchor.line, anchor.character, self.column)
    }
}

/// A diagnostic placed against a document.
///
/// Fields are private; construction goes through [`Diagnostic::new`] or
/// [`Diagnostic::from_raw`], readers use the accessors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    range: Range,
    message: String,
    severity: Severity,
    /// Display name of the checker that produced it.
    source: String,
}

impl Diagnostic {
    #[must_use]
    pub fn new(range: Range, message: String, severity: Severity, source: String) -> Self {
        Self {
            range,
            message,
            severity,
            source,
        }
    }

    /// Point diagnostic at the raw anchor; placement may widen the range later.
    #[must_use]
    pub fn from_raw(raw: &RawDiagnostic, source: &str) -> Self {
        Self::new(
            raw.point_range(),
            raw.message.clone(),
            Severity::classify(&raw.severity),
            source.to_string(),
        )
    }

    #[must_use]
    pub fn range(&self) -> Range {
        self.range
    }

    pub(crate) fn set_range(&mut self, range: Range) {
        self.range = range;
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Format as `path:line:col: severity: [source] message` (1-based for display).
    #[must_use]
    pub fn display_with_path(&self, path: &Path) -> String {
        format!(
            "{}:{}:{}: {}: [{}] {}",
            path.display(),
            self.range.start.line + 1,
            self.range.start.character + 1,
            self.severity.label(),
            self.source,
            self.message,
        )
    }
}

/// Raw diagnostics grouped by the path string the checker printed.
///
/// Files keep the order in which they first appeared in the output, and each
/// file keeps its diagnostics in output order. Duplicates are preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiagnosticsByFile {
    files: Vec<(String, Vec<RawDiagnostic>)>,
    index: HashMap<String, usize>,
}

impl DiagnosticsByFile {
    pub fn push(&mut self, diagnostic: RawDiagnostic) {
        if let Some(&slot) = self.index.get(&diagnostic.path) {
            self.files[slot].1.push(diagnostic);
            return;
        }
        self.index.insert(diagnostic.path.clone(), self.files.len());
        self.files.push((diagnostic.path.clone(), vec![diagnostic]));
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<&[RawDiagnostic]> {
        self.index
            .get(path)
            .map(|&slot| self.files[slot].1.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[RawDiagnostic])> {
        self.files
            .iter()
            .map(|(path, items)| (path.as_str(), items.as_slice()))
    }

    #[must_use]
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    pub fn total_count(&self) -> usize {
        self.files.iter().map(|(_, items)| items.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl IntoIterator for DiagnosticsByFile {
    type Item = (String, Vec<RawDiagnostic>);
    type IntoIter = std::vec::IntoIter<(String, Vec<RawDiagnostic>)>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.into_iter()
    }
}

/// Generation counter stamped on a run when it starts.
///
/// A run's results may be published only while its token is still the
/// instance's current token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunToken(u64);

impl RunToken {
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RunToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Progress notifications emitted by checker instances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckerEvent {
    /// The debounce timer fired and a checker process is being launched.
    RunStarted {
        checker: String,
        token: RunToken,
        uri: Url,
    },
    /// Diagnostics for one URI were written to the collection.
    Published {
        checker: String,
        uri: Url,
        count: usize,
    },
    /// Every file of the current run has been written.
    RunSettled { checker: String, token: RunToken },
    /// A run completed after being superseded; its output was dropped.
    RunDiscarded { checker: String, token: RunToken },
    /// The checker could not be launched or its I/O failed.
    RunFailed {
        checker: String,
        token: RunToken,
        error: String,
    },
}

impl CheckerEvent {
    #[must_use]
    pub fn checker(&self) -> &str {
        match self {
            Self::RunStarted { checker, .. }
            | Self::Published { checker, .. }
            | Self::RunSettled { checker, .. }
            | Self::RunDiscarded { checker, .. }
            | Self::RunFailed { checker, .. } => checker,
        }
    }

    /// Whether this event ends a run (settled or failed).
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RunSettled { .. } | Self::RunFailed { .. })
    }
}
