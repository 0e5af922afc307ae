//! Checker output parsing.
//!
//! Checkers print one diagnostic per line in the conventional
//! `path:line:col: severity: message` form. Anything else (continuation
//! lines, banners, summaries) is ignored.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::{DiagnosticsByFile, RawDiagnostic};

/// The first two characters of a line are an opaque prefix so drive-letter
/// paths (`C:\src\a.c`) survive; the path then runs up to the first
/// disallowed character. Only errors and warnings are diagnostics; `note:`
/// and similar follow-up lines are ignored.
static DIAGNOSTIC_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(..[^:\r\n~$%^]+):(\d+):(\d+): (fatal error|error|warning): (.*)$",
    )
    .expect("valid diagnostic line regex")
});

/// Parse a complete block of checker output.
#[must_use]
pub fn parse_output(text: &str) -> DiagnosticsByFile {
    let mut diagnostics = DiagnosticsByFile::default();
    for line in text.lines() {
        parse_line(line, &mut diagnostics);
    }
    diagnostics
}

/// Parse a single output line, appending a diagnostic when it matches.
///
/// Returns whether the line matched.
pub fn parse_line(line: &str, diagnostics: &mut DiagnosticsByFile) -> bool {
    let line = line.trim_end_matches(['\r', '\n']);
    let Some(caps) = DIAGNOSTIC_LINE.captures(line) else {
        tracing::trace!(line, "Ignoring non-diagnostic checker output");
        return false;
    };
    // Digit runs too long for u32 are treated as malformed.
    let (Ok(line_no), Ok(column)) = (caps[2].parse::<u32>(), caps[3].parse::<u32>()) else {
        return false;
    };
    diagnostics.push(RawDiagnostic {
        path: caps[1].to_string(),
        line: line_no,
        column,
        severity: caps[4].to_string(),
        message: caps[5].to_string(),
    });
    true
}

/// Incremental parser for one output stream.
///
/// Bytes arrive in arbitrary chunks; only complete lines are parsed, so a
/// diagnostic split across two reads is still recognized. Lines are decoded
/// lossily, which also keeps multi-byte characters intact across chunks.
#[derive(Debug, Default)]
pub struct OutputParser {
    pending: Vec<u8>,
}

impl OutputParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, parsing every line it completes.
    pub fn push(&mut self, chunk: &[u8], diagnostics: &mut DiagnosticsByFile) {
        self.pending.extend_from_slice(chunk);
        while let Some(newline) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            parse_line(&String::from_utf8_lossy(&line), diagnostics);
        }
    }

    /// Flush a trailing line that had no newline before EOF.
    pub fn finish(&mut self, diagnostics: &mut DiagnosticsByFile) {
        if self.pending.is_empty() {
            return;
        }
        let line = std::mem::take(&mut self.pending);
        parse_line(&String::from_utf8_lossy(&line), diagnostics);
    }
}
