//! Terminal output for diagnostics and run progress.

use std::collections::BTreeMap;
use std::path::PathBuf;

use syncheck_checker::{CheckerEvent, Diagnostic, Position, Severity};
use url::Url;

use crate::host::FsHost;

/// Totals across every reported diagnostic.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub errors: usize,
    pub warnings: usize,
    pub infos: usize,
}

impl Summary {
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    fn record(&mut self, severity: Severity) {
        match severity {
            Severity::Error => self.errors += 1,
            Severity::Warning => self.warnings += 1,
            Severity::Information => self.infos += 1,
        }
    }
}

/// Diagnostics kept across the files of a one-shot pass.
///
/// Every run clears its checker's collection, so results are copied out
/// after each file settles. A later result for the same collection and URI
/// replaces the earlier one.
#[derive(Debug, Default)]
pub struct Collected {
    results: BTreeMap<(usize, Url), Vec<Diagnostic>>,
}

impl Collected {
    /// Copy out what every live collection currently holds.
    pub fn absorb(&mut self, host: &FsHost) {
        for (index, store) in host.collections().iter().enumerate() {
            for (uri, items) in store.snapshot().files() {
                self.results.insert((index, uri.clone()), items.clone());
            }
        }
    }

    /// Every kept diagnostic as a display line, ordered by path then
    /// position.
    #[must_use]
    pub fn render(&self, host: &FsHost) -> (Vec<String>, Summary) {
        let mut summary = Summary::default();
        let mut rows: Vec<(PathBuf, Position, String)> = Vec::new();

        for ((_, uri), items) in &self.results {
            let path = host.display_path(uri);
            for diagnostic in items {
                summary.record(diagnostic.severity());
                rows.push((
                    path.clone(),
                    diagnostic.range().start,
                    diagnostic.display_with_path(&path),
                ));
            }
        }

        rows.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
        (rows.into_iter().map(|(_, _, line)| line).collect(), summary)
    }
}

pub fn print_all(collected: &Collected, host: &FsHost) -> Summary {
    let (lines, summary) = collected.render(host);
    for line in lines {
        println!("{line}");
    }
    if summary != Summary::default() {
        eprintln!(
            "{} error(s), {} warning(s), {} info",
            summary.errors, summary.warnings, summary.infos
        );
    }
    summary
}

fn print_for_uri(host: &FsHost, uri: &Url) {
    let path = host.display_path(uri);
    let mut diagnostics = host.diagnostics_for(uri);
    diagnostics.sort_by_key(Diagnostic::range);
    for diagnostic in diagnostics {
        println!("{}", diagnostic.display_with_path(&path));
    }
}

/// Watch-mode reaction to one checker event.
pub fn print_event(host: &FsHost, event: &CheckerEvent) {
    match event {
        CheckerEvent::Published { uri, .. } => print_for_uri(host, uri),
        CheckerEvent::RunSettled { checker, .. } => {
            let status = host
                .collection(checker)
                .map(|store| store.snapshot().status_string())
                .unwrap_or_default();
            if status.is_empty() {
                eprintln!("[{checker}] clean");
            } else {
                eprintln!("[{checker}] {status}");
            }
        }
        CheckerEvent::RunStarted { .. }
        | CheckerEvent::RunDiscarded { .. }
        | CheckerEvent::RunFailed { .. } => {}
    }
}
