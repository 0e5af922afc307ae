//! In-memory diagnostic collection.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::sync::atomic::{AtomicBool, Ordering};

use url::Url;

use crate::host::DiagnosticCollection;
use crate::types::{Diagnostic, Severity};

/// Thread-safe [`DiagnosticCollection`] keeping diagnostics in a map.
pub struct DiagnosticsStore {
    name: String,
    data: Mutex<HashMap<Url, Vec<Diagnostic>>>,
    disposed: AtomicBool,
}

impl DiagnosticsStore {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: Mutex::new(HashMap::new()),
            disposed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Diagnostics currently held for `uri`.
    #[must_use]
    pub fn get(&self, uri: &Url) -> Vec<Diagnostic> {
        self.lock().get(uri).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        let mut files: Vec<(Url, Vec<Diagnostic>)> = self
            .lock()
            .iter()
            .map(|(uri, items)| (uri.clone(), items.clone()))
            .collect();

        // Sort: files with errors first, then by URI
        files.sort_by(|a, b| {
            let a_has_errors = a.1.iter().any(|d| d.severity().is_error());
            let b_has_errors = b.1.iter().any(|d| d.severity().is_error());
            b_has_errors
                .cmp(&a_has_errors)
                .then_with(|| a.0.as_str().cmp(b.0.as_str()))
        });

        DiagnosticsSnapshot { files }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Url, Vec<Diagnostic>>> {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl DiagnosticCollection for DiagnosticsStore {
    fn set(&self, uri: &Url, diagnostics: Vec<Diagnostic>) {
        if self.is_disposed() {
            tracing::warn!(collection = %self.name, %uri, "Write to disposed collection ignored");
            return;
        }
        let mut data = self.lock();
        if diagnostics.is_empty() {
            data.remove(uri);
        } else {
            data.insert(uri.clone(), diagnostics);
        }
    }

    fn clear(&self) {
        self.lock().clear();
    }

    fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        self.lock().clear();
    }
}

/// Immutable view of a collection, suitable for rendering.
///
/// Counts are computed from `files`, never cached alongside it.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticsSnapshot {
    /// Per-URI diagnostics, error-containing files first.
    files: Vec<(Url, Vec<Diagnostic>)>,
}

impl DiagnosticsSnapshot {
    #[must_use]
    pub fn files(&self) -> &[(Url, Vec<Diagnostic>)] {
        &self.files
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn count_by(&self, predicate: impl Fn(&Diagnostic) -> bool) -> usize {
        self.files
            .iter()
            .flat_map(|(_, items)| items)
            .filter(|d| predicate(d))
            .count()
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.count_by(|d| d.severity().is_error())
    }

    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.count_by(|d| d.severity() == Severity::Warning)
    }

    #[must_use]
    pub fn info_count(&self) -> usize {
        self.count_by(|d| d.severity() == Severity::Information)
    }

    #[must_use]
    pub fn total_count(&self) -> usize {
        self.files.iter().map(|(_, items)| items.len()).sum()
    }

    /// Compact status string like "E:3 W:5".
    #[must_use]
    pub fn status_string(&self) -> String {
        if self.is_empty() {
            return String::new();
        }
        format!("E:{} W:{}", self.error_count(), self.warning_count())
    }
}
