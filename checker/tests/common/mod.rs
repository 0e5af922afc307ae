//! Shared test utilities and fixtures
//!
//! An in-memory host whose collections remember late writes, plus helpers
//! for building shell-script checkers and waiting on checker events.

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use syncheck_checker::{
    BufferDocument, CheckerConfig, CheckerEntry, CheckerEvent, Diagnostic, DiagnosticCollection,
    DiagnosticsStore, DocumentEvent, Host, OpenDocumentError, TextDocument,
};
use tempfile::TempDir;
use tokio::sync::{Notify, broadcast, mpsc};
use url::Url;

/// Upper bound on any single wait in these tests.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Collection that counts writes arriving after `dispose`.
pub struct RecordingCollection {
    store: DiagnosticsStore,
    late_writes: AtomicUsize,
}

impl RecordingCollection {
    pub fn get(&self, uri: &Url) -> Vec<Diagnostic> {
        self.store.get(uri)
    }

    pub fn is_empty(&self) -> bool {
        self.store.snapshot().is_empty()
    }

    pub fn is_disposed(&self) -> bool {
        self.store.is_disposed()
    }

    pub fn late_writes(&self) -> usize {
        self.late_writes.load(Ordering::SeqCst)
    }
}

impl DiagnosticCollection for RecordingCollection {
    fn set(&self, uri: &Url, diagnostics: Vec<Diagnostic>) {
        if self.store.is_disposed() {
            self.late_writes.fetch_add(1, Ordering::SeqCst);
        }
        self.store.set(uri, diagnostics);
    }

    fn clear(&self) {
        self.store.clear();
    }

    fn dispose(&self) {
        self.store.dispose();
    }
}

/// Holds `open_document` for one URI until the test releases it.
#[derive(Default)]
pub struct LookupGate {
    /// Notified when a lookup reaches the gate.
    pub started: Notify,
    /// Notify to let the waiting lookup finish.
    pub release: Notify,
}

/// Host backed by a temporary workspace and in-memory documents.
pub struct FakeHost {
    root: TempDir,
    documents: Mutex<HashMap<Url, Arc<BufferDocument>>>,
    active: Mutex<Option<Arc<BufferDocument>>>,
    events: broadcast::Sender<DocumentEvent>,
    collections: Mutex<Vec<(String, Arc<RecordingCollection>)>>,
    warnings: Mutex<Vec<String>>,
    gates: Mutex<HashMap<Url, Arc<LookupGate>>>,
}

impl FakeHost {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            root: tempfile::tempdir().unwrap(),
            documents: Mutex::new(HashMap::new()),
            active: Mutex::new(None),
            events,
            collections: Mutex::new(Vec::new()),
            warnings: Mutex::new(Vec::new()),
            gates: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// URI of `relative` under the workspace root.
    pub fn file_uri(&self, relative: &str) -> Url {
        Url::from_file_path(self.root.path().join(relative)).unwrap()
    }

    /// Register an open file-backed document.
    pub fn open_file(&self, relative: &str, language_id: &str, text: &str) -> Arc<BufferDocument> {
        self.register(self.file_uri(relative), language_id, text)
    }

    /// Register an unsaved buffer with no file behind it.
    pub fn open_untitled(&self, name: &str, language_id: &str, text: &str) -> Arc<BufferDocument> {
        self.register(
            Url::parse(&format!("untitled:{name}")).unwrap(),
            language_id,
            text,
        )
    }

    fn register(&self, uri: Url, language_id: &str, text: &str) -> Arc<BufferDocument> {
        let document = Arc::new(BufferDocument::new(uri.clone(), language_id, text));
        self.documents
            .lock()
            .unwrap()
            .insert(uri, Arc::clone(&document));
        document
    }

    /// Make lookups of `relative` wait on the returned gate.
    pub fn hold_lookup(&self, relative: &str) -> Arc<LookupGate> {
        let gate = Arc::new(LookupGate::default());
        self.gates
            .lock()
            .unwrap()
            .insert(self.file_uri(relative), Arc::clone(&gate));
        gate
    }

    pub fn set_active(&self, document: &Arc<BufferDocument>) {
        *self.active.lock().unwrap() = Some(Arc::clone(document));
    }

    pub fn emit_changed(&self, document: &Arc<BufferDocument>) {
        let document: Arc<dyn TextDocument> = Arc::clone(document) as Arc<dyn TextDocument>;
        let _ = self.events.send(DocumentEvent::Changed(document));
    }

    /// Most recently created collection with `name`.
    pub fn collection(&self, name: &str) -> Arc<RecordingCollection> {
        self.collections
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, c)| Arc::clone(c))
            .unwrap_or_else(|| panic!("no collection named {name}"))
    }

    pub fn all_collections(&self) -> Vec<Arc<RecordingCollection>> {
        self.collections
            .lock()
            .unwrap()
            .iter()
            .map(|(_, c)| Arc::clone(c))
            .collect()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().unwrap().clone()
    }
}

impl Host for FakeHost {
    fn workspace_root(&self) -> &Path {
        self.root.path()
    }

    fn active_document(&self) -> Option<Arc<dyn TextDocument>> {
        self.active
            .lock()
            .unwrap()
            .as_ref()
            .map(|doc| Arc::clone(doc) as Arc<dyn TextDocument>)
    }

    fn subscribe(&self) -> broadcast::Receiver<DocumentEvent> {
        self.events.subscribe()
    }

    fn open_document(
        &self,
        uri: &Url,
    ) -> impl Future<Output = Result<Arc<dyn TextDocument>, OpenDocumentError>> + Send {
        let found = self.documents.lock().unwrap().get(uri).cloned();
        let gate = self.gates.lock().unwrap().get(uri).cloned();
        let uri = uri.clone();
        async move {
            if let Some(gate) = gate {
                gate.started.notify_one();
                gate.release.notified().await;
            }
            found
                .map(|doc| doc as Arc<dyn TextDocument>)
                .ok_or_else(|| OpenDocumentError {
                    uri,
                    reason: "not open in test host".to_string(),
                })
        }
    }

    fn create_collection(&self, name: &str) -> Arc<dyn DiagnosticCollection> {
        let collection = Arc::new(RecordingCollection {
            store: DiagnosticsStore::new(name),
            late_writes: AtomicUsize::new(0),
        });
        self.collections
            .lock()
            .unwrap()
            .push((name.to_string(), Arc::clone(&collection)));
        collection
    }

    fn show_warning(&self, message: &str) {
        self.warnings.lock().unwrap().push(message.to_string());
    }
}

/// A checker that runs `script` under `sh -c`; the stdin sentinel becomes `$0`.
pub fn sh_checker(display_name: &str, language_id: &str, script: &str) -> CheckerConfig {
    CheckerConfig::from_entry(&CheckerEntry {
        command: "sh".to_string(),
        display_name: display_name.to_string(),
        arguments: vec!["-c".to_string(), script.to_string()],
        language_ids: vec![language_id.to_string()],
    })
}

pub fn as_document(document: &Arc<BufferDocument>) -> Arc<dyn TextDocument> {
    Arc::clone(document) as Arc<dyn TextDocument>
}

/// Receive events until one matches `done`; returns everything seen.
pub async fn wait_for(
    events: &mut mpsc::Receiver<CheckerEvent>,
    done: impl Fn(&CheckerEvent) -> bool,
) -> Vec<CheckerEvent> {
    let mut seen = Vec::new();
    let result = tokio::time::timeout(EVENT_TIMEOUT, async {
        while let Some(event) = events.recv().await {
            let finished = done(&event);
            seen.push(event);
            if finished {
                return true;
            }
        }
        false
    })
    .await;
    match result {
        Ok(true) => seen,
        Ok(false) => panic!("event channel closed; saw {seen:?}"),
        Err(_) => panic!("timed out waiting for event; saw {seen:?}"),
    }
}

/// Events that arrive within `window`, without waiting for any in particular.
pub async fn collect_for(
    events: &mut mpsc::Receiver<CheckerEvent>,
    window: Duration,
) -> Vec<CheckerEvent> {
    let mut seen = Vec::new();
    let _ = tokio::time::timeout(window, async {
        while let Some(event) = events.recv().await {
            seen.push(event);
        }
    })
    .await;
    seen
}

pub fn is_settled(event: &CheckerEvent) -> bool {
    matches!(event, CheckerEvent::RunSettled { .. })
}

pub fn count_started(events: &[CheckerEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, CheckerEvent::RunStarted { .. }))
        .count()
}
