//! Filesystem-backed host.
//!
//! Documents are files read from disk and are never dirty; the CLI reloads
//! them when they change. Each checker gets an in-memory
//! [`DiagnosticsStore`] that the reporter reads back.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use syncheck_checker::placement::path_to_file_uri;
use syncheck_checker::{
    BufferDocument, Diagnostic, DiagnosticCollection, DiagnosticsStore, DocumentEvent, Host,
    OpenDocumentError, TextDocument,
};
use tokio::sync::broadcast;
use url::Url;

const DOCUMENT_EVENT_CAPACITY: usize = 64;

/// Language id used when a file has no extension and no override was given.
const FALLBACK_LANGUAGE: &str = "plaintext";

pub struct FsHost {
    root: PathBuf,
    language_override: Option<String>,
    documents: Mutex<HashMap<Url, Arc<BufferDocument>>>,
    events: broadcast::Sender<DocumentEvent>,
    collections: Mutex<Vec<Arc<DiagnosticsStore>>>,
}

impl FsHost {
    /// `root` must be absolute.
    #[must_use]
    pub fn new(root: PathBuf, language_override: Option<String>) -> Self {
        let (events, _) = broadcast::channel(DOCUMENT_EVENT_CAPACITY);
        Self {
            root,
            language_override,
            documents: Mutex::new(HashMap::new()),
            events,
            collections: Mutex::new(Vec::new()),
        }
    }

    /// `--language` if given, otherwise the lower-cased file extension.
    #[must_use]
    pub fn language_for(&self, path: &Path) -> String {
        if let Some(language) = &self.language_override {
            return language.clone();
        }
        path.extension()
            .and_then(|ext| ext.to_str())
            .map_or_else(|| FALLBACK_LANGUAGE.to_string(), str::to_lowercase)
    }

    /// Read `path` into its document, creating the document on first use.
    pub async fn load(&self, path: &Path) -> Result<Arc<BufferDocument>> {
        let uri = path_to_file_uri(path)?;
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;

        let mut documents = self.lock_documents();
        if let Some(existing) = documents.get(&uri) {
            existing.set_text(text);
            return Ok(Arc::clone(existing));
        }
        let document = Arc::new(BufferDocument::new(
            uri.clone(),
            self.language_for(path),
            text,
        ));
        documents.insert(uri, Arc::clone(&document));
        Ok(document)
    }

    /// Load `path` and announce it as newly opened.
    pub async fn open(&self, path: &Path) -> Result<Arc<BufferDocument>> {
        let document = self.load(path).await?;
        self.announce(DocumentEvent::Opened(Arc::clone(&document) as Arc<dyn TextDocument>));
        Ok(document)
    }

    /// Re-read `path` and announce the change.
    pub async fn reload(&self, path: &Path) -> Result<Arc<BufferDocument>> {
        let document = self.load(path).await?;
        self.announce(DocumentEvent::Changed(Arc::clone(&document) as Arc<dyn TextDocument>));
        Ok(document)
    }

    fn announce(&self, event: DocumentEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("No checker is listening for document events");
        }
    }

    /// Live (not disposed) collections, in creation order.
    #[must_use]
    pub fn collections(&self) -> Vec<Arc<DiagnosticsStore>> {
        self.lock_collections()
            .iter()
            .filter(|store| !store.is_disposed())
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn collection(&self, name: &str) -> Option<Arc<DiagnosticsStore>> {
        self.collections()
            .into_iter()
            .rev()
            .find(|store| store.name() == name)
    }

    /// Everything any checker currently reports for `uri`.
    #[must_use]
    pub fn diagnostics_for(&self, uri: &Url) -> Vec<Diagnostic> {
        self.collections()
            .iter()
            .flat_map(|store| store.get(uri))
            .collect()
    }

    /// Path to show for `uri`: relative to the root when inside it.
    #[must_use]
    pub fn display_path(&self, uri: &Url) -> PathBuf {
        match uri.to_file_path() {
            Ok(path) => path
                .strip_prefix(&self.root)
                .map(Path::to_path_buf)
                .unwrap_or(path),
            Err(()) => PathBuf::from(uri.as_str()),
        }
    }

    fn lock_documents(&self) -> MutexGuard<'_, HashMap<Url, Arc<BufferDocument>>> {
        self.documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_collections(&self) -> MutexGuard<'_, Vec<Arc<DiagnosticsStore>>> {
        self.collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Host for FsHost {
    fn workspace_root(&self) -> &Path {
        &self.root
    }

    fn active_document(&self) -> Option<Arc<dyn TextDocument>> {
        None
    }

    fn subscribe(&self) -> broadcast::Receiver<DocumentEvent> {
        self.events.subscribe()
    }

    fn open_document(
        &self,
        uri: &Url,
    ) -> impl Future<Output = Result<Arc<dyn TextDocument>, OpenDocumentError>> + Send {
        let uri = uri.clone();
        async move {
            let cached = self.lock_documents().get(&uri).cloned();
            if let Some(document) = cached {
                return Ok(document as Arc<dyn TextDocument>);
            }

            // Files outside the checked set are read fresh and not cached.
            let path = uri.to_file_path().map_err(|()| OpenDocumentError {
                uri: uri.clone(),
                reason: "not a file URI".to_string(),
            })?;
            let text = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| OpenDocumentError {
                    uri: uri.clone(),
                    reason: e.to_string(),
                })?;
            let language = self.language_for(&path);
            Ok(Arc::new(BufferDocument::new(uri, language, text)) as Arc<dyn TextDocument>)
        }
    }

    fn create_collection(&self, name: &str) -> Arc<dyn DiagnosticCollection> {
        let store = Arc::new(DiagnosticsStore::new(name));
        let mut collections = self.lock_collections();
        collections.retain(|existing| !existing.is_disposed());
        collections.push(Arc::clone(&store));
        store
    }

    fn show_warning(&self, message: &str) {
        eprintln!("warning: {message}");
    }
}
