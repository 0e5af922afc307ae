//! Host collaborator interfaces.
//!
//! The engine never owns documents, buffers, or diagnostic rendering. A host
//! (an editor integration, the CLI, a test harness) supplies them through the
//! traits in this module.

use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::broadcast;
use url::Url;

use crate::types::{Diagnostic, Position, Range};
use crate::words;

/// A live document as seen by the host.
pub trait TextDocument: Send + Sync {
    fn uri(&self) -> &Url;

    fn language_id(&self) -> &str;

    /// Current full text.
    fn text(&self) -> String;

    /// Whether the document has unsaved modifications.
    fn is_dirty(&self) -> bool;

    /// Range of the word enclosing `position`, if there is one.
    fn word_range_at(&self, position: Position) -> Option<Range> {
        words::word_range_at(&self.text(), position)
    }
}

/// Document lifecycle notifications delivered to subscribers.
#[derive(Clone)]
pub enum DocumentEvent {
    Opened(Arc<dyn TextDocument>),
    Changed(Arc<dyn TextDocument>),
}

impl DocumentEvent {
    #[must_use]
    pub fn document(&self) -> &Arc<dyn TextDocument> {
        match self {
            Self::Opened(doc) | Self::Changed(doc) => doc,
        }
    }
}

/// A named set of diagnostics, keyed by document URI.
pub trait DiagnosticCollection: Send + Sync {
    /// Replace every diagnostic for `uri`.
    fn set(&self, uri: &Url, diagnostics: Vec<Diagnostic>);

    fn clear(&self);

    /// Release the collection. Later writes are a caller bug.
    fn dispose(&self);
}

#[derive(Debug, thiserror::Error)]
#[error("cannot open document {uri}: {reason}")]
pub struct OpenDocumentError {
    pub uri: Url,
    pub reason: String,
}

/// Everything the engine needs from its surroundings.
pub trait Host: Send + Sync + 'static {
    /// Working directory for checker processes and base for relative paths.
    fn workspace_root(&self) -> &Path;

    /// The document focused when a checker starts, if any.
    fn active_document(&self) -> Option<Arc<dyn TextDocument>>;

    fn subscribe(&self) -> broadcast::Receiver<DocumentEvent>;

    /// Resolve a URI to a document, loading it if needed.
    fn open_document(
        &self,
        uri: &Url,
    ) -> impl Future<Output = Result<Arc<dyn TextDocument>, OpenDocumentError>> + Send;

    fn create_collection(&self, name: &str) -> Arc<dyn DiagnosticCollection>;

    /// User-visible, fire-and-forget warning.
    fn show_warning(&self, message: &str);
}

/// In-memory [`TextDocument`] with replaceable text.
#[derive(Debug)]
pub struct BufferDocument {
    uri: Url,
    language_id: String,
    text: RwLock<String>,
    dirty: AtomicBool,
}

impl BufferDocument {
    #[must_use]
    pub fn new(uri: Url, language_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            uri,
            language_id: language_id.into(),
            text: RwLock::new(text.into()),
            dirty: AtomicBool::new(false),
        }
    }

    pub fn set_text(&self, text: impl Into<String>) {
        let mut guard = self
            .text
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = text.into();
    }

    pub fn set_dirty(&self, dirty: bool) {
        self.dirty.store(dirty, Ordering::SeqCst);
    }
}

impl TextDocument for BufferDocument {
    fn uri(&self) -> &Url {
        &self.uri
    }

    fn language_id(&self) -> &str {
        &self.language_id
    }

    fn text(&self) -> String {
        self.text
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }
}
