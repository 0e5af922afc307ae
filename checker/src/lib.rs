//! On-the-fly syntax checking through external command-line checkers.
//!
//! A host feeds document events into a [`CheckerRegistry`]; each configured
//! checker debounces them, pipes the document text into its tool, parses the
//! `path:line:col: severity: message` lines it prints, and publishes the
//! results into a diagnostic collection supplied by the host.

pub mod host;
pub mod parser;
pub mod placement;
pub mod types;
pub mod words;

pub(crate) mod scheduler;

mod diagnostics;
mod instance;
mod registry;
mod runner;

pub use diagnostics::{DiagnosticsSnapshot, DiagnosticsStore};
pub use host::{
    BufferDocument, DiagnosticCollection, DocumentEvent, Host, OpenDocumentError, TextDocument,
};
pub use instance::CheckerInstance;
pub use placement::PathToUriError;
pub use registry::CheckerRegistry;
pub use runner::{ProcessRunner, RunError};
pub use types::{
    CheckerConfig, CheckerEntry, CheckerEvent, CheckerSettings, Diagnostic, DiagnosticsByFile,
    Position, Range, RawDiagnostic, RunToken, Severity, STDIN_SENTINEL,
};
