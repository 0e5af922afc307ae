//! Diagnostic placement: from a checker's path string to a document URI and
//! from a point position to a word range.

use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::host::TextDocument;
use crate::types::{Diagnostic, RawDiagnostic};

/// Angle-bracket placeholder such as `<stdin>` meaning "the buffer itself".
static BUFFER_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^<.*>$").expect("valid buffer marker regex"));

#[derive(Debug, thiserror::Error)]
#[error("cannot convert path to file URI: {}", path.display())]
pub struct PathToUriError {
    path: PathBuf,
}

/// Where a group of diagnostics will be published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub uri: Url,
    /// The checker referred to the triggering buffer rather than a file.
    pub is_trigger_buffer: bool,
}

#[must_use]
pub fn is_buffer_marker(path: &str) -> bool {
    BUFFER_MARKER.is_match(path)
}

/// Resolve a checker's path string.
///
/// Buffer markers map to the triggering document, absolute paths are taken as
/// is, anything else is joined onto the workspace root.
pub fn resolve_target(
    path: &str,
    trigger_uri: &Url,
    workspace_root: &Path,
) -> Result<Target, PathToUriError> {
    if is_buffer_marker(path) {
        return Ok(Target {
            uri: trigger_uri.clone(),
            is_trigger_buffer: true,
        });
    }

    let candidate = Path::new(path);
    let full = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        normalize_path(&workspace_root.join(candidate))
    };
    let uri = path_to_file_uri(&full)?;
    Ok(Target {
        uri,
        is_trigger_buffer: false,
    })
}

pub fn path_to_file_uri(path: &Path) -> Result<Url, PathToUriError> {
    Url::from_file_path(path).map_err(|()| PathToUriError {
        path: path.to_path_buf(),
    })
}

/// Lexically resolve `.` and `..` components.
///
/// `..` never climbs above the root or drive prefix: like the OS, `/..` is
/// `/`, so checkers that print `../../usr/include/x.h` still land on an
/// absolute path.
fn normalize_path(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                Some(Component::ParentDir | Component::CurDir) | None => out.push(component),
            },
            other => out.push(other),
        }
    }
    out.iter().collect()
}

/// Turn one file's raw diagnostics into publishable ones.
///
/// `document` is the opened target, or `None` when it could not be opened.
/// Word expansion only happens when the line/column numbers can be trusted:
/// the checker saw exactly this buffer, or the file on disk has no unsaved
/// edits.
#[must_use]
pub fn place(
    raw: &[RawDiagnostic],
    source: &str,
    target: &Target,
    document: Option<&dyn TextDocument>,
) -> Vec<Diagnostic> {
    let expander = document.filter(|doc| target.is_trigger_buffer || !doc.is_dirty());

    raw.iter()
        .map(|item| {
            let mut diagnostic = Diagnostic::from_raw(item, source);
            if let Some(doc) = expander
                && let Some(word) = doc.word_range_at(item.anchor())
            {
                diagnostic.set_range(word);
            }
            diagnostic
        })
        .collect()
}
