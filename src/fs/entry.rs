use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

/// One viewable text file discovered by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    /// Forward-slash path, unique within one backend session.
    pub relative_path: String,
    /// Location on the server, for server-backed entries.
    pub absolute_path: Option<String>,
    pub size_bytes: u64,
    pub modified: Option<DateTime<Utc>>,
    /// Empty until loaded.
    pub content: String,
    /// Local file backing a handle-based entry; re-read on every load.
    pub source_handle: Option<PathBuf>,
}

impl FileEntry {
    /// Create an entry with no content loaded yet.
    pub fn new(name: impl Into<String>, relative_path: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            name: name.into(),
            relative_path: relative_path.into(),
            absolute_path: None,
            size_bytes,
            modified: None,
            content: String::new(),
            source_handle: None,
        }
    }

    /// Whether the content has been loaded.
    pub fn is_loaded(&self) -> bool {
        !self.content.is_empty()
    }
}

/// Whether `name` ends in one of the recognized text `extensions`
/// (compared case-insensitively, dots excluded).
pub fn has_text_extension(name: &str, extensions: &[String]) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Join path segments with `/`, skipping empty ones.
pub fn join_relative<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}
