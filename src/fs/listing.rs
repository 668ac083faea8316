//! Server-side enumeration and reads below the sandbox root.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::fs::entry::{has_text_extension, FileEntry};

/// One text file as reported by the directory listing query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListedFile {
    pub name: String,
    /// Forward-slash path relative to the listed directory.
    pub path: String,
    pub full_path: String,
    pub size: u64,
    pub mtime: DateTime<Utc>,
}

impl From<ListedFile> for FileEntry {
    fn from(file: ListedFile) -> Self {
        let mut entry = FileEntry::new(file.name, file.path, file.size);
        entry.absolute_path = Some(file.full_path);
        entry.modified = Some(file.mtime);
        entry
    }
}

/// Response of the directory listing query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub files: Vec<ListedFile>,
    /// The resolved directory that was listed.
    pub directory: String,
}

/// Response of the file content query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileContent {
    pub content: String,
    pub size: u64,
    pub mtime: DateTime<Utc>,
    /// The path as the client asked for it.
    pub path: String,
}

fn to_utc(time: std::io::Result<SystemTime>) -> DateTime<Utc> {
    time.map(DateTime::<Utc>::from).unwrap_or_else(|_| Utc::now())
}

/// Recursively collect text files under `dir`, with paths relative to `base`.
///
/// A directory that cannot be read is logged and skipped; so is a file whose
/// metadata cannot be read. Symlinks are not followed.
pub fn collect_files(dir: &Path, base: &Path, extensions: &[String]) -> Vec<ListedFile> {
    let mut result = Vec::new();
    collect_into(dir, base, extensions, &mut result);
    result
}

fn collect_into(dir: &Path, base: &Path, extensions: &[String], result: &mut Vec<ListedFile>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::error!(dir = %dir.display(), error = %e, "error reading directory");
            return;
        }
    };

    let mut entries: Vec<fs::DirEntry> = entries.filter_map(|e| e.ok()).collect();
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let file_type = match entry.file_type() {
            Ok(t) => t,
            Err(_) => continue,
        };
        let full_path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();

        if file_type.is_dir() {
            collect_into(&full_path, base, extensions, result);
        } else if file_type.is_file() && has_text_extension(&name, extensions) {
            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(file = %full_path.display(), error = %e, "skipping unreadable file");
                    continue;
                }
            };
            let relative = full_path
                .strip_prefix(base)
                .unwrap_or(&full_path)
                .to_string_lossy()
                .replace('\\', "/");
            result.push(ListedFile {
                name,
                path: relative,
                full_path: full_path.to_string_lossy().to_string(),
                size: metadata.len(),
                mtime: to_utc(metadata.modified()),
            });
        }
    }
}

async fn bounded<T>(timeout: Duration, fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| AppError::Timeout(timeout.as_millis() as u64))?
}

/// List text files below `dir`, which must be an existing directory.
pub async fn list_directory(dir: PathBuf, extensions: Vec<String>, timeout: Duration) -> Result<Listing> {
    bounded(timeout, async move {
        let metadata = tokio::fs::metadata(&dir)
            .await
            .map_err(|e| read_error(&dir, e))?;
        if !metadata.is_dir() {
            return Err(AppError::NotADirectory(dir));
        }

        let walk_dir = dir.clone();
        let files = tokio::task::spawn_blocking(move || {
            collect_files(&walk_dir, &walk_dir, &extensions)
        })
        .await
        .map_err(|e| AppError::Io(std::io::Error::other(e)))?;

        Ok(Listing {
            files,
            directory: dir.to_string_lossy().to_string(),
        })
    })
    .await
}

/// Read one file's current content. `requested` is echoed back as `path`.
pub async fn read_file(path: PathBuf, requested: String, timeout: Duration) -> Result<FileContent> {
    bounded(timeout, async move {
        let content = read_text(&path).await.map_err(|e| read_error(&path, e))?;
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| read_error(&path, e))?;
        Ok(FileContent {
            content,
            size: metadata.len(),
            mtime: to_utc(metadata.modified()),
            path: requested,
        })
    })
    .await
}

/// Read a file as text. Invalid UTF-8 sequences become U+FFFD.
pub(crate) async fn read_text(path: &Path) -> std::io::Result<String> {
    tokio::fs::read(path).await.map(decode_text)
}

pub(crate) fn decode_text(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

pub(crate) fn read_error(path: &Path, source: std::io::Error) -> AppError {
    if source.kind() == std::io::ErrorKind::NotFound {
        AppError::NotFound(path.to_path_buf())
    } else {
        AppError::TransientRead {
            path: path.to_path_buf(),
            source,
        }
    }
}
