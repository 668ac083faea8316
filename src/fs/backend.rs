//! The three file sources a session can browse, behind one capability
//! surface: enumerate, read one entry, and (server only) watch.

use std::path::{Path, PathBuf};
use std::time::Duration;

use eventsource_stream::Eventsource;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::header::ACCEPT;

use crate::error::{AppError, ErrorBody, Result};
use crate::fs::entry::{has_text_extension, join_relative, FileEntry};
use crate::fs::listing::{decode_text, read_error, read_text, FileContent, Listing};
use crate::fs::watcher::{WatchKind, WatchMessage};

/// Messages from an open watch channel.
pub type WatchStream = BoxStream<'static, Result<WatchMessage>>;

/// A file source.
pub enum Backend {
    Handle(HandleBackend),
    Snapshot(SnapshotBackend),
    Server(ServerBackend),
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Handle(_) => "handle",
            Backend::Snapshot(_) => "snapshot",
            Backend::Server(_) => "server",
        }
    }

    /// List every viewable file.
    pub async fn enumerate(&self) -> Result<Vec<FileEntry>> {
        match self {
            Backend::Handle(b) => b.enumerate().await,
            Backend::Snapshot(b) => Ok(b.enumerate()),
            Backend::Server(b) => b.enumerate().await,
        }
    }

    /// Current text of one entry.
    pub async fn read(&self, entry: &FileEntry) -> Result<String> {
        match self {
            Backend::Handle(b) => b.read(entry).await,
            Backend::Snapshot(b) => b.read(entry),
            Backend::Server(b) => b.read(entry).await,
        }
    }

    pub fn supports_watch(&self) -> bool {
        matches!(self, Backend::Server(_))
    }

    /// Watch target for a file entry, or for the listed directory when
    /// `entry` is `None`. Only the server backend has one.
    pub fn watch_target(&self, entry: Option<&FileEntry>) -> Option<String> {
        match self {
            Backend::Server(b) => Some(match entry {
                Some(entry) => b.server_path(entry),
                None => b.directory.clone().unwrap_or_default(),
            }),
            _ => None,
        }
    }

    /// Open a watch channel. `Ok(None)` for backends without watch support.
    pub async fn watch(&self, kind: WatchKind, target: &str) -> Result<Option<WatchStream>> {
        match self {
            Backend::Server(b) => b.watch(kind, target).await.map(Some),
            _ => Ok(None),
        }
    }
}

// ── Handle ───────────────────────────────────────────────────────────────────

/// A granted local directory, walked on every enumeration and re-read on
/// every load.
pub struct HandleBackend {
    root: PathBuf,
    root_name: String,
    extensions: Vec<String>,
}

impl HandleBackend {
    pub fn open(root: &Path, extensions: Vec<String>) -> Result<Self> {
        if !root.exists() {
            return Err(AppError::NotFound(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(AppError::NotADirectory(root.to_path_buf()));
        }
        let root_name = root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(Self {
            root: root.to_path_buf(),
            root_name,
            extensions,
        })
    }

    async fn enumerate(&self) -> Result<Vec<FileEntry>> {
        match tokio::fs::metadata(&self.root).await {
            Ok(m) if m.is_dir() => {}
            _ => {
                return Err(AppError::BackendUnavailable(format!(
                    "directory {} is no longer accessible",
                    self.root.display()
                )))
            }
        }

        let root = self.root.clone();
        let root_name = self.root_name.clone();
        let extensions = self.extensions.clone();
        tokio::task::spawn_blocking(move || walk_handle(&root, &root_name, &extensions))
            .await
            .map_err(|e| AppError::Io(std::io::Error::other(e)))
    }

    async fn read(&self, entry: &FileEntry) -> Result<String> {
        let source = entry
            .source_handle
            .as_ref()
            .ok_or_else(|| AppError::InvalidPath(entry.relative_path.clone()))?;
        read_text(source)
            .await
            .map_err(|e| read_error(source, e))
    }
}

/// Walk `root`, naming entries `root_name/.../name`.
fn walk_handle(root: &Path, root_name: &str, extensions: &[String]) -> Vec<FileEntry> {
    let mut entries = Vec::new();
    walk_dir(root, root_name, extensions, &mut entries);
    entries
}

fn walk_dir(dir: &Path, prefix: &str, extensions: &[String], out: &mut Vec<FileEntry>) {
    let read = match std::fs::read_dir(dir) {
        Ok(read) => read,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "skipping unreadable directory");
            return;
        }
    };
    let mut children: Vec<std::fs::DirEntry> = read.filter_map(|e| e.ok()).collect();
    children.sort_by_key(|e| e.file_name());

    for child in children {
        let Ok(file_type) = child.file_type() else {
            continue;
        };
        let name = child.file_name().to_string_lossy().to_string();
        let path = child.path();

        if file_type.is_dir() {
            walk_dir(&path, &join_relative([prefix, name.as_str()]), extensions, out);
        } else if file_type.is_file() && has_text_extension(&name, extensions) {
            match child.metadata() {
                Ok(metadata) => {
                    let mut entry =
                        FileEntry::new(name.clone(), join_relative([prefix, name.as_str()]), metadata.len());
                    entry.modified = metadata.modified().ok().map(Into::into);
                    entry.source_handle = Some(path);
                    out.push(entry);
                }
                Err(e) => {
                    tracing::error!(file = %path.display(), error = %e, "error reading file");
                }
            }
        }
    }
}

// ── Snapshot ─────────────────────────────────────────────────────────────────

/// Files captured once, content included. Never changes afterwards.
pub struct SnapshotBackend {
    entries: Vec<FileEntry>,
}

impl SnapshotBackend {
    /// Read every text file under `root` now.
    pub async fn capture(root: &Path, extensions: Vec<String>) -> Result<Self> {
        let handle = HandleBackend::open(root, extensions)?;
        let root = handle.root.clone();
        let root_name = handle.root_name.clone();
        let extensions = handle.extensions.clone();

        let entries = tokio::task::spawn_blocking(move || {
            walk_handle(&root, &root_name, &extensions)
                .into_iter()
                .filter_map(|mut entry| {
                    let source = entry.source_handle.take()?;
                    match std::fs::read(&source).map(decode_text) {
                        Ok(content) => {
                            entry.content = content;
                            Some(entry)
                        }
                        Err(e) => {
                            tracing::warn!(file = %source.display(), error = %e, "skipping file in snapshot");
                            None
                        }
                    }
                })
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| AppError::Io(std::io::Error::other(e)))?;

        tracing::info!(count = entries.len(), "snapshot captured");
        Ok(Self { entries })
    }

    /// Build a snapshot from in-memory `(relative_path, content)` pairs.
    #[cfg(test)]
    pub fn from_files<I, P, C>(files: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<String>,
    {
        let entries = files
            .into_iter()
            .map(|(path, content)| {
                let path: String = path.into();
                let content: String = content.into();
                let name = path.rsplit('/').next().unwrap_or_default().to_string();
                let mut entry = FileEntry::new(name, path, content.len() as u64);
                entry.content = content;
                entry
            })
            .collect();
        Self { entries }
    }

    fn enumerate(&self) -> Vec<FileEntry> {
        self.entries.clone()
    }

    fn read(&self, entry: &FileEntry) -> Result<String> {
        self.entries
            .iter()
            .find(|e| e.relative_path == entry.relative_path)
            .map(|e| e.content.clone())
            .ok_or_else(|| AppError::NotFound(PathBuf::from(&entry.relative_path)))
    }
}

// ── Server ───────────────────────────────────────────────────────────────────

/// A remote sandboxed directory reached over HTTP.
pub struct ServerBackend {
    base_url: String,
    client: reqwest::Client,
    /// Sub-path of the server root to list; `None` lists the root.
    directory: Option<String>,
    request_timeout: Duration,
}

impl ServerBackend {
    pub fn new(base_url: &str, directory: Option<String>, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(request_timeout)
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            directory: directory.filter(|d| !d.is_empty()),
            request_timeout,
        })
    }

    fn url(&self, route: &str) -> String {
        format!("{}/api/{}", self.base_url, route)
    }

    /// Path to send to the server for `entry`: its absolute location if the
    /// listing reported one, else the listed directory joined with the
    /// relative path.
    fn server_path(&self, entry: &FileEntry) -> String {
        match &entry.absolute_path {
            Some(absolute) => absolute.clone(),
            None => join_relative([
                self.directory.as_deref().unwrap_or_default(),
                entry.relative_path.as_str(),
            ]),
        }
    }

    async fn enumerate(&self) -> Result<Vec<FileEntry>> {
        let mut request = self.client.get(self.url("files")).timeout(self.request_timeout);
        if let Some(dir) = &self.directory {
            request = request.query(&[("path", dir)]);
        }
        let requested = self.directory.clone().unwrap_or_default();
        let response = check(request.send().await?, &requested).await?;
        let listing: Listing = response.json().await?;
        tracing::info!(count = listing.files.len(), directory = %listing.directory, "listing loaded");
        Ok(listing.files.into_iter().map(FileEntry::from).collect())
    }

    async fn read(&self, entry: &FileEntry) -> Result<String> {
        let path = self.server_path(entry);
        let response = self
            .client
            .get(self.url("file-content"))
            .query(&[("path", &path)])
            .timeout(self.request_timeout)
            .send()
            .await?;
        let content: FileContent = check(response, &path).await?.json().await?;
        tracing::debug!(path = %path, size = content.size, "content loaded");
        Ok(content.content)
    }

    async fn watch(&self, kind: WatchKind, target: &str) -> Result<WatchStream> {
        let route = match kind {
            WatchKind::File => "file-watch",
            WatchKind::Directory => "directory-watch",
        };
        let mut request = self
            .client
            .get(self.url(route))
            .header(ACCEPT, "text/event-stream");
        if !target.is_empty() {
            request = request.query(&[("path", target)]);
        }
        let response = check(request.send().await?, target).await?;

        let stream = response.bytes_stream().eventsource().map(|event| match event {
            Ok(event) => serde_json::from_str::<WatchMessage>(&event.data)
                .map_err(|e| AppError::Channel(format!("malformed watch message: {e}"))),
            Err(e) => Err(AppError::Channel(e.to_string())),
        });
        Ok(stream.boxed())
    }
}

/// Turn an error status into the matching `AppError`.
async fn check(response: reqwest::Response, requested: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let body = serde_json::from_str::<ErrorBody>(&text).unwrap_or(ErrorBody {
        error: text,
        code: None,
    });
    Err(AppError::from_remote(status.as_u16(), body, requested))
}
