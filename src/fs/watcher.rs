use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use notify_debouncer_mini::{new_debouncer, DebouncedEventKind};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::fs::listing::{self, ListedFile};

/// Default patterns to ignore when watching a directory.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    ".git",
    "node_modules",
    "__pycache__",
    ".venv",
    "target",
];

/// Default flood threshold (events per debounce window).
pub const DEFAULT_FLOOD_THRESHOLD: usize = 100;

/// Outbound buffer per channel; the producer waits when the consumer lags.
const CHANNEL_CAPACITY: usize = 32;

/// What a watch channel observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchKind {
    File,
    Directory,
}

/// How a directory entry changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// The path still exists.
    Change,
    /// The path appeared or disappeared.
    Rename,
}

/// One message on a watch channel, serialized as the SSE `data` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WatchMessage {
    Connected {
        message: String,
        path: String,
        timestamp: DateTime<Utc>,
    },
    Update {
        content: String,
        mtime: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    DirectoryChange {
        files: Vec<ListedFile>,
        changed_file: String,
        event_type: ChangeKind,
        timestamp: DateTime<Utc>,
    },
    Error {
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl WatchMessage {
    fn error(error: impl ToString) -> Self {
        WatchMessage::Error {
            error: error.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Settings for one watch channel.
#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub debounce: Duration,
    pub extensions: Vec<String>,
    pub ignore_patterns: Vec<String>,
    pub flood_threshold: usize,
}

impl WatchOptions {
    pub fn new(debounce: Duration, extensions: Vec<String>) -> Self {
        Self {
            debounce,
            extensions,
            ignore_patterns: DEFAULT_IGNORE_PATTERNS.iter().map(|p| p.to_string()).collect(),
            flood_threshold: DEFAULT_FLOOD_THRESHOLD,
        }
    }
}

type RawBatch = Result<Vec<PathBuf>, String>;

/// Open a watch channel on `target` (already resolved by the path guard).
///
/// `requested` is echoed in the `connected` message. The returned task owns
/// the OS watch; it ends, releasing the watch, when the receiver is dropped
/// or after an `error` message.
pub fn open_channel(
    kind: WatchKind,
    target: PathBuf,
    requested: String,
    options: WatchOptions,
) -> (mpsc::Receiver<WatchMessage>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let task = tokio::spawn(run_channel(kind, target, requested, options, tx));
    (rx, task)
}

async fn run_channel(
    kind: WatchKind,
    target: PathBuf,
    requested: String,
    options: WatchOptions,
    tx: mpsc::Sender<WatchMessage>,
) {
    let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<RawBatch>();

    let mut debouncer = match new_debouncer(
        options.debounce,
        move |result: Result<Vec<notify_debouncer_mini::DebouncedEvent>, notify::Error>| {
            let batch = result
                .map(|events| {
                    events
                        .into_iter()
                        .filter(|e| e.kind == DebouncedEventKind::Any)
                        .map(|e| e.path)
                        .collect()
                })
                .map_err(|e| e.to_string());
            let _ = raw_tx.send(batch);
        },
    ) {
        Ok(debouncer) => debouncer,
        Err(e) => {
            let _ = tx.send(WatchMessage::error(e)).await;
            return;
        }
    };

    let mode = match kind {
        WatchKind::File => notify::RecursiveMode::NonRecursive,
        WatchKind::Directory => notify::RecursiveMode::Recursive,
    };
    if let Err(e) = debouncer.watcher().watch(&target, mode) {
        tracing::error!(path = %target.display(), error = %e, "watch failed to start");
        let _ = tx.send(WatchMessage::error(e)).await;
        return;
    }

    let message = match kind {
        WatchKind::File => "Watching file for changes",
        WatchKind::Directory => "Watching directory for changes",
    };
    let connected = WatchMessage::Connected {
        message: message.to_string(),
        path: requested,
        timestamp: Utc::now(),
    };
    if tx.send(connected).await.is_err() {
        return;
    }
    tracing::info!(path = %target.display(), ?kind, "watch started");

    loop {
        let batch = tokio::select! {
            _ = tx.closed() => break,
            batch = raw_rx.recv() => match batch {
                Some(batch) => batch,
                None => break,
            },
        };

        let messages = match batch {
            Ok(paths) => match kind {
                WatchKind::File => file_messages(&target, &paths).await,
                WatchKind::Directory => directory_messages(&target, paths, &options).await,
            },
            Err(e) => vec![WatchMessage::error(e)],
        };

        let mut failed = false;
        for message in messages {
            failed = matches!(message, WatchMessage::Error { .. });
            if tx.send(message).await.is_err() {
                failed = true;
            }
            if failed {
                break;
            }
        }
        if failed {
            break;
        }
    }

    drop(debouncer);
    tracing::info!(path = %target.display(), ?kind, "watch stopped");
}

async fn file_messages(target: &Path, paths: &[PathBuf]) -> Vec<WatchMessage> {
    if paths.is_empty() {
        return Vec::new();
    }

    let read = async {
        let content = listing::read_text(target).await?;
        let metadata = tokio::fs::metadata(target).await?;
        Ok::<_, std::io::Error>((content, metadata))
    };
    match read.await {
        Ok((content, metadata)) => vec![WatchMessage::Update {
            content,
            mtime: metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now()),
            timestamp: Utc::now(),
        }],
        Err(e) => {
            tracing::warn!(path = %target.display(), error = %e, "watched file unreadable");
            vec![WatchMessage::error(e)]
        }
    }
}

async fn directory_messages(
    target: &Path,
    paths: Vec<PathBuf>,
    options: &WatchOptions,
) -> Vec<WatchMessage> {
    let paths: Vec<PathBuf> = paths
        .into_iter()
        .filter(|p| {
            let relative = p.strip_prefix(target).unwrap_or(p);
            !should_ignore(relative, &options.ignore_patterns)
        })
        .collect();
    if paths.is_empty() {
        return Vec::new();
    }

    // Flood protection: collapse to a single change of the watched root.
    let paths = if paths.len() > options.flood_threshold {
        vec![target.to_path_buf()]
    } else {
        paths
    };

    let walk_root = target.to_path_buf();
    let extensions = options.extensions.clone();
    let files = match tokio::task::spawn_blocking(move || {
        listing::collect_files(&walk_root, &walk_root, &extensions)
    })
    .await
    {
        Ok(files) => files,
        Err(e) => return vec![WatchMessage::error(e)],
    };

    let timestamp = Utc::now();
    paths
        .iter()
        .map(|path| WatchMessage::DirectoryChange {
            files: files.clone(),
            changed_file: changed_file(target, path),
            event_type: if path.exists() {
                ChangeKind::Change
            } else {
                ChangeKind::Rename
            },
            timestamp,
        })
        .collect()
}

/// Path of `changed` relative to the watched directory, forward-slashed.
/// The directory itself is reported as `.`.
fn changed_file(target: &Path, changed: &Path) -> String {
    match changed.strip_prefix(target) {
        Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
        Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
        Err(_) => changed.to_string_lossy().to_string(),
    }
}

/// Check if a path should be ignored based on ignore patterns.
///
/// A path is ignored if any of its components match any ignore pattern exactly.
pub fn should_ignore(path: &Path, patterns: &[String]) -> bool {
    path.components().any(|component| match component {
        std::path::Component::Normal(name) => {
            let name = name.to_string_lossy();
            patterns.iter().any(|p| name == p.as_str())
        }
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const WAIT: Duration = Duration::from_secs(10);

    fn options() -> WatchOptions {
        WatchOptions::new(Duration::from_millis(50), vec!["txt".to_string()])
    }

    async fn next(rx: &mut mpsc::Receiver<WatchMessage>) -> Option<WatchMessage> {
        tokio::time::timeout(WAIT, rx.recv()).await.ok().flatten()
    }

    #[test]
    fn ignore_exact_components_only() {
        let patterns = vec![".git".to_string(), "target".to_string()];
        assert!(should_ignore(Path::new("/p/.git/HEAD"), &patterns));
        assert!(should_ignore(Path::new("/p/target/debug/x"), &patterns));
        assert!(!should_ignore(Path::new("/p/target2/file.txt"), &patterns));
        assert!(!should_ignore(Path::new("/p/notes/a.txt"), &patterns));
    }

    #[test]
    fn empty_patterns_ignore_nothing() {
        assert!(!should_ignore(Path::new("/project/.git/HEAD"), &[]));
    }

    #[test]
    fn changed_file_is_relative_to_target() {
        let root = Path::new("/srv/files");
        assert_eq!(changed_file(root, Path::new("/srv/files/b/c.txt")), "b/c.txt");
        assert_eq!(changed_file(root, root), ".");
    }

    #[test]
    fn messages_serialize_with_type_tag() {
        let json = serde_json::to_value(WatchMessage::DirectoryChange {
            files: Vec::new(),
            changed_file: "a.txt".into(),
            event_type: ChangeKind::Rename,
            timestamp: Utc::now(),
        })
        .unwrap();
        assert_eq!(json["type"], "directory-change");
        assert_eq!(json["changedFile"], "a.txt");
        assert_eq!(json["eventType"], "rename");

        let json = serde_json::to_value(WatchMessage::error("boom")).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["error"], "boom");
    }

    #[tokio::test]
    async fn flood_collapses_to_watched_root() {
        let dir = TempDir::new().unwrap();
        let mut opts = options();
        opts.flood_threshold = 3;
        let paths = (0..10).map(|i| dir.path().join(format!("f{i}.txt"))).collect();

        let messages = directory_messages(dir.path(), paths, &opts).await;
        assert_eq!(messages.len(), 1);
        match &messages[0] {
            WatchMessage::DirectoryChange { changed_file, .. } => assert_eq!(changed_file, "."),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn ignored_paths_produce_no_messages() {
        let dir = TempDir::new().unwrap();
        let paths = vec![dir.path().join(".git").join("index")];
        assert!(directory_messages(dir.path(), paths, &options()).await.is_empty());
    }

    #[tokio::test]
    async fn root_below_ignored_name_still_reports_changes() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("target").join("docs");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("a.txt"), "alpha").unwrap();

        let messages = directory_messages(&root, vec![root.join("a.txt")], &options()).await;
        assert_eq!(messages.len(), 1);
        match &messages[0] {
            WatchMessage::DirectoryChange { changed_file, files, .. } => {
                assert_eq!(changed_file, "a.txt");
                assert_eq!(files.len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }

        let ignored = vec![root.join("node_modules").join("x.txt")];
        assert!(directory_messages(&root, ignored, &options()).await.is_empty());
    }

    #[tokio::test]
    async fn file_update_decodes_invalid_utf8_lossily() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("latin1.txt");
        fs::write(&file, b"caf\xe9").unwrap();

        let messages = file_messages(&file, &[file.clone()]).await;
        match &messages[..] {
            [WatchMessage::Update { content, .. }] => assert_eq!(content, "caf\u{FFFD}"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_target_sends_error_and_closes() {
        let dir = TempDir::new().unwrap();
        let (mut rx, task) = open_channel(
            WatchKind::File,
            dir.path().join("missing.txt"),
            "missing.txt".into(),
            options(),
        );
        assert!(matches!(next(&mut rx).await, Some(WatchMessage::Error { .. })));
        assert!(next(&mut rx).await.is_none());
        task.await.unwrap();
    }

    #[tokio::test]
    async fn file_watch_sends_connected_then_update() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, "one").unwrap();

        let (mut rx, _task) = open_channel(WatchKind::File, file.clone(), "a.txt".into(), options());
        match next(&mut rx).await {
            Some(WatchMessage::Connected { path, .. }) => assert_eq!(path, "a.txt"),
            other => panic!("expected connected, got {other:?}"),
        }

        fs::write(&file, "two").unwrap();
        loop {
            match next(&mut rx).await {
                Some(WatchMessage::Update { content, .. }) if content == "two" => break,
                Some(WatchMessage::Update { .. }) => continue,
                other => panic!("expected update, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn directory_watch_reports_new_file() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::write(root.join("a.txt"), "a").unwrap();

        let (mut rx, _task) = open_channel(WatchKind::Directory, root.clone(), "".into(), options());
        assert!(matches!(next(&mut rx).await, Some(WatchMessage::Connected { .. })));

        fs::create_dir(root.join("b")).unwrap();
        fs::write(root.join("b").join("c.txt"), "c").unwrap();

        loop {
            match next(&mut rx).await {
                Some(WatchMessage::DirectoryChange { files, .. }) => {
                    if files.iter().any(|f| f.path == "b/c.txt") {
                        assert!(files.iter().any(|f| f.path == "a.txt"));
                        break;
                    }
                }
                other => panic!("expected directory-change, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn dropping_receiver_stops_the_watch() {
        let dir = TempDir::new().unwrap();
        let (mut rx, task) = open_channel(
            WatchKind::Directory,
            dir.path().to_path_buf(),
            "".into(),
            options(),
        );
        assert!(matches!(next(&mut rx).await, Some(WatchMessage::Connected { .. })));
        drop(rx);
        tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
    }
}
