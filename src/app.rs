use std::time::Instant;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::event::Event;
use crate::fs::backend::{Backend, WatchStream};
use crate::fs::entry::FileEntry;
use crate::fs::tree::TreeState;
use crate::fs::watcher::{WatchKind, WatchMessage};
use crate::search::{ScrollAction, SearchState, Viewport};
use crate::sync::{self, Reconciled, Selection};

/// One open watch channel, owned by the session.
///
/// The forwarding task stops when the session is closed, which drops the
/// stream and with it the underlying connection.
pub struct WatchSession {
    pub kind: WatchKind,
    /// Path the channel was opened for, as sent to the backend.
    pub target: String,
    pub id: u64,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl WatchSession {
    /// Start forwarding `stream` into the event queue.
    pub fn spawn(
        kind: WatchKind,
        target: String,
        id: u64,
        mut stream: WatchStream,
        events: mpsc::UnboundedSender<Event>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    _ = token.cancelled() => return,
                    next = stream.next() => next,
                };
                let closed = match next {
                    Some(Ok(WatchMessage::Error { error, timestamp })) => {
                        let _ = events.send(Event::Watch {
                            kind,
                            session: id,
                            message: WatchMessage::Error {
                                error: error.clone(),
                                timestamp,
                            },
                        });
                        Some(error)
                    }
                    Some(Ok(message)) => {
                        if events
                            .send(Event::Watch {
                                kind,
                                session: id,
                                message,
                            })
                            .is_err()
                        {
                            return;
                        }
                        continue;
                    }
                    Some(Err(e)) => Some(e.to_string()),
                    None => None,
                };
                let _ = events.send(Event::WatchClosed {
                    kind,
                    session: id,
                    error: closed,
                });
                return;
            }
        });

        Self {
            kind,
            target,
            id,
            cancel,
            task: Some(task),
        }
    }

    /// Stop the channel. Safe to call more than once.
    pub fn close(&mut self) {
        if self.task.take().is_some() {
            self.cancel.cancel();
            tracing::debug!(kind = ?self.kind, target = %self.target, "watch session closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.task.is_none()
    }
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// State of one browsing session over one backend.
pub struct App {
    pub backend: Backend,
    pub tree_state: TreeState,
    pub selection: Selection,
    pub search: SearchState,
    pub viewport: Viewport,
    /// Scroll planned by the last search navigation, not yet taken.
    pending_scroll: Option<ScrollAction>,
    pub status_message: Option<String>,
    pub should_quit: bool,
    /// Keep file and directory watches open alongside the selection.
    pub follow: bool,
    file_watch: Option<WatchSession>,
    /// Relative path of the file the file watch belongs to.
    watched_file: Option<String>,
    dir_watch: Option<WatchSession>,
    next_session: u64,
    events: mpsc::UnboundedSender<Event>,
}

impl App {
    pub fn new(backend: Backend, events: mpsc::UnboundedSender<Event>) -> Self {
        Self {
            backend,
            tree_state: TreeState::default(),
            selection: Selection::default(),
            search: SearchState::default(),
            viewport: Viewport::default(),
            pending_scroll: None,
            status_message: None,
            should_quit: false,
            follow: false,
            file_watch: None,
            watched_file: None,
            dir_watch: None,
            next_session: 0,
            events,
        }
    }

    pub fn quit(&mut self) {
        self.should_quit = true;
    }

    pub fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = Some(message.into());
    }

    pub fn selected_entry(&self) -> Option<&FileEntry> {
        self.tree_state.entry(self.selection.path.as_deref()?)
    }

    pub fn selected_content(&self) -> &str {
        self.selected_entry().map_or("", |e| e.content.as_str())
    }

    pub fn set_search_query(&mut self, query: &str) {
        let text = self.selected_content().to_string();
        self.search.set_query(query, &text);
        self.reveal_current_match(Instant::now());
    }

    pub fn search_next(&mut self) {
        if self.search.next().is_some() {
            self.reveal_current_match(Instant::now());
        }
    }

    pub fn search_previous(&mut self) {
        if self.search.previous().is_some() {
            self.reveal_current_match(Instant::now());
        }
    }

    /// Plan scrolling the focused match into view.
    pub fn reveal_current_match(&mut self, now: Instant) -> Option<ScrollAction> {
        let range = self.search.current_match()?;
        let text = self
            .selection
            .path
            .as_deref()
            .and_then(|p| self.tree_state.entry(p))
            .map_or("", |e| e.content.as_str());
        let action = self.viewport.scroll_to(text, &range, now);
        self.pending_scroll = Some(action);
        Some(action)
    }

    pub fn take_scroll(&mut self) -> Option<ScrollAction> {
        self.pending_scroll.take()
    }

    // ── Enumeration & reconciliation ────────────────────────────────────────

    /// Re-enumerate the backend and reconcile. On failure the previous tree
    /// and selection stay as they were.
    pub async fn refresh(&mut self) -> Result<Reconciled> {
        let entries = self.backend.enumerate().await?;
        tracing::info!(backend = self.backend.name(), count = entries.len(), "enumerated");
        let outcome = sync::apply_enumeration(&mut self.tree_state, &mut self.selection, entries);
        self.after_reconcile(&outcome).await;
        Ok(outcome)
    }

    /// Expand or collapse a directory, then reconcile.
    pub async fn toggle(&mut self, path: &str) -> Option<Reconciled> {
        let outcome = sync::apply_toggle(&mut self.tree_state, &mut self.selection, path)?;
        self.after_reconcile(&outcome).await;
        Some(outcome)
    }

    async fn after_reconcile(&mut self, outcome: &Reconciled) {
        if let Some(path) = outcome.load_target().map(str::to_string) {
            if let Err(e) = self.load(&path).await {
                tracing::warn!(path = %path, error = %e, "load failed");
                self.set_status_message(format!("Failed to load {path}: {e}"));
            }
        }
        match outcome {
            Reconciled::Cleared => {
                self.close_file_watch();
                self.viewport.reset();
            }
            Reconciled::First { .. } => self.viewport.reset(),
            Reconciled::Kept { .. } => {}
        }
        self.sync_search();
        self.sync_file_watch().await;
    }

    /// Read `path` from the backend into its entry.
    async fn load(&mut self, path: &str) -> Result<()> {
        let entry = self
            .tree_state
            .entry(path)
            .cloned()
            .ok_or_else(|| AppError::NotFound(path.into()))?;
        let content = self.backend.read(&entry).await?;
        if let Some(entry) = self.tree_state.entry_mut(path) {
            entry.content = content;
        }
        Ok(())
    }

    /// Select a visible file and load it. If loading fails the previous
    /// selection is kept.
    pub async fn select(&mut self, path: &str) -> Result<()> {
        let index = self
            .tree_state
            .find_index_by_path(path)
            .ok_or_else(|| AppError::NotFound(path.into()))?;
        self.load(path).await?;
        if !self.selection.is_selected(path) {
            self.viewport.reset();
        }
        self.selection.select(path, index);
        let query = self.search.query().to_string();
        let text = self.selected_content().to_string();
        self.search.set_query(&query, &text);
        self.reveal_current_match(Instant::now());
        self.sync_file_watch().await;
        Ok(())
    }

    fn sync_search(&mut self) {
        let text = self.selected_content().to_string();
        self.search.set_text(&text);
    }

    // ── Watch sessions ──────────────────────────────────────────────────────

    fn next_session_id(&mut self) -> u64 {
        self.next_session += 1;
        self.next_session
    }

    /// Open the directory watch, replacing any open one. Returns `false`
    /// when the backend cannot watch.
    pub async fn open_directory_watch(&mut self) -> Result<bool> {
        let Some(target) = self.backend.watch_target(None) else {
            return Ok(false);
        };
        if let Some(mut old) = self.dir_watch.take() {
            old.close();
        }
        let Some(stream) = self.backend.watch(WatchKind::Directory, &target).await? else {
            return Ok(false);
        };
        let id = self.next_session_id();
        self.dir_watch = Some(WatchSession::spawn(
            WatchKind::Directory,
            target,
            id,
            stream,
            self.events.clone(),
        ));
        Ok(true)
    }

    /// Open a file watch for `path`, replacing any open one.
    pub async fn open_file_watch(&mut self, path: &str) -> Result<bool> {
        let entry = self
            .tree_state
            .entry(path)
            .ok_or_else(|| AppError::NotFound(path.into()))?;
        let Some(target) = self.backend.watch_target(Some(entry)) else {
            return Ok(false);
        };
        self.close_file_watch();
        let Some(stream) = self.backend.watch(WatchKind::File, &target).await? else {
            return Ok(false);
        };
        let id = self.next_session_id();
        self.file_watch = Some(WatchSession::spawn(
            WatchKind::File,
            target,
            id,
            stream,
            self.events.clone(),
        ));
        self.watched_file = Some(path.to_string());
        Ok(true)
    }

    fn close_file_watch(&mut self) {
        if let Some(mut session) = self.file_watch.take() {
            session.close();
        }
        self.watched_file = None;
    }

    /// Close every open watch session.
    pub fn close_watches(&mut self) {
        self.close_file_watch();
        if let Some(mut session) = self.dir_watch.take() {
            session.close();
        }
    }

    /// With `follow` on, keep the file watch on the selected file.
    async fn sync_file_watch(&mut self) {
        if !self.follow || !self.backend.supports_watch() {
            return;
        }
        let Some(path) = self.selection.path.clone() else {
            return;
        };
        if self.watched_file.as_deref() == Some(path.as_str()) && self.file_watch.is_some() {
            return;
        }
        if let Err(e) = self.open_file_watch(&path).await {
            tracing::warn!(path = %path, error = %e, "could not watch file");
        }
    }

    pub fn watch_session(&self, kind: WatchKind) -> Option<&WatchSession> {
        let session = match kind {
            WatchKind::File => self.file_watch.as_ref(),
            WatchKind::Directory => self.dir_watch.as_ref(),
        };
        session.filter(|s| !s.is_closed())
    }

    fn is_current_session(&self, kind: WatchKind, session: u64) -> bool {
        self.watch_session(kind).is_some_and(|s| s.id == session)
    }

    /// Apply one message from a watch channel. Messages from sessions that
    /// were already replaced are dropped.
    pub async fn handle_watch(&mut self, kind: WatchKind, session: u64, message: WatchMessage) {
        if !self.is_current_session(kind, session) {
            tracing::trace!(?kind, session, "dropping message from stale watch");
            return;
        }

        match message {
            WatchMessage::Connected { message, path, .. } => {
                tracing::info!(?kind, path = %path, "{message}");
            }
            WatchMessage::Update { content, .. } => {
                let Some(path) = self.watched_file.clone() else {
                    return;
                };
                if !self.selection.is_selected(&path) {
                    return;
                }
                if let Some(entry) = self.tree_state.entry_mut(&path) {
                    entry.content = content;
                }
                self.sync_search();
                tracing::debug!(path = %path, "file content updated");
            }
            WatchMessage::DirectoryChange {
                files,
                changed_file,
                event_type,
                ..
            } => {
                tracing::debug!(changed = %changed_file, ?event_type, "directory changed");
                let entries = files.into_iter().map(FileEntry::from).collect();
                let outcome =
                    sync::apply_enumeration(&mut self.tree_state, &mut self.selection, entries);
                self.after_reconcile(&outcome).await;
            }
            WatchMessage::Error { error, .. } => {
                tracing::warn!(?kind, error = %error, "watch error");
                self.set_status_message(format!("Watch error: {error}"));
            }
        }
    }

    /// A channel ended by itself. It is not reopened.
    pub fn handle_watch_closed(&mut self, kind: WatchKind, session: u64, error: Option<String>) {
        if !self.is_current_session(kind, session) {
            return;
        }
        match &error {
            Some(error) => tracing::warn!(?kind, error = %error, "watch channel failed"),
            None => tracing::info!(?kind, "watch channel ended"),
        }
        match kind {
            WatchKind::File => self.close_file_watch(),
            WatchKind::Directory => {
                if let Some(mut session) = self.dir_watch.take() {
                    session.close();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventHandler;
    use crate::fs::backend::{HandleBackend, SnapshotBackend};
    use crate::fs::listing::ListedFile;
    use chrono::Utc;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn snapshot_app(files: &[(&str, &str)]) -> (App, EventHandler) {
        let events = EventHandler::new();
        let backend = Backend::Snapshot(SnapshotBackend::from_files(files.iter().copied()));
        (App::new(backend, events.sender()), events)
    }

    fn listed(path: &str) -> ListedFile {
        ListedFile {
            name: path.rsplit('/').next().unwrap().to_string(),
            path: path.to_string(),
            full_path: format!("/srv/{path}"),
            size: 1,
            mtime: Utc::now(),
        }
    }

    fn stream_of(messages: Vec<crate::error::Result<WatchMessage>>) -> WatchStream {
        futures::stream::iter(messages).boxed()
    }

    fn pending_stream() -> WatchStream {
        futures::stream::pending::<crate::error::Result<WatchMessage>>().boxed()
    }

    async fn spawn_server(root: &std::path::Path) -> String {
        use crate::config::{AppConfig, WatcherConfig};
        use crate::fs::guard::PathGuard;
        use crate::server::gate::AccessGate;
        use crate::server::{router, ServerState};

        let config = AppConfig {
            watcher: WatcherConfig {
                enabled: Some(true),
                debounce_ms: Some(50),
            },
            ..Default::default()
        };
        let state = ServerState::new(PathGuard::new(root), AccessGate::open(), config);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn refresh_selects_first_file_and_loads_it() {
        let (mut app, _events) = snapshot_app(&[("r/a.txt", "alpha"), ("r/b/c.txt", "charlie")]);
        let outcome = app.refresh().await.unwrap();
        assert_eq!(
            outcome,
            Reconciled::First {
                path: "r/b/c.txt".into()
            }
        );
        assert_eq!(app.selected_content(), "charlie");
    }

    #[tokio::test]
    async fn select_loads_content_and_reindexes_search() {
        let (mut app, _events) = snapshot_app(&[("r/a.txt", "log\nLOG\nlog"), ("r/b/c.txt", "x")]);
        app.refresh().await.unwrap();
        app.set_search_query("log");
        assert!(app.search.matches().is_empty());

        app.select("r/a.txt").await.unwrap();
        assert_eq!(app.selection.index, Some(1));
        assert_eq!(app.search.matches().len(), 3);
        assert_eq!(app.search.current(), Some(0));
    }

    #[tokio::test]
    async fn failed_load_keeps_previous_selection() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("notes");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("a.txt"), "alpha").unwrap();
        fs::write(root.join("b.txt"), "bravo").unwrap();

        let events = EventHandler::new();
        let backend = Backend::Handle(HandleBackend::open(&root, vec!["txt".into()]).unwrap());
        let mut app = App::new(backend, events.sender());
        app.refresh().await.unwrap();
        assert_eq!(app.selection.path.as_deref(), Some("notes/a.txt"));

        fs::remove_file(root.join("b.txt")).unwrap();
        let err = app.select("notes/b.txt").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(app.selection.path.as_deref(), Some("notes/a.txt"));
        assert_eq!(app.selected_content(), "alpha");
    }

    #[tokio::test]
    async fn failed_enumeration_keeps_tree() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("notes");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("a.txt"), "alpha").unwrap();

        let events = EventHandler::new();
        let backend = Backend::Handle(HandleBackend::open(&root, vec!["txt".into()]).unwrap());
        let mut app = App::new(backend, events.sender());
        app.refresh().await.unwrap();

        fs::remove_dir_all(&root).unwrap();
        assert!(app.refresh().await.is_err());
        assert_eq!(app.tree_state.flat_items.len(), 1);
        assert_eq!(app.selection.path.as_deref(), Some("notes/a.txt"));
    }

    #[tokio::test]
    async fn toggle_reconciles_selection() {
        let (mut app, _events) = snapshot_app(&[("r/a.txt", "alpha"), ("r/b/c.txt", "charlie")]);
        app.refresh().await.unwrap();
        let outcome = app.toggle("r/b").await.unwrap();
        assert_eq!(
            outcome,
            Reconciled::First {
                path: "r/a.txt".into()
            }
        );
        assert_eq!(app.selected_content(), "alpha");
        assert!(app.toggle("r/a.txt").await.is_none());
    }

    #[tokio::test]
    async fn directory_change_removing_selection_moves_to_first() {
        let (mut app, _events) = snapshot_app(&[("a.txt", "alpha"), ("b/c.txt", "charlie")]);
        app.refresh().await.unwrap();
        app.select("a.txt").await.unwrap();

        let stream = pending_stream();
        app.dir_watch = Some(WatchSession::spawn(
            WatchKind::Directory,
            String::new(),
            7,
            stream,
            app.events.clone(),
        ));

        let message = WatchMessage::DirectoryChange {
            files: vec![listed("b/c.txt")],
            changed_file: "a.txt".into(),
            event_type: crate::fs::watcher::ChangeKind::Rename,
            timestamp: Utc::now(),
        };
        app.handle_watch(WatchKind::Directory, 7, message).await;

        assert_eq!(app.selection.path.as_deref(), Some("b/c.txt"));
        assert_eq!(app.selection.index, Some(0));
        // Snapshot backend still knows the content.
        assert_eq!(app.selected_content(), "charlie");
    }

    #[tokio::test]
    async fn stale_session_messages_are_ignored() {
        let (mut app, _events) = snapshot_app(&[("a.txt", "alpha")]);
        app.refresh().await.unwrap();
        let message = WatchMessage::DirectoryChange {
            files: Vec::new(),
            changed_file: "a.txt".into(),
            event_type: crate::fs::watcher::ChangeKind::Rename,
            timestamp: Utc::now(),
        };
        app.handle_watch(WatchKind::Directory, 99, message).await;
        assert_eq!(app.selection.path.as_deref(), Some("a.txt"));
    }

    #[tokio::test]
    async fn file_update_replaces_selected_content() {
        let (mut app, _events) = snapshot_app(&[("a.txt", "log")]);
        app.refresh().await.unwrap();
        app.set_search_query("log");
        app.file_watch = Some(WatchSession::spawn(
            WatchKind::File,
            "a.txt".into(),
            3,
            pending_stream(),
            app.events.clone(),
        ));
        app.watched_file = Some("a.txt".into());

        let update = WatchMessage::Update {
            content: "log log".into(),
            mtime: Utc::now(),
            timestamp: Utc::now(),
        };
        app.handle_watch(WatchKind::File, 3, update).await;
        assert_eq!(app.selected_content(), "log log");
        assert_eq!(app.search.matches().len(), 2);
    }

    #[tokio::test]
    async fn session_forwards_messages_then_reports_end() {
        let mut events = EventHandler::new();
        let connected = WatchMessage::Connected {
            message: "Watching directory for changes".into(),
            path: String::new(),
            timestamp: Utc::now(),
        };
        let _session = WatchSession::spawn(
            WatchKind::Directory,
            String::new(),
            1,
            stream_of(vec![Ok(connected)]),
            events.sender(),
        );

        let first = tokio::time::timeout(Duration::from_secs(5), events.next())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            first,
            Event::Watch {
                session: 1,
                message: WatchMessage::Connected { .. },
                ..
            }
        ));
        let second = tokio::time::timeout(Duration::from_secs(5), events.next())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(second, Event::WatchClosed { error: None, .. }));
    }

    #[tokio::test]
    async fn session_stops_after_error_message() {
        let mut events = EventHandler::new();
        let _session = WatchSession::spawn(
            WatchKind::File,
            "a.txt".into(),
            2,
            stream_of(vec![
                Ok(WatchMessage::Error {
                    error: "gone".into(),
                    timestamp: Utc::now(),
                }),
                Ok(WatchMessage::Update {
                    content: "never".into(),
                    mtime: Utc::now(),
                    timestamp: Utc::now(),
                }),
            ]),
            events.sender(),
        );

        let first = events.next().await.unwrap();
        assert!(matches!(first, Event::Watch { message: WatchMessage::Error { .. }, .. }));
        let second = events.next().await.unwrap();
        assert!(matches!(second, Event::WatchClosed { error: Some(e), .. } if e == "gone"));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(events.try_next().is_none());
    }

    #[tokio::test]
    async fn close_is_idempotent_and_silences_the_session() {
        let mut events = EventHandler::new();
        let mut session = WatchSession::spawn(
            WatchKind::Directory,
            String::new(),
            5,
            pending_stream(),
            events.sender(),
        );
        session.close();
        session.close();
        assert!(session.is_closed());
        drop(session);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(events.try_next().is_none());
    }

    #[tokio::test]
    async fn following_server_moves_off_deleted_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "alpha").unwrap();
        fs::create_dir(dir.path().join("b")).unwrap();
        fs::write(dir.path().join("b").join("c.txt"), "charlie").unwrap();
        let base = spawn_server(dir.path()).await;

        let mut events = EventHandler::new();
        let backend = Backend::Server(
            crate::fs::backend::ServerBackend::new(&base, None, Duration::from_secs(10)).unwrap(),
        );
        let mut app = App::new(backend, events.sender());
        app.follow = true;
        app.refresh().await.unwrap();
        app.select("a.txt").await.unwrap();
        assert_eq!(app.selected_content(), "alpha");
        assert!(app.open_directory_watch().await.unwrap());

        // Wait until the directory watch is live before deleting.
        loop {
            let event = tokio::time::timeout(Duration::from_secs(10), events.next())
                .await
                .unwrap()
                .unwrap();
            if let Event::Watch {
                kind: WatchKind::Directory,
                message: WatchMessage::Connected { .. },
                ..
            } = event
            {
                break;
            }
        }

        fs::remove_file(dir.path().join("a.txt")).unwrap();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while app.selection.path.as_deref() != Some("b/c.txt") {
            let event = tokio::time::timeout_at(deadline, events.next())
                .await
                .unwrap()
                .unwrap();
            match event {
                Event::Watch {
                    kind,
                    session,
                    message,
                } => app.handle_watch(kind, session, message).await,
                Event::WatchClosed {
                    kind,
                    session,
                    error,
                } => app.handle_watch_closed(kind, session, error),
                _ => {}
            }
        }
        assert_eq!(app.selection.index, Some(0));
        assert_eq!(app.selected_content(), "charlie");
        app.close_watches();
        assert!(app.watch_session(WatchKind::Directory).is_none());
    }

    #[tokio::test]
    async fn search_navigation_plans_scrolls_per_document() {
        let long: String = (0..100).map(|i| format!("line {i}\n")).collect();
        let (mut app, _events) = snapshot_app(&[("a.txt", long.as_str()), ("b.txt", "line 1")]);
        app.refresh().await.unwrap();
        assert_eq!(app.selection.path.as_deref(), Some("a.txt"));

        app.set_search_query("line 60");
        let Some(ScrollAction::Smooth { top, generation }) = app.take_scroll() else {
            panic!("expected a smooth scroll");
        };
        assert!(app.viewport.settle(top, generation));
        assert!(app.viewport.scroll_top > 0.0);
        assert!(app.take_scroll().is_none());

        // A single match stays focused and is already in view.
        app.search_next();
        assert_eq!(app.take_scroll(), Some(ScrollAction::Stay));

        app.select("b.txt").await.unwrap();
        assert_eq!(app.viewport.scroll_top, 0.0);
        assert!(app.search.matches().is_empty());
    }

    #[tokio::test]
    async fn watches_are_unavailable_without_server_backend() {
        let (mut app, _events) = snapshot_app(&[("a.txt", "alpha")]);
        app.refresh().await.unwrap();
        assert!(!app.open_directory_watch().await.unwrap());
        assert!(!app.open_file_watch("a.txt").await.unwrap());
        assert!(app.watch_session(WatchKind::File).is_none());
    }
}
