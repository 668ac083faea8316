pub mod gate;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio_stream::wrappers::ReceiverStream;

use crate::config::AppConfig;
use crate::error::{AppError, ErrorBody, Result};
use crate::fs::guard::PathGuard;
use crate::fs::listing::{self, FileContent, Listing};
use crate::fs::watcher::{self, WatchKind, WatchOptions};
use gate::{AccessGate, Environment, GateStatus};

/// Interval between SSE keep-alive comments.
const KEEP_ALIVE: Duration = Duration::from_secs(15);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::SecurityRejection(_) | AppError::BackendUnavailable(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::NotADirectory(_) | AppError::InvalidPath(_) => StatusCode::BAD_REQUEST,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ErrorBody::from(&self))).into_response()
    }
}

/// Shared state of every handler.
#[derive(Clone)]
pub struct ServerState {
    guard: Arc<PathGuard>,
    gate: Arc<AccessGate>,
    config: Arc<AppConfig>,
}

impl ServerState {
    pub fn new(guard: PathGuard, gate: AccessGate, config: AppConfig) -> Self {
        Self {
            guard: Arc::new(guard),
            gate: Arc::new(gate),
            config: Arc::new(config),
        }
    }

    fn require_access(&self, headers: &HeaderMap) -> Result<()> {
        let decision = self.gate.evaluate(Some(headers));
        if decision.allowed {
            return Ok(());
        }
        tracing::warn!(
            reason = %decision.reasons.join("; "),
            confidence = ?decision.confidence,
            "local file system access denied"
        );
        Err(AppError::BackendUnavailable(
            "Local file system access is disabled".to_string(),
        ))
    }

    fn resolve(&self, raw: &str) -> Result<PathBuf> {
        self.guard.resolve(raw).map_err(|reason| {
            tracing::warn!(path = raw, %reason, "invalid or unsafe path");
            AppError::SecurityRejection(raw.to_string())
        })
    }

    /// Resolve an optional path, defaulting to the root.
    fn resolve_or_root(&self, raw: Option<&str>) -> Result<PathBuf> {
        match raw.filter(|p| !p.is_empty()) {
            Some(raw) => self.resolve(raw),
            None => Ok(self.guard.root().to_path_buf()),
        }
    }

    fn watch_options(&self) -> WatchOptions {
        WatchOptions::new(
            Duration::from_millis(self.config.debounce_ms()),
            self.config.extensions(),
        )
    }
}

#[derive(Debug, Deserialize)]
struct PathQuery {
    path: Option<String>,
}

impl PathQuery {
    fn required(&self) -> Result<&str> {
        self.path
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| AppError::InvalidPath("Path parameter required".to_string()))
    }
}

/// Build the HTTP routes.
pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/api/files", get(list_files))
        .route("/api/files/status", get(status))
        .route("/api/file-content", get(file_content))
        .route("/api/file-watch", get(file_watch))
        .route("/api/directory-watch", get(directory_watch))
        .with_state(state)
}

/// Serve until Ctrl-C.
pub async fn serve(config: AppConfig, root: PathBuf) -> Result<()> {
    let guard = PathGuard::new(&root);
    let gate = AccessGate::new(Environment::detect(&config));
    let listener = TcpListener::bind(config.bind()).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        root = %guard.root().display(),
        "server listening"
    );

    let state = ServerState::new(guard, gate, config);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}

async fn list_files(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Query(query): Query<PathQuery>,
) -> Result<Json<Listing>> {
    state.require_access(&headers)?;
    let dir = state.resolve_or_root(query.path.as_deref())?;
    let listing = listing::list_directory(
        dir,
        state.config.extensions(),
        state.config.request_timeout(),
    )
    .await?;
    tracing::info!(directory = %listing.directory, count = listing.files.len(), "file list loaded");
    Ok(Json(listing))
}

async fn file_content(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Query(query): Query<PathQuery>,
) -> Result<Json<FileContent>> {
    state.require_access(&headers)?;
    let requested = query.required()?;
    let path = state.resolve(requested)?;
    let content = listing::read_file(path.clone(), requested.to_string(), state.config.request_timeout())
        .await
        .inspect_err(|e| tracing::error!(path = %path.display(), error = %e, "error reading file"))?;
    tracing::info!(path = %path.display(), size = content.size, "file content loaded");
    Ok(Json(content))
}

async fn status(State(state): State<ServerState>, headers: HeaderMap) -> Json<GateStatus> {
    let status = state.gate.status(&headers, state.guard.root());
    tracing::info!(
        available = status.available,
        confidence = ?status.confidence,
        environment = %status.environment,
        "server mode status checked"
    );
    Json(status)
}

async fn file_watch(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Query(query): Query<PathQuery>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>>> {
    state.require_access(&headers)?;
    let requested = query.required()?;
    let target = state.resolve(requested)?;
    watch_stream(&state, WatchKind::File, target, requested.to_string())
}

async fn directory_watch(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Query(query): Query<PathQuery>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>>> {
    state.require_access(&headers)?;
    let target = state.resolve_or_root(query.path.as_deref())?;
    let requested = query.path.clone().unwrap_or_default();
    watch_stream(&state, WatchKind::Directory, target, requested)
}

fn watch_stream(
    state: &ServerState,
    kind: WatchKind,
    target: PathBuf,
    requested: String,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>>> {
    if !state.config.watcher_enabled() {
        return Err(AppError::BackendUnavailable("watching is disabled".to_string()));
    }
    // Dropping the SSE body drops the receiver, which ends the watch task.
    let (rx, _task) = watcher::open_channel(kind, target, requested, state.watch_options());
    let stream = ReceiverStream::new(rx).map(|message| Event::default().json_data(&message));
    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ServerConfig, WatcherConfig};
    use crate::fs::backend::{Backend, ServerBackend};
    use crate::fs::watcher::WatchMessage;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const WAIT: Duration = Duration::from_secs(10);

    fn setup_root() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "alpha").unwrap();
        fs::create_dir(dir.path().join("b")).unwrap();
        fs::write(dir.path().join("b").join("c.txt"), "charlie").unwrap();
        fs::write(dir.path().join("b").join("skip.bin"), "x").unwrap();
        dir
    }

    fn test_config() -> AppConfig {
        AppConfig {
            server: ServerConfig {
                request_timeout_ms: Some(5_000),
                ..Default::default()
            },
            watcher: WatcherConfig {
                enabled: Some(true),
                debounce_ms: Some(50),
            },
            ..Default::default()
        }
    }

    fn closed_gate() -> AccessGate {
        AccessGate::new(Environment {
            development: false,
            hostname: "web-01".into(),
            has_loopback: false,
            enable_local_fs: Some(false),
        })
    }

    async fn spawn_server(root: &Path, gate: AccessGate) -> String {
        let state = ServerState::new(PathGuard::new(root), gate, test_config());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn get_json(url: &str) -> (u16, serde_json::Value) {
        let response = reqwest::get(url).await.unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }

    #[test]
    fn error_statuses() {
        let status = |e: AppError| e.into_response().status();
        assert_eq!(status(AppError::SecurityRejection("x".into())), StatusCode::FORBIDDEN);
        assert_eq!(status(AppError::BackendUnavailable("x".into())), StatusCode::FORBIDDEN);
        assert_eq!(status(AppError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status(AppError::NotADirectory("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status(AppError::Timeout(5)), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            status(AppError::Channel("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn lists_text_files_under_root() {
        let dir = setup_root();
        let base = spawn_server(dir.path(), AccessGate::open()).await;

        let (status, body) = get_json(&format!("{base}/api/files")).await;
        assert_eq!(status, 200);
        let paths: Vec<&str> = body["files"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["path"].as_str().unwrap())
            .collect();
        assert_eq!(paths, vec!["a.txt", "b/c.txt"]);
        assert!(body["files"][0]["fullPath"].as_str().unwrap().ends_with("a.txt"));

        let (status, body) = get_json(&format!("{base}/api/files?path=b")).await;
        assert_eq!(status, 200);
        assert_eq!(body["files"][0]["path"], "c.txt");
    }

    #[tokio::test]
    async fn listing_error_statuses() {
        let dir = setup_root();
        let base = spawn_server(dir.path(), AccessGate::open()).await;

        let (status, body) = get_json(&format!("{base}/api/files?path=../etc")).await;
        assert_eq!(status, 403);
        assert_eq!(body["code"], "security_rejection");

        let (status, _) = get_json(&format!("{base}/api/files?path=nope")).await;
        assert_eq!(status, 404);

        let (status, body) = get_json(&format!("{base}/api/files?path=a.txt")).await;
        assert_eq!(status, 400);
        assert_eq!(body["code"], "not_a_directory");
    }

    #[tokio::test]
    async fn file_content_echoes_requested_path() {
        let dir = setup_root();
        let base = spawn_server(dir.path(), AccessGate::open()).await;

        let (status, body) = get_json(&format!("{base}/api/file-content?path=b/c.txt")).await;
        assert_eq!(status, 200);
        assert_eq!(body["content"], "charlie");
        assert_eq!(body["size"], 7);
        assert_eq!(body["path"], "b/c.txt");

        let (status, _) = get_json(&format!("{base}/api/file-content")).await;
        assert_eq!(status, 400);
        let (status, _) = get_json(&format!("{base}/api/file-content?path=gone.txt")).await;
        assert_eq!(status, 404);
        let (status, _) = get_json(&format!("{base}/api/file-content?path=~/.ssh/id_rsa")).await;
        assert_eq!(status, 403);
    }

    #[tokio::test]
    async fn closed_gate_rejects_every_file_endpoint() {
        let dir = setup_root();
        let base = spawn_server(dir.path(), closed_gate()).await;

        for route in ["files", "file-content?path=a.txt", "file-watch?path=a.txt", "directory-watch"] {
            let (status, body) = get_json(&format!("{base}/api/{route}")).await;
            assert_eq!(status, 403, "{route}");
            assert_eq!(body["code"], "backend_unavailable", "{route}");
        }

        let (status, body) = get_json(&format!("{base}/api/files/status")).await;
        assert_eq!(status, 200);
        assert_eq!(body["available"], false);
        assert_eq!(body["confidence"], "high");
    }

    #[tokio::test]
    async fn server_backend_enumerates_and_reads() {
        let dir = setup_root();
        let base = spawn_server(dir.path(), AccessGate::open()).await;
        let backend = Backend::Server(ServerBackend::new(&base, None, WAIT).unwrap());

        let entries = backend.enumerate().await.unwrap();
        let paths: Vec<&str> = entries.iter().map(|e| e.relative_path.as_str()).collect();
        assert_eq!(paths, vec!["a.txt", "b/c.txt"]);
        assert_eq!(backend.read(&entries[1]).await.unwrap(), "charlie");
    }

    #[tokio::test]
    async fn server_backend_surfaces_typed_errors() {
        let dir = setup_root();
        let base = spawn_server(dir.path(), AccessGate::open()).await;

        let escaping = Backend::Server(ServerBackend::new(&base, Some("../..".into()), WAIT).unwrap());
        assert!(matches!(
            escaping.enumerate().await,
            Err(AppError::SecurityRejection(_))
        ));

        let backend = Backend::Server(ServerBackend::new(&base, None, WAIT).unwrap());
        let mut entries = backend.enumerate().await.unwrap();
        fs::remove_file(dir.path().join("a.txt")).unwrap();
        assert!(matches!(
            backend.read(&entries.remove(0)).await,
            Err(AppError::NotFound(_))
        ));

        let closed = spawn_server(dir.path(), closed_gate()).await;
        let backend = Backend::Server(ServerBackend::new(&closed, None, WAIT).unwrap());
        assert!(matches!(
            backend.enumerate().await,
            Err(AppError::BackendUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn directory_watch_streams_changes() {
        let dir = setup_root();
        let base = spawn_server(dir.path(), AccessGate::open()).await;
        let backend = Backend::Server(ServerBackend::new(&base, None, WAIT).unwrap());

        let target = backend.watch_target(None).unwrap();
        let mut stream = backend
            .watch(WatchKind::Directory, &target)
            .await
            .unwrap()
            .unwrap();
        let first = tokio::time::timeout(WAIT, stream.next()).await.unwrap();
        assert!(matches!(first, Some(Ok(WatchMessage::Connected { .. }))));

        fs::write(dir.path().join("new.txt"), "fresh").unwrap();
        loop {
            let message = tokio::time::timeout(WAIT, stream.next()).await.unwrap();
            match message {
                Some(Ok(WatchMessage::DirectoryChange { files, .. })) => {
                    if files.iter().any(|f| f.path == "new.txt") {
                        break;
                    }
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn file_watch_streams_updates() {
        let dir = setup_root();
        let base = spawn_server(dir.path(), AccessGate::open()).await;
        let backend = Backend::Server(ServerBackend::new(&base, None, WAIT).unwrap());

        let mut stream = backend.watch(WatchKind::File, "a.txt").await.unwrap().unwrap();
        let first = tokio::time::timeout(WAIT, stream.next()).await.unwrap();
        match first {
            Some(Ok(WatchMessage::Connected { path, message, .. })) => {
                assert_eq!(path, "a.txt");
                assert_eq!(message, "Watching file for changes");
            }
            other => panic!("unexpected {other:?}"),
        }

        fs::write(dir.path().join("a.txt"), "edited").unwrap();
        loop {
            let message = tokio::time::timeout(WAIT, stream.next()).await.unwrap();
            match message {
                Some(Ok(WatchMessage::Update { content, .. })) if content == "edited" => break,
                Some(Ok(WatchMessage::Update { .. })) => continue,
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn file_watch_rejects_unsafe_paths_before_streaming() {
        let dir = setup_root();
        let base = spawn_server(dir.path(), AccessGate::open()).await;
        let backend = Backend::Server(ServerBackend::new(&base, None, WAIT).unwrap());
        assert!(matches!(
            backend.watch(WatchKind::File, "../secret.txt").await,
            Err(AppError::SecurityRejection(_))
        ));
    }
}
