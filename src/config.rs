//! Application configuration: TOML file loading, CLI overrides, and defaults.
//!
//! Resolution order (first found wins, values merge/override):
//! 1. CLI flags (`--config`, `--root`, `--bind`, etc.), which also read
//!    `FILES_DIRECTORY` and `ENABLE_LOCAL_FS` from the environment
//! 2. `$TEXT_VIEWER_CONFIG` environment variable (path to config file)
//! 3. Project-local `.text-viewer.toml` in the current working directory
//! 4. Global `~/.config/text-viewer/config.toml`
//! 5. Built-in defaults

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

// ── Section configs ──────────────────────────────────────────────────────────

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on.
    pub bind: Option<String>,
    /// Directory all server-backed paths are sandboxed within.
    pub root: Option<String>,
    /// Explicit on/off switch for server-backed browsing.
    pub enable_local_fs: Option<bool>,
    /// Runtime mode: "development" or "production".
    pub mode: Option<String>,
    /// Upper bound for a single listing or read, in milliseconds.
    pub request_timeout_ms: Option<u64>,
}

/// Filesystem watcher settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct WatcherConfig {
    /// Enable the watch endpoints.
    pub enabled: Option<bool>,
    /// Debounce interval in milliseconds.
    pub debounce_ms: Option<u64>,
}

/// Which files are considered viewable text.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct FilesConfig {
    /// Recognized extensions, without the leading dot.
    pub extensions: Option<Vec<String>>,
}

// ── Top-level config ─────────────────────────────────────────────────────────

/// Top-level application configuration.
///
/// All fields are optional so that partial configs from different sources
/// can be merged together (CLI overrides file, file overrides defaults).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub watcher: WatcherConfig,
    pub files: FilesConfig,
}

// ── Default constants ────────────────────────────────────────────────────────

/// Default listen address.
pub const DEFAULT_BIND: &str = "127.0.0.1:3100";
/// Default per-request timeout for listing and reads.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
/// Default debounce interval in milliseconds.
pub const DEFAULT_DEBOUNCE_MS: u64 = 200;
/// Default recognized text extension.
pub const DEFAULT_EXTENSIONS: &[&str] = &["txt"];

// ── Config file locator ──────────────────────────────────────────────────────

/// Return the list of candidate config file paths in priority order.
///
/// Does NOT include the CLI `--config` path, which is handled separately.
fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(env_path) = std::env::var("TEXT_VIEWER_CONFIG") {
        paths.push(PathBuf::from(env_path));
    }

    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join(".text-viewer.toml"));
    }

    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("text-viewer").join("config.toml"));
    }

    paths
}

/// Try to read and parse a TOML config file. Returns `None` if the file
/// doesn't exist or can't be parsed (with a warning logged).
fn load_file(path: &Path) -> Option<AppConfig> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str::<AppConfig>(&content) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to parse config file");
            None
        }
    }
}

// ── Merge logic ──────────────────────────────────────────────────────────────

impl AppConfig {
    /// Merge `other` on top of `self`; `other`'s `Some` values win.
    pub fn merge(self, other: &AppConfig) -> AppConfig {
        AppConfig {
            server: ServerConfig {
                bind: other.server.bind.clone().or(self.server.bind),
                root: other.server.root.clone().or(self.server.root),
                enable_local_fs: other
                    .server
                    .enable_local_fs
                    .or(self.server.enable_local_fs),
                mode: other.server.mode.clone().or(self.server.mode),
                request_timeout_ms: other
                    .server
                    .request_timeout_ms
                    .or(self.server.request_timeout_ms),
            },
            watcher: WatcherConfig {
                enabled: other.watcher.enabled.or(self.watcher.enabled),
                debounce_ms: other.watcher.debounce_ms.or(self.watcher.debounce_ms),
            },
            files: FilesConfig {
                extensions: other
                    .files
                    .extensions
                    .clone()
                    .or(self.files.extensions),
            },
        }
    }

    /// Load the final merged configuration.
    ///
    /// `cli_config_path` is an explicit config file path from `--config`.
    /// `cli_overrides` are partial overrides derived from CLI flags.
    pub fn load(cli_config_path: Option<&Path>, cli_overrides: Option<&AppConfig>) -> AppConfig {
        let mut config = AppConfig::default();

        // Walk in reverse so that the highest-priority candidate is merged last.
        for path in candidate_paths().iter().rev() {
            if let Some(file_cfg) = load_file(path) {
                tracing::debug!(path = %path.display(), "loaded config file");
                config = config.merge(&file_cfg);
            }
        }

        if let Some(cli_path) = cli_config_path {
            if let Some(file_cfg) = load_file(cli_path) {
                config = config.merge(&file_cfg);
            }
        }

        if let Some(overrides) = cli_overrides {
            config = config.merge(overrides);
        }

        config
    }

    // ── Convenience getters with built-in defaults ──────────────────────────

    /// Listen address for the HTTP server.
    pub fn bind(&self) -> &str {
        self.server.bind.as_deref().unwrap_or(DEFAULT_BIND)
    }

    /// Configured root, if any. Resolution against mount points and the
    /// working directory happens in `fs::guard::resolve_root`.
    pub fn root(&self) -> Option<&Path> {
        self.server.root.as_deref().map(Path::new)
    }

    /// Explicit enable/disable switch; `None` means "decide heuristically".
    pub fn enable_local_fs(&self) -> Option<bool> {
        self.server.enable_local_fs
    }

    /// Whether the server runs in development mode.
    pub fn is_development(&self) -> bool {
        matches!(
            self.server.mode.as_deref(),
            Some("development") | Some("dev")
        )
    }

    /// Timeout applied to one listing or read.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(
            self.server
                .request_timeout_ms
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
        )
    }

    /// Whether the watch endpoints are enabled.
    pub fn watcher_enabled(&self) -> bool {
        self.watcher.enabled.unwrap_or(true)
    }

    /// Watcher debounce interval in milliseconds.
    pub fn debounce_ms(&self) -> u64 {
        self.watcher.debounce_ms.unwrap_or(DEFAULT_DEBOUNCE_MS)
    }

    /// Recognized text extensions, lowercased and without dots.
    pub fn extensions(&self) -> Vec<String> {
        match &self.files.extensions {
            Some(list) if !list.is_empty() => list
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
            _ => DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
