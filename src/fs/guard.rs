//! Sandbox for server-side paths: everything a client names is resolved
//! against one root and rejected if it would land outside of it.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

/// Mount point used as the root when one is present and no absolute root
/// was configured (container deployments bind their volume here).
pub const DEFAULT_MOUNT_POINT: &str = "/data/files";

/// Root used under the working directory when nothing else applies.
pub const DEFAULT_RELATIVE_ROOT: &str = "files";

/// Pick the sandbox root.
///
/// Precedence: explicit absolute `configured` root, then `mount_point` if it
/// is an existing directory, then `configured` (relative) or
/// [`DEFAULT_RELATIVE_ROOT`] joined onto `cwd`.
pub fn resolve_root(configured: Option<&Path>, mount_point: &Path, cwd: &Path) -> PathBuf {
    match configured {
        Some(path) if path.is_absolute() => path.to_path_buf(),
        _ if mount_point.is_dir() => mount_point.to_path_buf(),
        Some(path) => cwd.join(path),
        None => cwd.join(DEFAULT_RELATIVE_ROOT),
    }
}

/// Why a path was refused. Only used for logging; callers treat every
/// variant the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Raw input contained `..` or `~`.
    TraversalToken,
    /// The path could not be canonicalized at all.
    Unresolvable,
    /// The canonical path is not below the root.
    OutsideRoot,
    /// The canonical path does not start with the root string.
    PrefixMismatch,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            Rejection::TraversalToken => "path contains a traversal token",
            Rejection::Unresolvable => "path cannot be resolved",
            Rejection::OutsideRoot => "path escapes the root",
            Rejection::PrefixMismatch => "path does not start with the root",
        };
        f.write_str(reason)
    }
}

/// Resolves user-supplied paths inside a single canonical root.
#[derive(Debug, Clone)]
pub struct PathGuard {
    root: PathBuf,
}

impl PathGuard {
    /// Create a guard for `root`. The root is canonicalized once here; a root
    /// that does not exist yet is kept in its lexically normalized form.
    pub fn new(root: &Path) -> Self {
        let root = canonicalize_lenient(root).unwrap_or_else(|| normalize(root));
        Self { root }
    }

    /// The canonical sandbox root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `user_path` (relative to the root, or absolute) to a canonical
    /// path inside the root.
    ///
    /// Targets that do not exist are resolved through their deepest existing
    /// ancestor, so the caller can still answer "not found".
    #[must_use = "an unchecked resolution defeats the sandbox"]
    pub fn resolve(&self, user_path: &str) -> Result<PathBuf, Rejection> {
        let outcome = self.resolve_inner(user_path);
        if let Err(reason) = outcome {
            tracing::debug!(path = user_path, %reason, "path rejected");
        }
        outcome
    }

    fn resolve_inner(&self, user_path: &str) -> Result<PathBuf, Rejection> {
        if user_path.contains("..") || user_path.contains('~') {
            return Err(Rejection::TraversalToken);
        }

        let joined = self.root.join(user_path);
        let canonical = canonicalize_lenient(&joined).ok_or(Rejection::Unresolvable)?;

        let relation = canonical
            .strip_prefix(&self.root)
            .map_err(|_| Rejection::OutsideRoot)?;
        if relation
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(Rejection::OutsideRoot);
        }

        let root_str = self.root.to_string_lossy();
        if !canonical.to_string_lossy().starts_with(root_str.as_ref()) {
            return Err(Rejection::PrefixMismatch);
        }

        Ok(canonical)
    }
}

/// Drop `.` components without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Canonicalize the deepest existing ancestor of `path` and re-append the
/// missing tail. Returns `None` when no ancestor resolves.
fn canonicalize_lenient(path: &Path) -> Option<PathBuf> {
    let mut existing = normalize(path);
    let mut tail: Vec<OsString> = Vec::new();
    loop {
        match std::fs::canonicalize(&existing) {
            Ok(mut canonical) => {
                for part in tail.iter().rev() {
                    canonical.push(part);
                }
                return Some(canonical);
            }
            Err(_) => {
                tail.push(existing.file_name()?.to_os_string());
                if !existing.pop() {
                    return None;
                }
            }
        }
    }
}
