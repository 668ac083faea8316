use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-wide result type alias.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error types.
#[derive(Debug, Error)]
pub enum AppError {
    /// I/O errors from filesystem operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A path tried to leave the configured root.
    #[error("Invalid or unsafe path: {0}")]
    SecurityRejection(String),

    /// The requested file or directory does not exist.
    #[error("Not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The requested path exists but is not a directory.
    #[error("Path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// Server-backed browsing is disabled, or the backing source went away.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A single file could not be read.
    #[error("Failed to read {}: {source}", .path.display())]
    TransientRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A watch channel errored and was closed.
    #[error("Watch channel failed: {0}")]
    Channel(String),

    /// A bounded server-side operation did not finish in time.
    #[error("Operation timed out after {0} ms")]
    Timeout(u64),

    /// HTTP transport errors when talking to a remote server.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote server answered with an error status.
    #[error("Server responded {status}: {message}")]
    Remote { status: u16, message: String },

    /// Invalid path provided by the user on the command line.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Configuration could not be applied.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// Whether this error must be shown to the user instead of being
    /// recovered locally.
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            AppError::SecurityRejection(_) | AppError::BackendUnavailable(_)
        )
    }

    /// Stable code carried in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::SecurityRejection(_) => "security_rejection",
            AppError::NotFound(_) => "not_found",
            AppError::NotADirectory(_) => "not_a_directory",
            AppError::BackendUnavailable(_) => "backend_unavailable",
            AppError::InvalidPath(_) => "invalid_path",
            AppError::Timeout(_) => "timeout",
            _ => "internal",
        }
    }

    /// Rebuild an error from a server's error response.
    pub fn from_remote(status: u16, body: ErrorBody, requested: &str) -> Self {
        match body.code.as_deref() {
            Some("security_rejection") => AppError::SecurityRejection(requested.to_string()),
            Some("backend_unavailable") => AppError::BackendUnavailable(body.error),
            Some("not_found") => AppError::NotFound(PathBuf::from(requested)),
            Some("not_a_directory") => AppError::NotADirectory(PathBuf::from(requested)),
            _ => AppError::Remote {
                status,
                message: body.error,
            },
        }
    }
}

/// JSON body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default)]
    pub code: Option<String>,
}

impl From<&AppError> for ErrorBody {
    fn from(err: &AppError) -> Self {
        Self {
            error: err.to_string(),
            code: Some(err.code().to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let app_err: AppError = io_err.into();
        assert!(matches!(app_err, AppError::Io(_)));
        assert!(app_err.to_string().contains("file not found"));
    }

    #[test]
    fn security_rejection_display() {
        let err = AppError::SecurityRejection("../etc/passwd".into());
        assert_eq!(err.to_string(), "Invalid or unsafe path: ../etc/passwd");
    }

    #[test]
    fn not_found_display() {
        let err = AppError::NotFound(PathBuf::from("/srv/files/gone.txt"));
        assert_eq!(err.to_string(), "Not found: /srv/files/gone.txt");
    }

    #[test]
    fn transient_read_keeps_source() {
        let err = AppError::TransientRead {
            path: PathBuf::from("a.txt"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().starts_with("Failed to read a.txt"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn only_sandbox_and_availability_errors_are_user_visible() {
        assert!(AppError::SecurityRejection("x".into()).is_user_visible());
        assert!(AppError::BackendUnavailable("off".into()).is_user_visible());
        assert!(!AppError::NotFound(PathBuf::from("x")).is_user_visible());
        assert!(!AppError::Channel("closed".into()).is_user_visible());
        assert!(!AppError::Timeout(10).is_user_visible());
    }

    #[test]
    fn remote_error_codes_map_back_to_taxonomy() {
        let body = ErrorBody::from(&AppError::SecurityRejection("x".into()));
        assert_eq!(body.code.as_deref(), Some("security_rejection"));
        let err = AppError::from_remote(403, body, "../x");
        assert!(matches!(err, AppError::SecurityRejection(p) if p == "../x"));

        let body = ErrorBody {
            error: "Local file system access is disabled".into(),
            code: Some("backend_unavailable".into()),
        };
        assert!(matches!(
            AppError::from_remote(403, body, ""),
            AppError::BackendUnavailable(_)
        ));

        let body = ErrorBody {
            error: "boom".into(),
            code: None,
        };
        assert!(matches!(
            AppError::from_remote(500, body, "a.txt"),
            AppError::Remote { status: 500, .. }
        ));
    }
}
