use std::path::PathBuf;
use thiserror::Error;

/// Central error type for the whole pipeline.
/// Every module returns `Result<T, WeaveError>`.
#[derive(Debug, Error)]
pub enum WeaveError {
    // ── Lookup ──────────────────────────────────────────
    #[error("{0} not found")]
    NotFound(String),

    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed for {url}: HTTP {status}")]
    DownloadFailed { url: String, status: u16 },

    // ── External tool ───────────────────────────────────
    #[error("overlay tool not installed at {0:?}")]
    ToolMissing(PathBuf),

    #[error("overlay tool {step} step exited with code {code}")]
    ToolExit { step: &'static str, code: i32 },

    #[error("failed to start process: {0}")]
    Launch(String),

    // ── Integrity ───────────────────────────────────────
    #[error("integrity check failed: {0}")]
    Integrity(String),

    // ── Client ──────────────────────────────────────────
    #[error("client not ready: {0}")]
    CredentialExtraction(String),

    #[error("client endpoint returned HTTP {0}")]
    ClientStatus(u16),

    // ── Serialization ───────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Zip extraction error: {0}")]
    Zip(#[from] zip::result::ZipError),

    // ── Generic ─────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type WeaveResult<T> = Result<T, WeaveError>;

impl WeaveError {
    /// Failures the caller can absorb by trying the next strategy or by
    /// continuing with what it already has.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            WeaveError::NotFound(_) | WeaveError::Http(_) | WeaveError::DownloadFailed { .. }
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        WeaveError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<std::io::Error> for WeaveError {
    fn from(source: std::io::Error) -> Self {
        WeaveError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_and_network_failures_are_recoverable() {
        assert!(WeaveError::NotFound("game directory".into()).is_recoverable());
        assert!(WeaveError::DownloadFailed {
            url: "https://example.invalid".into(),
            status: 404
        }
        .is_recoverable());
        assert!(!WeaveError::ToolExit {
            step: "build",
            code: 2
        }
        .is_recoverable());
        assert!(!WeaveError::Integrity("entry escapes destination".into()).is_recoverable());
    }

    #[test]
    fn tool_exit_message_carries_code() {
        let err = WeaveError::ToolExit {
            step: "build",
            code: 3,
        };
        assert_eq!(err.to_string(), "overlay tool build step exited with code 3");
    }
}
