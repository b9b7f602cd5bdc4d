//! Error types shared by every component of the authority.
//!
//! Each variant corresponds to one failure kind a caller may want to react to
//! differently (retry, fix configuration, ask for another password) and
//! carries the label or path needed to diagnose it.

use std::path::{Path, PathBuf};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CaError>;

/// Coarse classification of a [`CaError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Provider,
    KeyGeneration,
    Keystore,
    Authentication,
    NotFound,
    Parse,
    Signing,
    Io,
    Configuration,
    Repository,
    State,
}

#[derive(Debug, Error)]
pub enum CaError {
    #[error("cryptographic provider failure: {0}")]
    Provider(String),

    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("keystore {}: {reason}", .path.display())]
    Keystore { path: PathBuf, reason: String },

    #[error("wrong password for key '{label}' in keystore {}", .path.display())]
    Authentication { label: String, path: PathBuf },

    #[error("key '{label}' not found in keystore {}", .path.display())]
    NotFound { label: String, path: PathBuf },

    #[error("malformed {what}: {reason}")]
    Parse { what: &'static str, reason: String },

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("certificate repository {}: {reason}", .path.display())]
    Repository { path: PathBuf, reason: String },

    #[error("{0}")]
    State(String),

    #[error("intermediate CA '{label}' failed: {source}")]
    Intermediate {
        label: String,
        #[source]
        source: Box<CaError>,
    },
}

impl CaError {
    /// Kind of the underlying failure. Wrapped intermediate failures report
    /// the kind of the error they wrap.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CaError::Provider(_) => ErrorKind::Provider,
            CaError::KeyGeneration(_) => ErrorKind::KeyGeneration,
            CaError::Keystore { .. } => ErrorKind::Keystore,
            CaError::Authentication { .. } => ErrorKind::Authentication,
            CaError::NotFound { .. } => ErrorKind::NotFound,
            CaError::Parse { .. } => ErrorKind::Parse,
            CaError::Signing(_) => ErrorKind::Signing,
            CaError::Io { .. } => ErrorKind::Io,
            CaError::Configuration(_) => ErrorKind::Configuration,
            CaError::Repository { .. } => ErrorKind::Repository,
            CaError::State(_) => ErrorKind::State,
            CaError::Intermediate { source, .. } => source.kind(),
        }
    }

    pub(crate) fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        CaError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub(crate) fn keystore(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        CaError::Keystore {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    pub(crate) fn repository(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        CaError::Repository {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }
}

impl From<openssl::error::ErrorStack> for CaError {
    fn from(e: openssl::error::ErrorStack) -> Self {
        CaError::Provider(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intermediate_kind_is_transparent() {
        let err = CaError::Intermediate {
            label: "Cleveland".to_string(),
            source: Box::new(CaError::Authentication {
                label: "Root".to_string(),
                path: PathBuf::from("keys/ca.key"),
            }),
        };
        assert_eq!(err.kind(), ErrorKind::Authentication);
        let message = err.to_string();
        assert!(message.contains("Cleveland"));
        assert!(message.contains("Root"));
    }

    #[test]
    fn test_keystore_error_names_path() {
        let err = CaError::keystore("keys/ca.key", "already exists");
        assert_eq!(err.kind(), ErrorKind::Keystore);
        assert_eq!(err.to_string(), "keystore keys/ca.key: already exists");
    }
}
