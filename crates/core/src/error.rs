//! Error types for mintd state files
//!
//! Covers everything that reads or writes the enclave manifest, the project
//! descriptor and catalog trees. We use `thiserror` for automatic `Display`
//! and `Error` trait implementations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for core operations
pub type CoreResult<T> = std::result::Result<T, CoreError>;

/// Errors raised by the manifest store and the typed state files
#[derive(Debug, Error)]
pub enum CoreError {
    /// State file does not exist
    #[error("Manifest not found: {}", path.display())]
    ManifestNotFound {
        /// Path that was expected to hold the file
        path: PathBuf,
    },

    /// State file exists but cannot be parsed
    #[error("Manifest corrupt: {}: {reason}", path.display())]
    ManifestCorrupt {
        /// Path of the unparsable file
        path: PathBuf,
        /// Parser message
        reason: String,
    },

    /// Another process holds the advisory lock for too long
    #[error("Manifest is locked by another process: {} (gave up after {attempts} attempts)", path.display())]
    Locked {
        /// Lock file path
        path: PathBuf,
        /// Number of lock attempts made
        attempts: u32,
    },

    /// Structurally valid file with invalid content
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization failure while writing a state file
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CoreError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a corrupt-manifest error for a path
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::ManifestCorrupt {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// True when the error means "the file is simply not there"
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ManifestNotFound { .. })
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for CoreError {
    fn from(e: serde_yaml::Error) -> Self {
        CoreError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = CoreError::ManifestNotFound {
            path: PathBuf::from("/tmp/enclave_manifest.yaml"),
        };
        let msg = err.to_string();
        assert!(msg.contains("Manifest not found"));
        assert!(msg.contains("enclave_manifest.yaml"));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_error_display_corrupt() {
        let err = CoreError::corrupt("/tmp/m.yaml", "bad indentation");
        let msg = err.to_string();
        assert!(msg.contains("corrupt"));
        assert!(msg.contains("bad indentation"));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_error_display_locked() {
        let err = CoreError::Locked {
            path: PathBuf::from("m.yaml.lock"),
            attempts: 5,
        };
        assert!(err.to_string().contains("5 attempts"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let err: CoreError = io_err.into();
        assert!(matches!(err, CoreError::Io(_)));
    }
}
