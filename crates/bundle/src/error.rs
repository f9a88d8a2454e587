//! Transfer bundle error types

use std::io;
use thiserror::Error;

/// Errors that can occur while writing or reading a transfer bundle
#[derive(Debug, Error)]
pub enum BundleError {
    /// Bundle carries no transfer manifest
    #[error("Transfer manifest not found in {0}")]
    ManifestMissing(String),

    /// Transfer manifest present but unreadable
    #[error("Invalid transfer manifest: {0}")]
    InvalidManifest(String),

    /// Invalid bundle structure or writer input
    #[error("Invalid bundle: {0}")]
    InvalidBundle(String),

    /// Archive entry would land outside the extraction directory
    #[error("Unsafe path in bundle: {0}")]
    UnsafePath(String),

    /// Archive operation failed
    #[error("Archive error: {0}")]
    Archive(String),

    /// Compression/decompression failed
    #[error("Compression error: {0}")]
    Compression(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BundleError {
    /// Create an archive error
    pub fn archive(msg: impl Into<String>) -> Self {
        Self::Archive(msg.into())
    }

    /// Create a compression error
    pub fn compression(msg: impl Into<String>) -> Self {
        Self::Compression(msg.into())
    }

    /// Create an invalid bundle error
    pub fn invalid_bundle(msg: impl Into<String>) -> Self {
        Self::InvalidBundle(msg.into())
    }
}

/// Result type for bundle operations
pub type BundleResult<T> = Result<T, BundleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BundleError::ManifestMissing("transfers/t1.tar.zst".to_string());
        assert!(err.to_string().contains("t1.tar.zst"));

        let err = BundleError::UnsafePath("../etc/passwd".to_string());
        assert!(err.to_string().contains("../etc/passwd"));
    }

    #[test]
    fn test_error_constructors() {
        assert!(matches!(BundleError::archive("tar failed"), BundleError::Archive(_)));
        assert!(matches!(
            BundleError::compression("zstd failed"),
            BundleError::Compression(_)
        ));
        assert!(matches!(
            BundleError::invalid_bundle("empty"),
            BundleError::InvalidBundle(_)
        ));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: BundleError = io_err.into();
        assert!(matches!(err, BundleError::Io(_)));
    }
}
