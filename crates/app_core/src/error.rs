//! Application error types

use app_fs::FsError;
use thiserror::Error;

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    // ===== Recoverable Errors (notify user, continue) =====
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Image decode error: {0}")]
    ImageDecode(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Media tool error: {0}")]
    Media(String),

    #[error("Operation cancelled")]
    Cancelled,

    // ===== Fatal Errors (application termination) =====
    #[error("Thumbnail store error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Initialization failed: {0}")]
    Init(String),
}

impl AppError {
    /// Is this error recoverable?
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AppError::Io(_)
                | AppError::FileNotFound(_)
                | AppError::InvalidPath(_)
                | AppError::UnsupportedFormat(_)
                | AppError::ImageDecode(_)
                | AppError::Archive(_)
                | AppError::Media(_)
                | AppError::Cancelled
        )
    }

    /// Is this a fatal error?
    pub fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, AppError::Cancelled)
    }

    /// Get a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            AppError::FileNotFound(path) => format!("File not found: {}", path),
            AppError::UnsupportedFormat(ext) => format!("Unsupported format: {}", ext),
            AppError::ImageDecode(msg) => format!("Cannot load image: {}", msg),
            AppError::Archive(msg) => format!("Archive error: {}", msg),
            AppError::Cancelled => "Cancelled".to_string(),
            _ => self.to_string(),
        }
    }
}

impl From<FsError> for AppError {
    fn from(e: FsError) -> Self {
        match e {
            FsError::Io(io) => AppError::Io(io),
            FsError::NotFound(p) => AppError::FileNotFound(p),
            FsError::InvalidPath(p) => AppError::InvalidPath(p),
            FsError::UnsupportedFormat(p) => AppError::UnsupportedFormat(p),
            FsError::CorruptArchive(msg) | FsError::Archive(msg) => AppError::Archive(msg),
            FsError::Cancelled => AppError::Cancelled,
        }
    }
}

impl From<app_db::DbError> for AppError {
    fn from(e: app_db::DbError) -> Self {
        AppError::Database(e.to_string())
    }
}

impl From<image::ImageError> for AppError {
    fn from(e: image::ImageError) -> Self {
        // a decoder rejecting the bytes is "not a picture", not a failure
        match e {
            image::ImageError::Unsupported(_) | image::ImageError::Decoding(_) => {
                AppError::UnsupportedFormat(e.to_string())
            }
            other => AppError::ImageDecode(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fs_error_mapping() {
        assert!(matches!(
            AppError::from(FsError::NotFound("x".into())),
            AppError::FileNotFound(_)
        ));
        assert!(AppError::from(FsError::Cancelled).is_cancelled());
        assert!(AppError::from(FsError::CorruptArchive("bad".into())).is_recoverable());
    }

    #[test]
    fn test_fatal_errors() {
        assert!(AppError::Config("bad toml".into()).is_fatal());
        assert!(!AppError::Cancelled.is_fatal());
        assert_eq!(AppError::Cancelled.user_message(), "Cancelled");
    }
}
