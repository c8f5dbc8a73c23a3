//! NestFiler File System Abstraction Layer
//!
//! Provides a unified interface over the physical file system and archives
//! nested to any depth:
//! - NestedPath: a traversal through archive boundaries
//! - ArchiveExtractor: indexed, read-only access to one archive
//! - ExtractorProvider: LRU cache of open archives keyed by nesting prefix
//! - ExtractedFileCollector: reference-counted temp copies of archive entries
//! - VirtualFileSystem: the façade dispatching between the above

mod archive;
mod browser;
mod cancel;
mod collector;
mod encoding;
mod nested_path;
mod options;
mod provider;
mod vfs;

pub use archive::{
    is_archive_extension, is_archive_name, ArchiveExtractor, ArchiveFormat, EntryHandle, EntryRef,
};
pub use browser::{is_root, list_drives};
pub use collector::{ExtractedFile, ExtractedFileCollector};
pub use encoding::{
    decode_bytes, decoder_for_locale, detect_encoding, hint_from_locale_name,
    system_encoding_hint, DetectingDecoder, EncodingHint, EntryNameDecoder,
    FormatDefaultDecoder, LegacyCodepageDecoder, NameEncoding,
};
pub use nested_path::{NestedPath, SEGMENT_SEPARATOR};
pub use options::VfsOptions;
pub use provider::{ExtractorProvider, ProviderStats, DEFAULT_EXTRACTOR_CAPACITY};
pub use vfs::{EntryKind, VfsEntry, VfsStats, VirtualFileSystem};

use std::path::Path;
use thiserror::Error;

/// File system errors
#[derive(Error, Debug)]
pub enum FsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Corrupt archive: {0}")]
    CorruptArchive(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Operation cancelled")]
    Cancelled,
}

/// Coarse error taxonomy shared with callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsErrorKind {
    NotFound,
    InvalidPath,
    UnsupportedFormat,
    Cancelled,
    Io,
    CorruptArchive,
}

impl FsError {
    /// Map an I/O error, turning `NotFound` into the typed variant
    pub fn from_io(e: std::io::Error, path: &Path) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => FsError::NotFound(path.display().to_string()),
            _ => FsError::Io(e),
        }
    }

    pub fn kind(&self) -> FsErrorKind {
        match self {
            FsError::NotFound(_) => FsErrorKind::NotFound,
            FsError::InvalidPath(_) => FsErrorKind::InvalidPath,
            FsError::UnsupportedFormat(_) => FsErrorKind::UnsupportedFormat,
            FsError::CorruptArchive(_) => FsErrorKind::CorruptArchive,
            FsError::Cancelled => FsErrorKind::Cancelled,
            FsError::Io(_) | FsError::Archive(_) => FsErrorKind::Io,
        }
    }
}

pub type Result<T> = std::result::Result<T, FsError>;
