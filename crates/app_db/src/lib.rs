//! NestFiler Database Layer
//!
//! Provides the RocksDB KVS thumbnail cache and the record types stored in it.

mod record;
mod thumbnail_store;

pub use record::{FileIdentity, ResizeMode, ThumbnailFormat, ThumbnailOptions, ThumbnailRecord};
pub use thumbnail_store::{CacheKey, ThumbnailStore};

use directories::ProjectDirs;
use std::path::PathBuf;
use thiserror::Error;

/// Database errors
#[derive(Error, Debug)]
pub enum DbError {
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Default thumbnail cache directory
pub fn default_cache_dir() -> PathBuf {
    ProjectDirs::from("com", "NestFiler", "NestFiler")
        .map(|dirs| dirs.cache_dir().join("thumbnails"))
        .unwrap_or_else(|| PathBuf::from("./cache/thumbnails"))
}
