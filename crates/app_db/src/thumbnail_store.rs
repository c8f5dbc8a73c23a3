//! RocksDB-based thumbnail cache

use crate::record::{FileIdentity, ThumbnailOptions, ThumbnailRecord};
use crate::Result;
use app_fs::NestedPath;
use rocksdb::{Options, DB};
use std::path::Path;

/// Key for thumbnail cache: path id followed by the options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheKey {
    /// xxh3 of the canonical nested path
    pub path_id: u64,
    pub options: ThumbnailOptions,
}

impl CacheKey {
    pub fn new(path: &NestedPath, options: ThumbnailOptions) -> Self {
        Self {
            path_id: path.id(),
            options,
        }
    }

    /// Serialize to bytes (18 bytes total)
    pub fn to_bytes(&self) -> [u8; 18] {
        let mut key = [0u8; 18];
        key[0..8].copy_from_slice(&self.path_id.to_be_bytes());
        key[8..18].copy_from_slice(&self.options.to_key_bytes());
        key
    }
}

/// Persisted thumbnail store
///
/// RocksDB serializes concurrent readers and writers internally, so the
/// store is shared as `Arc<ThumbnailStore>` without extra locking.
pub struct ThumbnailStore {
    db: DB,
}

impl ThumbnailStore {
    /// Open or create the cache database
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts.set_max_open_files(256);
        opts.set_write_buffer_size(64 * 1024 * 1024); // 64MB
        opts.set_max_write_buffer_number(3);
        opts.set_target_file_size_base(64 * 1024 * 1024);

        let db = DB::open(&opts, path)?;
        tracing::info!("Thumbnail store opened at {:?}", path);
        Ok(Self { db })
    }

    /// Cached contents for `identity`, or `None` when absent or stale
    pub fn get(
        &self,
        identity: &FileIdentity,
        options: ThumbnailOptions,
    ) -> Result<Option<Vec<Vec<u8>>>> {
        let Some(record) = self.get_record(&identity.path, options)? else {
            return Ok(None);
        };

        if !record.identity.matches(identity) || record.options != options {
            tracing::debug!("Stale thumbnail for {}", identity.path);
            return Ok(None);
        }

        Ok(Some(record.contents))
    }

    /// Raw record lookup without the identity check
    pub fn get_record(
        &self,
        path: &NestedPath,
        options: ThumbnailOptions,
    ) -> Result<Option<ThumbnailRecord>> {
        let key = CacheKey::new(path, options);
        let Some(bytes) = self.db.get_pinned(key.to_bytes())? else {
            return Ok(None);
        };

        match bincode::deserialize::<ThumbnailRecord>(&bytes) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                // unreadable records are treated as misses and overwritten later
                tracing::warn!("Discarding unreadable thumbnail record for {}: {}", path, e);
                Ok(None)
            }
        }
    }

    /// Store a record, replacing any previous one for the same path and options
    pub fn put(&self, record: &ThumbnailRecord) -> Result<()> {
        let key = CacheKey::new(&record.identity.path, record.options);
        let value = bincode::serialize(record)?;
        self.db.put(key.to_bytes(), value)?;
        Ok(())
    }

    /// Delete one thumbnail
    pub fn delete(&self, path: &NestedPath, options: ThumbnailOptions) -> Result<()> {
        self.db.delete(CacheKey::new(path, options).to_bytes())?;
        Ok(())
    }

    /// Delete all thumbnails for a path, whatever their options
    pub fn delete_path(&self, path: &NestedPath) -> Result<usize> {
        let prefix = path.id().to_be_bytes();
        let mut count = 0;

        let iter = self.db.prefix_iterator(prefix);
        for item in iter {
            let (key, _) = item?;
            if key.starts_with(&prefix) {
                self.db.delete(&key)?;
                count += 1;
            } else {
                break;
            }
        }

        Ok(count)
    }

    /// Check if a thumbnail exists, fresh or not
    pub fn exists(&self, path: &NestedPath, options: ThumbnailOptions) -> Result<bool> {
        Ok(self
            .db
            .get_pinned(CacheKey::new(path, options).to_bytes())?
            .is_some())
    }

    /// Get approximate cache size
    pub fn approximate_size(&self) -> u64 {
        self.db
            .property_int_value("rocksdb.estimate-live-data-size")
            .unwrap_or(None)
            .unwrap_or(0)
    }

    /// Compact the database
    pub fn compact(&self) {
        self.db.compact_range::<[u8; 0], [u8; 0]>(None, None);
    }
}
