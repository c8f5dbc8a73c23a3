//! Virtual File System: physical paths and archive contents behind one API
//!
//! Depth-1 paths go straight to the file system. Deeper paths resolve the
//! archive addressed by all segments but the last through the
//! [`ExtractorProvider`] and query the last segment inside it.

use crate::archive::is_archive_name;
use crate::browser::{self, PhysicalEntry};
use crate::cancel::copy_cancellable;
use crate::collector::{ExtractedFile, ExtractedFileCollector};
use crate::provider::{ExtractorProvider, ProviderStats};
use crate::{ArchiveExtractor, FsError, NestedPath, Result, VfsOptions};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::io::Write;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Directory,
}

/// Entry in the virtual file system; doubles as the file/directory handle
/// passed to thumbnail generators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VfsEntry {
    pub path: NestedPath,
    /// Display name (last path element)
    pub name: String,
    pub kind: EntryKind,
    /// Size in bytes (0 for directories)
    pub size: u64,
    pub modified: DateTime<Utc>,
}

impl VfsEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// A file whose extension marks it as browsable archive
    pub fn is_archive(&self) -> bool {
        self.kind == EntryKind::File
            && is_archive_name(self.path.file_name())
    }

    fn from_physical(entry: PhysicalEntry) -> Result<Self> {
        let path = NestedPath::physical(&entry.path)?;
        Ok(Self {
            name: path.file_name().to_string(),
            kind: if entry.is_dir { EntryKind::Directory } else { EntryKind::File },
            size: entry.size,
            modified: entry
                .modified
                .unwrap_or_else(|| DateTime::<Utc>::from(std::time::UNIX_EPOCH)),
            path,
        })
    }

    fn from_archive(path: NestedPath, extractor: &ArchiveExtractor) -> Result<Self> {
        let inner = path.last_segment();
        let kind = if extractor.is_file(inner) {
            EntryKind::File
        } else if extractor.is_directory(inner) {
            EntryKind::Directory
        } else {
            return Err(FsError::NotFound(path.to_string()));
        };

        Ok(Self {
            name: path.file_name().to_string(),
            size: if kind == EntryKind::File { extractor.size(inner)? } else { 0 },
            modified: extractor.last_write_time(inner)?,
            kind,
            path,
        })
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VfsStats {
    pub provider: ProviderStats,
    pub extracted_files: usize,
}

struct VfsCore {
    provider: Arc<ExtractorProvider>,
    collector: ExtractedFileCollector,
}

impl VfsCore {
    /// Split a deep path into (archive prefix, in-archive path)
    fn split(path: &NestedPath) -> Option<(NestedPath, &str)> {
        path.parent().map(|prefix| (prefix, path.last_segment()))
    }

    fn exists(&self, path: &NestedPath) -> Result<bool> {
        let Some((archive, inner)) = Self::split(path) else {
            return Ok(path.physical_path().exists());
        };

        match self.provider.with_extractor(&archive, |ex| Ok(ex.exists(inner))) {
            Ok(found) => Ok(found),
            Err(FsError::NotFound(_)) | Err(FsError::UnsupportedFormat(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn is_directory(&self, path: &NestedPath) -> Result<bool> {
        let Some((archive, inner)) = Self::split(path) else {
            return Ok(path.physical_path().is_dir());
        };
        self.provider
            .with_extractor(&archive, |ex| Ok(ex.is_directory(inner)))
    }

    fn stat(&self, path: &NestedPath) -> Result<VfsEntry> {
        let Some((archive, _)) = Self::split(path) else {
            let entry = PhysicalEntry::from_path(path.physical_path().to_path_buf())?;
            return VfsEntry::from_physical(entry);
        };
        self.provider
            .with_extractor(&archive, |ex| VfsEntry::from_archive(path.clone(), ex))
    }

    fn list_files(&self, dir: &NestedPath) -> Result<Vec<NestedPath>> {
        self.list_kind(dir, EntryKind::File)
    }

    fn list_directories(&self, dir: &NestedPath) -> Result<Vec<NestedPath>> {
        self.list_kind(dir, EntryKind::Directory)
    }

    fn list_kind(&self, dir: &NestedPath, kind: EntryKind) -> Result<Vec<NestedPath>> {
        let mut paths = match Self::split(dir) {
            None => browser::read_children(dir.physical_path())?
                .into_iter()
                .filter(|e| e.is_dir == (kind == EntryKind::Directory))
                .map(|e| NestedPath::physical(&e.path))
                .collect::<Result<Vec<_>>>()?,
            Some((archive, inner)) => self.provider.with_extractor(&archive, |ex| {
                if !ex.is_directory(inner) {
                    return Err(FsError::NotFound(dir.to_string()));
                }
                let children = match kind {
                    EntryKind::File => ex.list_files(inner),
                    EntryKind::Directory => ex.list_directories(inner),
                };
                children.iter().map(|child| archive.combine(child)).collect()
            })?,
        };

        paths.sort();
        Ok(paths)
    }

    /// Directories first, each group in path order
    fn list(&self, dir: &NestedPath) -> Result<Vec<VfsEntry>> {
        let mut entries = match Self::split(dir) {
            None => browser::read_children(dir.physical_path())?
                .into_iter()
                .map(VfsEntry::from_physical)
                .collect::<Result<Vec<_>>>()?,
            Some((archive, inner)) => self.provider.with_extractor(&archive, |ex| {
                if !ex.is_directory(inner) {
                    return Err(FsError::NotFound(dir.to_string()));
                }
                let dirs = ex.list_directories(inner);
                let files = ex.list_files(inner);
                dirs.iter()
                    .chain(files.iter())
                    .map(|child| VfsEntry::from_archive(archive.combine(child)?, ex))
                    .collect()
            })?,
        };

        entries.sort_by(|a, b| {
            b.is_dir()
                .cmp(&a.is_dir())
                .then_with(|| a.path.cmp(&b.path))
        });
        Ok(entries)
    }

    fn read_to(&self, path: &NestedPath, sink: &mut dyn Write) -> Result<u64> {
        let Some((archive, inner)) = Self::split(path) else {
            let physical = path.physical_path();
            let mut file =
                std::fs::File::open(physical).map_err(|e| FsError::from_io(e, physical))?;
            return Ok(std::io::copy(&mut file, sink)?);
        };
        self.provider
            .with_extractor(&archive, |ex| ex.extract_to(inner, sink))
    }

    fn size(&self, path: &NestedPath) -> Result<u64> {
        Ok(self.stat(path)?.size)
    }

    fn last_write_time(&self, path: &NestedPath) -> Result<DateTime<Utc>> {
        Ok(self.stat(path)?.modified)
    }

    fn try_extract_file(
        &self,
        path: &NestedPath,
        cancel: &CancellationToken,
    ) -> Result<Option<ExtractedFile>> {
        if path.depth() == 1 {
            return Ok(None);
        }
        self.collector.acquire(path, cancel).map(Some)
    }

    fn shrink(&self) {
        let evicted = self.provider.shrink();
        let swept = self.collector.sweep();
        if evicted > 0 || swept > 0 {
            tracing::debug!("VFS shrink: {} extractors evicted, {} files swept", evicted, swept);
        }
    }

    fn dispose(&self) {
        self.collector.dispose_all();
        self.provider.clear();
    }
}

/// Virtual File System façade
///
/// Owns its extractor cache and extracted-file collector; a background task
/// shrinks both on a fixed interval until [`VirtualFileSystem::shutdown`] or
/// drop.
pub struct VirtualFileSystem {
    core: Arc<VfsCore>,
    shutdown: CancellationToken,
}

impl VirtualFileSystem {
    /// Create the file system; the shrink loop starts when called inside a
    /// tokio runtime
    pub fn new(options: &VfsOptions) -> Self {
        let provider = Arc::new(ExtractorProvider::new(
            options.extractor_capacity,
            options.temp_dir.clone(),
            options.zip_name_encoding.decoder(),
        ));
        let collector = ExtractedFileCollector::new(provider.clone(), options.temp_dir.clone());
        let core = Arc::new(VfsCore { provider, collector });
        let shutdown = CancellationToken::new();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(shrink_loop(
                    Arc::downgrade(&core),
                    options.shrink_interval(),
                    shutdown.clone(),
                ));
            }
            Err(_) => tracing::warn!("No tokio runtime; VFS shrink loop not started"),
        }

        tracing::info!("VFS initialized (temp dir {:?})", options.temp_dir);
        Self { core, shutdown }
    }

    async fn blocking<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&VfsCore) -> Result<R> + Send + 'static,
    {
        let core = self.core.clone();
        tokio::task::spawn_blocking(move || f(&core))
            .await
            .map_err(|e| FsError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
    }

    pub async fn exists(&self, path: &NestedPath) -> Result<bool> {
        let path = path.clone();
        self.blocking(move |core| core.exists(&path)).await
    }

    pub async fn is_directory(&self, path: &NestedPath) -> Result<bool> {
        let path = path.clone();
        self.blocking(move |core| core.is_directory(&path)).await
    }

    /// File or directory handle with size and timestamp
    pub async fn stat(&self, path: &NestedPath) -> Result<VfsEntry> {
        let path = path.clone();
        self.blocking(move |core| core.stat(&path)).await
    }

    /// Files directly inside `dir`, sorted
    pub async fn list_files(&self, dir: &NestedPath) -> Result<Vec<NestedPath>> {
        let dir = dir.clone();
        self.blocking(move |core| core.list_files(&dir)).await
    }

    /// Directories directly inside `dir`, sorted
    pub async fn list_directories(&self, dir: &NestedPath) -> Result<Vec<NestedPath>> {
        let dir = dir.clone();
        self.blocking(move |core| core.list_directories(&dir)).await
    }

    /// Directories then files directly inside `dir`
    pub async fn list(&self, dir: &NestedPath) -> Result<Vec<VfsEntry>> {
        let dir = dir.clone();
        self.blocking(move |core| core.list(&dir)).await
    }

    pub async fn size(&self, path: &NestedPath) -> Result<u64> {
        let path = path.clone();
        self.blocking(move |core| core.size(&path)).await
    }

    pub async fn last_write_time(&self, path: &NestedPath) -> Result<DateTime<Utc>> {
        let path = path.clone();
        self.blocking(move |core| core.last_write_time(&path)).await
    }

    /// Read a whole file into memory
    ///
    /// Cancellation returns at once; the blocking copy stops at its next
    /// chunk.
    pub async fn read(&self, path: &NestedPath, cancel: &CancellationToken) -> Result<Vec<u8>> {
        let path = path.clone();
        let token = cancel.clone();
        cancellable(
            cancel,
            self.blocking(move |core| {
                let mut buffer = Vec::new();
                copy_cancellable(&token, &mut buffer, |sink| core.read_to(&path, sink))?;
                Ok(buffer)
            }),
        )
        .await
    }

    /// Physical copy of an in-archive file; `None` for depth-1 paths, which
    /// already are physical files
    pub async fn try_extract_file(
        &self,
        path: &NestedPath,
        cancel: &CancellationToken,
    ) -> Result<Option<ExtractedFile>> {
        let path = path.clone();
        let token = cancel.clone();
        cancellable(
            cancel,
            self.blocking(move |core| core.try_extract_file(&path, &token)),
        )
        .await
    }

    /// Platform roots as depth-1 paths
    pub fn roots(&self) -> Vec<NestedPath> {
        browser::list_drives()
            .into_iter()
            .filter_map(|root| NestedPath::physical(root).ok())
            .collect()
    }

    /// Run one shrink sweep now
    pub async fn shrink(&self) -> Result<()> {
        self.blocking(|core| {
            core.shrink();
            Ok(())
        })
        .await
    }

    pub fn provider(&self) -> &Arc<ExtractorProvider> {
        &self.core.provider
    }

    pub fn stats(&self) -> VfsStats {
        VfsStats {
            provider: self.core.provider.stats(),
            extracted_files: self.core.collector.len(),
        }
    }

    /// Stop the shrink loop and release every held archive and temp file
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.core.dispose();
        tracing::info!("VFS shut down");
    }
}

impl Drop for VirtualFileSystem {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Race `fut` against the cancellation token
async fn cancellable<R>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<R>>,
) -> Result<R> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(FsError::Cancelled),
        result = fut => result,
    }
}

async fn shrink_loop(core: Weak<VfsCore>, interval: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // the first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(core) = core.upgrade() else {
            break;
        };
        if let Err(e) = tokio::task::spawn_blocking(move || core.shrink()).await {
            tracing::warn!("VFS shrink task failed: {}", e);
        }
    }

    tracing::debug!("VFS shrink loop stopped");
}
