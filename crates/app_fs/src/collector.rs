//! Reference-counted temp files materialized from in-archive entries
//!
//! Tools such as external decoders need a real filesystem path. Each entry
//! is extracted once and shared by every live [`ExtractedFile`] handle.
//! Releasing a handle only decrements the count; files are deleted by
//! [`ExtractedFileCollector::sweep`].

use crate::cancel::copy_cancellable;
use crate::provider::ExtractorProvider;
use crate::{FsError, NestedPath, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tempfile::TempPath;
use tokio_util::sync::CancellationToken;

struct ExtractedEntry {
    file: TempPath,
    refs: usize,
}

type SharedState = Arc<Mutex<HashMap<NestedPath, ExtractedEntry>>>;

/// Handle to a materialized in-archive file
///
/// The file stays on disk at least as long as the handle is alive.
pub struct ExtractedFile {
    key: NestedPath,
    path: PathBuf,
    state: Weak<Mutex<HashMap<NestedPath, ExtractedEntry>>>,
    released: bool,
}

impl ExtractedFile {
    /// Physical location of the extracted copy
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The in-archive path this file was extracted from
    pub fn nested_path(&self) -> &NestedPath {
        &self.key
    }

    /// Release this handle (same as dropping it)
    pub fn dispose(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        let Some(state) = self.state.upgrade() else {
            return;
        };
        let mut entries = state.lock();
        if let Some(entry) = entries.get_mut(&self.key) {
            entry.refs = entry.refs.saturating_sub(1);
        }
    }
}

impl Drop for ExtractedFile {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for ExtractedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractedFile")
            .field("key", &self.key.to_string())
            .field("path", &self.path)
            .finish()
    }
}

/// Owner of every extracted temp file
pub struct ExtractedFileCollector {
    provider: Arc<ExtractorProvider>,
    temp_dir: PathBuf,
    state: SharedState,
}

impl ExtractedFileCollector {
    pub fn new(provider: Arc<ExtractorProvider>, temp_dir: PathBuf) -> Self {
        Self {
            provider,
            temp_dir,
            state: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Get a physical copy of an in-archive file
    pub fn acquire(&self, path: &NestedPath, cancel: &CancellationToken) -> Result<ExtractedFile> {
        let archive = path
            .parent()
            .filter(|_| !path.is_archive_root())
            .ok_or_else(|| FsError::InvalidPath(format!("not an in-archive file: {}", path)))?;

        let mut entries = self.state.lock();

        if let Some(entry) = entries.get_mut(path) {
            entry.refs += 1;
            return Ok(self.handle(path, entry.file.to_path_buf()));
        }

        let file = self.provider.with_extractor(&archive, |extractor| {
            let entry = path.last_segment();
            extractor.entry(entry)?;
            self.extract(extractor, entry, path.extension(), cancel)
        })?;

        tracing::debug!("Extracted {} to {}", path, file.display());
        let location = file.to_path_buf();
        entries.insert(path.clone(), ExtractedEntry { file, refs: 1 });

        Ok(self.handle(path, location))
    }

    fn extract(
        &self,
        extractor: &crate::archive::ArchiveExtractor,
        entry: &str,
        extension: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<TempPath> {
        std::fs::create_dir_all(&self.temp_dir)?;
        let suffix = extension.map(|ext| format!(".{}", ext)).unwrap_or_default();
        let mut file = tempfile::Builder::new()
            .prefix("nf-file-")
            .suffix(&suffix)
            .tempfile_in(&self.temp_dir)?;

        {
            let mut writer = BufWriter::new(file.as_file_mut());
            copy_cancellable(cancel, &mut writer, |sink| extractor.extract_to(entry, sink))?;
            writer.flush()?;
        }

        Ok(file.into_temp_path())
    }

    fn handle(&self, key: &NestedPath, path: PathBuf) -> ExtractedFile {
        ExtractedFile {
            key: key.clone(),
            path,
            state: Arc::downgrade(&self.state),
            released: false,
        }
    }

    /// Delete every temp file no handle refers to; returns how many were
    /// removed
    pub fn sweep(&self) -> usize {
        let mut entries = self.state.lock();
        let unused: Vec<NestedPath> = entries
            .iter()
            .filter(|(_, entry)| entry.refs == 0)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &unused {
            if let Some(entry) = entries.remove(key) {
                delete(entry.file);
            }
        }

        if !unused.is_empty() {
            tracing::debug!("Swept {} extracted files", unused.len());
        }
        unused.len()
    }

    /// Delete every temp file regardless of live handles
    pub fn dispose_all(&self) {
        let mut entries = self.state.lock();
        for (_, entry) in entries.drain() {
            delete(entry.file);
        }
    }

    /// Number of tracked temp files
    pub fn len(&self) -> usize {
        self.state.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live handle count for a path
    pub fn ref_count(&self, path: &NestedPath) -> Option<usize> {
        self.state.lock().get(path).map(|entry| entry.refs)
    }
}

fn delete(file: TempPath) {
    let location = file.to_path_buf();
    if let Err(e) = file.close() {
        tracing::warn!("Failed to delete extracted file {}: {}", location.display(), e);
    }
}

impl Drop for ExtractedFileCollector {
    fn drop(&mut self) {
        self.dispose_all();
    }
}
