//! Extractor provider: LRU-bounded cache of open archives keyed by nesting prefix

use crate::archive::{archive_suffix, ArchiveExtractor};
use crate::encoding::EntryNameDecoder;
use crate::{FsError, NestedPath, Result};
use parking_lot::Mutex;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempPath;

/// Default number of archives kept open
pub const DEFAULT_EXTRACTOR_CAPACITY: usize = 256;

struct CachedExtractor {
    extractor: Arc<ArchiveExtractor>,
    last_access: u64,
}

#[derive(Default)]
struct ProviderState {
    entries: HashMap<NestedPath, CachedExtractor>,
    /// Monotonic access clock
    clock: u64,
    hits: u64,
    misses: u64,
}

impl ProviderState {
    fn touch(&mut self, prefix: &NestedPath) -> Option<Arc<ArchiveExtractor>> {
        self.clock += 1;
        let clock = self.clock;
        let cached = self.entries.get_mut(prefix)?;
        cached.last_access = clock;
        Some(cached.extractor.clone())
    }
}

/// Provider statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderStats {
    pub open_archives: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Resolves nesting prefixes to live extractors
///
/// All operations run under one exclusive section, including any archive
/// opens and nested extraction a cache miss triggers.
pub struct ExtractorProvider {
    state: Mutex<ProviderState>,
    capacity: usize,
    temp_dir: PathBuf,
    decoder: Arc<dyn EntryNameDecoder>,
}

impl ExtractorProvider {
    pub fn new(capacity: usize, temp_dir: PathBuf, decoder: Arc<dyn EntryNameDecoder>) -> Self {
        Self {
            state: Mutex::new(ProviderState::default()),
            capacity,
            temp_dir,
            decoder,
        }
    }

    /// Resolve `prefix` (a path to an archive file) to its extractor
    pub fn resolve(&self, prefix: &NestedPath) -> Result<Arc<ArchiveExtractor>> {
        let mut state = self.state.lock();
        self.resolve_locked(&mut state, prefix)
    }

    /// Resolve `prefix` and run `f` against it without releasing the
    /// exclusive section, so the extractor cannot be evicted mid-use
    pub fn with_extractor<R>(
        &self,
        prefix: &NestedPath,
        f: impl FnOnce(&ArchiveExtractor) -> Result<R>,
    ) -> Result<R> {
        let mut state = self.state.lock();
        let extractor = self.resolve_locked(&mut state, prefix)?;
        f(&extractor)
    }

    fn resolve_locked(
        &self,
        state: &mut ProviderState,
        prefix: &NestedPath,
    ) -> Result<Arc<ArchiveExtractor>> {
        if prefix.is_archive_root() {
            return Err(FsError::InvalidPath(format!(
                "archive prefix may not end with a directory marker: {}",
                prefix
            )));
        }

        if let Some(extractor) = state.touch(prefix) {
            state.hits += 1;
            return Ok(extractor);
        }
        state.misses += 1;

        let mut last: Option<Arc<ArchiveExtractor>> = None;
        for sub in prefix.prefixes() {
            if let Some(extractor) = state.touch(&sub) {
                last = Some(extractor);
                continue;
            }

            let extractor = match &last {
                None => ArchiveExtractor::open(sub.physical_path(), self.decoder.clone())?,
                Some(outer) => {
                    let backing = self.materialize(outer, sub.last_segment())?;
                    ArchiveExtractor::open_temp(backing, self.decoder.clone())?
                }
            };
            let extractor = Arc::new(extractor);

            tracing::debug!("Cached extractor for {}", sub);
            state.clock += 1;
            state.entries.insert(
                sub,
                CachedExtractor {
                    extractor: extractor.clone(),
                    last_access: state.clock,
                },
            );
            last = Some(extractor);
        }

        last.ok_or_else(|| FsError::InvalidPath(prefix.to_string()))
    }

    /// Extract an inner archive to a temp file that keeps its archive suffix
    fn materialize(&self, outer: &ArchiveExtractor, entry: &str) -> Result<TempPath> {
        let name = entry.rsplit('/').next().unwrap_or(entry);
        let suffix =
            archive_suffix(name).ok_or_else(|| FsError::UnsupportedFormat(entry.to_string()))?;

        // fail fast before creating a temp file
        outer.entry(entry)?;

        std::fs::create_dir_all(&self.temp_dir)?;
        let mut file = tempfile::Builder::new()
            .prefix("nf-archive-")
            .suffix(&suffix)
            .tempfile_in(&self.temp_dir)?;

        {
            let mut writer = BufWriter::new(file.as_file_mut());
            outer.extract_to(entry, &mut writer)?;
            writer.flush()?;
        }

        Ok(file.into_temp_path())
    }

    /// Evict least recently used extractors down to capacity
    ///
    /// An entry's effective access time is the newest among itself and its
    /// cached descendants, and deeper entries go first on ties, so an outer
    /// archive never leaves the cache before archives nested in it.
    pub fn shrink(&self) -> usize {
        let mut state = self.state.lock();
        let excess = state.entries.len().saturating_sub(self.capacity);
        if excess == 0 {
            return 0;
        }

        let mut ranked: Vec<(u64, Reverse<usize>, NestedPath)> = state
            .entries
            .iter()
            .map(|(key, cached)| {
                let effective = state
                    .entries
                    .iter()
                    .filter(|(other, _)| key.is_prefix_of(other))
                    .map(|(_, other)| other.last_access)
                    .fold(cached.last_access, u64::max);
                (effective, Reverse(key.depth()), key.clone())
            })
            .collect();
        ranked.sort();

        for (_, _, key) in ranked.into_iter().take(excess) {
            if let Some(cached) = state.entries.remove(&key) {
                tracing::debug!("Evicting extractor for {}", key);
                cached.extractor.close();
            }
        }

        excess
    }

    /// Close and drop every cached extractor
    pub fn clear(&self) {
        let mut state = self.state.lock();
        for (_, cached) in state.entries.drain() {
            cached.extractor.close();
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, prefix: &NestedPath) -> bool {
        self.state.lock().entries.contains_key(prefix)
    }

    pub fn stats(&self) -> ProviderStats {
        let state = self.state.lock();
        ProviderStats {
            open_archives: state.entries.len(),
            capacity: self.capacity,
            hits: state.hits,
            misses: state.misses,
        }
    }

    #[cfg(test)]
    fn last_access(&self, prefix: &NestedPath) -> Option<u64> {
        self.state.lock().entries.get(prefix).map(|c| c.last_access)
    }
}

impl Drop for ExtractorProvider {
    fn drop(&mut self) {
        self.clear();
    }
}
