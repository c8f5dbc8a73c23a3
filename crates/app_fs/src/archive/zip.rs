//! ZIP backend

use super::{dos_datetime, ArchiveBackend, EntryHandle, RawEntry};
use crate::encoding::EntryNameDecoder;
use crate::{FsError, Result};
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;
use std::sync::Arc;
use zip::ZipArchive;

pub(crate) struct ZipBackend {
    archive: ZipArchive<BufReader<File>>,
    decoder: Arc<dyn EntryNameDecoder>,
}

impl ZipBackend {
    pub fn open(path: &Path, decoder: Arc<dyn EntryNameDecoder>) -> Result<Self> {
        let file = File::open(path)?;
        let archive = ZipArchive::new(BufReader::new(file))
            .map_err(|e| FsError::CorruptArchive(e.to_string()))?;
        Ok(Self { archive, decoder })
    }
}

impl ArchiveBackend for ZipBackend {
    fn entries(&mut self) -> Result<Vec<RawEntry>> {
        let mut entries = Vec::with_capacity(self.archive.len());

        for i in 0..self.archive.len() {
            let file = self
                .archive
                .by_index_raw(i)
                .map_err(|e| FsError::CorruptArchive(e.to_string()))?;

            let name = self.decoder.decode(file.name_raw(), file.name());
            let modified = file.last_modified().and_then(|dt| {
                dos_datetime(dt.year(), dt.month(), dt.day(), dt.hour(), dt.minute(), dt.second())
            });

            entries.push(RawEntry {
                name,
                is_dir: file.is_dir(),
                size: file.size(),
                modified,
                handle: EntryHandle::Index(i),
            });
        }

        Ok(entries)
    }

    fn extract(&mut self, handle: &EntryHandle, sink: &mut dyn Write) -> Result<u64> {
        let index = match handle {
            EntryHandle::Index(i) => *i,
            EntryHandle::Name(name) => self
                .archive
                .index_for_name(name)
                .ok_or_else(|| FsError::NotFound(name.clone()))?,
        };

        let mut file = self
            .archive
            .by_index(index)
            .map_err(|e| FsError::Archive(e.to_string()))?;

        Ok(std::io::copy(&mut file, sink)?)
    }
}
