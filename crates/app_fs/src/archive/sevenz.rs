//! 7z backend
//!
//! The reader is reopened per extraction; solid blocks are decoded
//! sequentially until the requested entry is reached.

use super::{ArchiveBackend, EntryHandle, RawEntry};
use crate::{FsError, Result};
use chrono::{DateTime, Utc};
use sevenz_rust::{Password, SevenZReader};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub(crate) struct SevenZipBackend {
    path: PathBuf,
}

impl SevenZipBackend {
    pub fn open(path: &Path) -> Result<Self> {
        // surface missing files as I/O errors before any parsing happens
        std::fs::File::open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    fn reader(&self) -> Result<SevenZReader<std::fs::File>> {
        SevenZReader::open(&self.path, Password::empty())
            .map_err(|e| FsError::CorruptArchive(format!("Failed to open 7z: {}", e)))
    }
}

impl ArchiveBackend for SevenZipBackend {
    fn entries(&mut self) -> Result<Vec<RawEntry>> {
        let reader = self.reader()?;

        let entries = reader
            .archive()
            .files
            .iter()
            .map(|entry| {
                let modified: SystemTime = entry.last_modified_date().into();
                RawEntry {
                    name: entry.name().to_string(),
                    is_dir: entry.is_directory(),
                    size: entry.size(),
                    modified: (modified > SystemTime::UNIX_EPOCH).then(|| DateTime::<Utc>::from(modified)),
                    handle: EntryHandle::Name(entry.name().to_string()),
                }
            })
            .collect();

        Ok(entries)
    }

    fn extract(&mut self, handle: &EntryHandle, sink: &mut dyn Write) -> Result<u64> {
        let EntryHandle::Name(target) = handle else {
            return Err(FsError::Archive("7z entries are addressed by name".into()));
        };

        let mut reader = self.reader()?;
        let mut copied: Option<std::io::Result<u64>> = None;

        reader
            .for_each_entries(|entry, data| {
                if entry.name() == target {
                    copied = Some(std::io::copy(data, &mut *sink));
                    return Ok(false);
                }
                std::io::copy(data, &mut std::io::sink())
                    .map_err(|e| sevenz_rust::Error::other(format!("Failed to read: {}", e)))?;
                Ok(true)
            })
            .map_err(|e| FsError::Archive(format!("Failed to decompress 7z: {}", e)))?;

        match copied {
            Some(result) => Ok(result?),
            None => Err(FsError::NotFound(target.clone())),
        }
    }
}
