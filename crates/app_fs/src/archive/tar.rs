//! TAR backend (optionally gzip-compressed)
//!
//! Tar has no random access, so extraction rescans up to the entry.

use super::{ArchiveBackend, EntryHandle, RawEntry};
use crate::{FsError, Result};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

pub(crate) struct TarBackend {
    path: PathBuf,
    gzip: bool,
}

impl TarBackend {
    pub fn open(path: &Path, gzip: bool) -> Result<Self> {
        File::open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            gzip,
        })
    }

    fn archive(&self) -> Result<tar::Archive<Box<dyn Read>>> {
        let file = BufReader::new(File::open(&self.path)?);
        let reader: Box<dyn Read> = if self.gzip {
            Box::new(GzDecoder::new(file))
        } else {
            Box::new(file)
        };
        Ok(tar::Archive::new(reader))
    }
}

fn corrupt(e: std::io::Error) -> FsError {
    FsError::CorruptArchive(e.to_string())
}

impl ArchiveBackend for TarBackend {
    fn entries(&mut self) -> Result<Vec<RawEntry>> {
        let mut archive = self.archive()?;
        let mut entries = Vec::new();

        for (i, entry) in archive.entries().map_err(corrupt)?.enumerate() {
            let entry = entry.map_err(corrupt)?;
            let header = entry.header();
            let entry_type = header.entry_type();
            if !entry_type.is_file() && !entry_type.is_dir() {
                continue;
            }

            let name = entry.path().map_err(corrupt)?.to_string_lossy().to_string();
            let modified = header
                .mtime()
                .ok()
                .and_then(|secs| DateTime::<Utc>::from_timestamp(secs as i64, 0));

            entries.push(RawEntry {
                name,
                is_dir: entry_type.is_dir(),
                size: entry.size(),
                modified,
                handle: EntryHandle::Index(i),
            });
        }

        Ok(entries)
    }

    fn extract(&mut self, handle: &EntryHandle, sink: &mut dyn Write) -> Result<u64> {
        let EntryHandle::Index(target) = handle else {
            return Err(FsError::Archive("tar entries are addressed by position".into()));
        };

        let mut archive = self.archive()?;
        for (i, entry) in archive.entries()?.enumerate() {
            let mut entry = entry?;
            if i == *target {
                return Ok(std::io::copy(&mut entry, sink)?);
            }
        }

        Err(FsError::NotFound(format!("tar entry #{}", target)))
    }
}
