//! RAR backend (unrar)

use super::{dos_datetime, ArchiveBackend, EntryHandle, RawEntry};
use crate::{FsError, Result};
use chrono::{DateTime, Utc};
use std::io::Write;
use std::path::{Path, PathBuf};

pub(crate) struct RarBackend {
    path: PathBuf,
}

impl RarBackend {
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::File::open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

/// DOS file_time: date in the high word, time in the low word
fn rar_datetime(file_time: u32) -> Option<DateTime<Utc>> {
    if file_time == 0 {
        return None;
    }
    let time = file_time & 0xFFFF;
    let date = file_time >> 16;
    dos_datetime(
        ((date >> 9) & 0x7F) as u16 + 1980,
        ((date >> 5) & 0x0F) as u8,
        (date & 0x1F) as u8,
        ((time >> 11) & 0x1F) as u8,
        ((time >> 5) & 0x3F) as u8,
        ((time & 0x1F) * 2) as u8,
    )
}

impl ArchiveBackend for RarBackend {
    fn entries(&mut self) -> Result<Vec<RawEntry>> {
        let archive = unrar::Archive::new(&self.path)
            .open_for_listing()
            .map_err(|e| FsError::CorruptArchive(format!("Failed to open RAR: {}", e)))?;

        let mut entries = Vec::new();
        for header in archive {
            let header =
                header.map_err(|e| FsError::CorruptArchive(format!("Failed to read RAR entry: {}", e)))?;
            let name = header.filename.to_string_lossy().to_string();

            entries.push(RawEntry {
                is_dir: header.is_directory(),
                size: header.unpacked_size,
                modified: rar_datetime(header.file_time),
                handle: EntryHandle::Name(name.clone()),
                name,
            });
        }

        Ok(entries)
    }

    fn extract(&mut self, handle: &EntryHandle, sink: &mut dyn Write) -> Result<u64> {
        let EntryHandle::Name(target) = handle else {
            return Err(FsError::Archive("RAR entries are addressed by name".into()));
        };

        let mut cursor = unrar::Archive::new(&self.path)
            .open_for_processing()
            .map_err(|e| FsError::Archive(format!("Failed to open RAR: {}", e)))?;

        loop {
            let header = cursor
                .read_header()
                .map_err(|e| FsError::Archive(format!("Failed to read RAR header: {}", e)))?;

            let Some(header) = header else {
                return Err(FsError::NotFound(target.clone()));
            };

            if header.entry().filename.to_string_lossy() == target.as_str() {
                let (data, _rest) = header
                    .read()
                    .map_err(|e| FsError::Archive(format!("Failed to extract: {}", e)))?;
                sink.write_all(&data)?;
                return Ok(data.len() as u64);
            }

            cursor = header
                .skip()
                .map_err(|e| FsError::Archive(format!("Failed to skip entry: {}", e)))?;
        }
    }
}
