//! Archive extractor: one open archive plus a precomputed entry index

mod rar;
mod sevenz;
mod tar;
mod zip;

use crate::encoding::EntryNameDecoder;
use crate::nested_path::normalize_entry;
use crate::{FsError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempPath;

/// Supported archive formats, detected by extension only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    Zip,
    SevenZip,
    Rar,
    Tar,
    TarGz,
}

impl ArchiveFormat {
    /// Detect the format from a single, case-insensitive extension
    ///
    /// A bare `gz` is not an archive; gzip-compressed tar is recognized by
    /// `tgz` or by the full name (see [`ArchiveFormat::from_file_name`]).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "zip" | "cbz" | "epub" => Some(ArchiveFormat::Zip),
            "7z" | "cb7" => Some(ArchiveFormat::SevenZip),
            "rar" | "cbr" => Some(ArchiveFormat::Rar),
            "tar" | "cbt" => Some(ArchiveFormat::Tar),
            "tgz" => Some(ArchiveFormat::TarGz),
            _ => None,
        }
    }

    /// Detect the format from a file name, including `.tar.gz`
    pub fn from_file_name(name: &str) -> Option<Self> {
        archive_suffix(name).and_then(|suffix| match suffix.as_str() {
            TAR_GZ_SUFFIX => Some(ArchiveFormat::TarGz),
            other => Self::from_extension(&other[1..]),
        })
    }

    /// Detect the format of a file path
    pub fn from_path(path: &Path) -> Option<Self> {
        path.file_name()
            .and_then(|n| n.to_str())
            .and_then(Self::from_file_name)
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "ZIP",
            ArchiveFormat::SevenZip => "7Z",
            ArchiveFormat::Rar => "RAR",
            ArchiveFormat::Tar => "TAR",
            ArchiveFormat::TarGz => "TAR.GZ",
        }
    }
}

const TAR_GZ_SUFFIX: &str = ".tar.gz";

/// Lowercase suffix identifying `name` as an archive (`.zip`, `.tar.gz`, ...)
///
/// Temp copies of nested archives keep this suffix so they are detected
/// the same way.
pub(crate) fn archive_suffix(name: &str) -> Option<String> {
    let lower = name.to_lowercase();
    if lower.ends_with(TAR_GZ_SUFFIX) && lower.len() > TAR_GZ_SUFFIX.len() {
        return Some(TAR_GZ_SUFFIX.to_string());
    }
    let (stem, ext) = lower.rsplit_once('.')?;
    if stem.is_empty() || ArchiveFormat::from_extension(ext).is_none() {
        return None;
    }
    Some(format!(".{}", ext))
}

/// Is this extension one of the archive extensions?
pub fn is_archive_extension(ext: &str) -> bool {
    ArchiveFormat::from_extension(ext).is_some()
}

/// Does this file name denote a browsable archive?
pub fn is_archive_name(name: &str) -> bool {
    ArchiveFormat::from_file_name(name).is_some()
}

/// Backend-specific locator of an entry's data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryHandle {
    /// Position in the archive's own entry table
    Index(usize),
    /// Name exactly as stored in the archive
    Name(String),
}

/// Indexed file entry
#[derive(Debug, Clone)]
pub struct EntryRef {
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub handle: EntryHandle,
}

/// One entry as enumerated by a backend, before normalization
#[derive(Debug, Clone)]
pub(crate) struct RawEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub handle: EntryHandle,
}

/// Format-specific reading
pub(crate) trait ArchiveBackend: Send {
    /// Enumerate every entry once
    fn entries(&mut self) -> Result<Vec<RawEntry>>;

    /// Copy one entry's data into `sink`, returning the byte count
    fn extract(&mut self, handle: &EntryHandle, sink: &mut dyn Write) -> Result<u64>;
}

#[derive(Debug, Default)]
struct EntryIndex {
    files: BTreeMap<String, EntryRef>,
    dirs: BTreeSet<String>,
}

impl EntryIndex {
    fn build(raw: Vec<RawEntry>) -> Self {
        let mut index = EntryIndex::default();

        for entry in raw {
            let name = match normalize_entry(&entry.name) {
                Ok(name) if !name.is_empty() => name,
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!("Skipping archive entry {:?}: {}", entry.name, e);
                    continue;
                }
            };

            if entry.is_dir {
                index.dirs.insert(name);
            } else {
                index.files.insert(
                    name,
                    EntryRef {
                        size: entry.size,
                        modified: entry.modified,
                        handle: entry.handle,
                    },
                );
            }
        }

        // Every ancestor of every entry must be a directory
        let mut ancestors = Vec::new();
        for path in index.files.keys().chain(index.dirs.iter()) {
            let mut current = path.as_str();
            while let Some((parent, _)) = current.rsplit_once('/') {
                ancestors.push(parent.to_string());
                current = parent;
            }
        }
        index.dirs.extend(ancestors);

        index
    }
}

/// Immediate parent of an in-archive path ("" for top-level entries)
pub(crate) fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}

/// An open archive serving read-only queries from its entry index
pub struct ArchiveExtractor {
    path: PathBuf,
    format: ArchiveFormat,
    modified: DateTime<Utc>,
    backend: Mutex<Option<Box<dyn ArchiveBackend>>>,
    index: RwLock<EntryIndex>,
    /// Temp file this archive was extracted to, removed after the backend
    /// handle is closed
    backing: Mutex<Option<TempPath>>,
}

impl ArchiveExtractor {
    /// Open an archive and index it
    ///
    /// A missing or unreadable file is an error; an archive whose index
    /// cannot be built opens as an empty container.
    pub fn open<P: AsRef<Path>>(path: P, decoder: Arc<dyn EntryNameDecoder>) -> Result<Self> {
        let path = path.as_ref();
        let format = ArchiveFormat::from_path(path)
            .ok_or_else(|| FsError::UnsupportedFormat(path.display().to_string()))?;

        let metadata = std::fs::metadata(path).map_err(|e| FsError::from_io(e, path))?;
        let modified = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        let (backend, index) = match Self::open_backend(path, format, decoder) {
            Ok(found) => found,
            Err(FsError::Io(e)) => return Err(FsError::Io(e)),
            Err(e) => {
                tracing::warn!("Corrupt archive {}: {}", path.display(), e);
                (None, EntryIndex::default())
            }
        };

        tracing::debug!(
            "Opened {} archive {} ({} files, {} dirs)",
            format.display_name(),
            path.display(),
            index.files.len(),
            index.dirs.len()
        );

        Ok(Self {
            path: path.to_path_buf(),
            format,
            modified,
            backend: Mutex::new(backend),
            index: RwLock::new(index),
            backing: Mutex::new(None),
        })
    }

    fn open_backend(
        path: &Path,
        format: ArchiveFormat,
        decoder: Arc<dyn EntryNameDecoder>,
    ) -> Result<(Option<Box<dyn ArchiveBackend>>, EntryIndex)> {
        let mut backend: Box<dyn ArchiveBackend> = match format {
            ArchiveFormat::Zip => Box::new(zip::ZipBackend::open(path, decoder)?),
            ArchiveFormat::SevenZip => Box::new(sevenz::SevenZipBackend::open(path)?),
            ArchiveFormat::Rar => Box::new(rar::RarBackend::open(path)?),
            ArchiveFormat::Tar => Box::new(tar::TarBackend::open(path, false)?),
            ArchiveFormat::TarGz => Box::new(tar::TarBackend::open(path, true)?),
        };
        let index = EntryIndex::build(backend.entries()?);
        Ok((Some(backend), index))
    }

    /// Open an archive that lives in a temp file; the file is removed when
    /// the extractor is closed or dropped
    pub(crate) fn open_temp(backing: TempPath, decoder: Arc<dyn EntryNameDecoder>) -> Result<Self> {
        let extractor = Self::open(&backing, decoder)?;
        *extractor.backing.lock() = Some(backing);
        Ok(extractor)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> ArchiveFormat {
        self.format
    }

    /// Does a file or directory exist at this in-archive path?
    pub fn exists(&self, path: &str) -> bool {
        path.is_empty() || self.is_file(path) || self.is_directory(path)
    }

    pub fn is_file(&self, path: &str) -> bool {
        self.index.read().files.contains_key(path)
    }

    pub fn is_directory(&self, path: &str) -> bool {
        path.is_empty() || self.index.read().dirs.contains(path)
    }

    /// Files whose immediate parent is `dir`, in path order
    pub fn list_files(&self, dir: &str) -> Vec<String> {
        self.index
            .read()
            .files
            .keys()
            .filter(|p| parent_of(p) == dir)
            .cloned()
            .collect()
    }

    /// Directories whose immediate parent is `dir`, in path order
    pub fn list_directories(&self, dir: &str) -> Vec<String> {
        self.index
            .read()
            .dirs
            .iter()
            .filter(|p| parent_of(p) == dir)
            .cloned()
            .collect()
    }

    /// Every file in the archive
    pub fn all_files(&self) -> Vec<String> {
        self.index.read().files.keys().cloned().collect()
    }

    pub fn file_count(&self) -> usize {
        self.index.read().files.len()
    }

    pub fn entry(&self, path: &str) -> Result<EntryRef> {
        self.index
            .read()
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| self.not_found(path))
    }

    /// Uncompressed size of a file entry
    pub fn size(&self, path: &str) -> Result<u64> {
        Ok(self.entry(path)?.size)
    }

    /// Entry timestamp; directories and entries without one report the
    /// archive file's own timestamp
    pub fn last_write_time(&self, path: &str) -> Result<DateTime<Utc>> {
        if let Some(entry) = self.index.read().files.get(path) {
            return Ok(entry.modified.unwrap_or(self.modified));
        }
        if self.is_directory(path) {
            return Ok(self.modified);
        }
        Err(self.not_found(path))
    }

    /// Copy one file entry into `sink`
    pub fn extract_to(&self, path: &str, sink: &mut dyn Write) -> Result<u64> {
        let entry = self.entry(path)?;
        let mut backend = self.backend.lock();
        let backend = backend.as_mut().ok_or_else(|| self.not_found(path))?;
        backend.extract(&entry.handle, sink)
    }

    /// Read one file entry into memory
    pub fn open_stream(&self, path: &str) -> Result<Cursor<Vec<u8>>> {
        let size = self.size(path)?;
        let mut buffer = Vec::with_capacity(size.min(64 * 1024 * 1024) as usize);
        self.extract_to(path, &mut buffer)?;
        Ok(Cursor::new(buffer))
    }

    /// Close the archive handle and clear both indices
    pub fn close(&self) {
        self.backend.lock().take();
        *self.index.write() = EntryIndex::default();
        if let Some(backing) = self.backing.lock().take() {
            if let Err(e) = backing.close() {
                tracing::warn!("Failed to remove archive temp file: {}", e);
            }
        }
    }

    fn not_found(&self, path: &str) -> FsError {
        FsError::NotFound(format!("{}::{}", self.path.display(), path))
    }
}

impl Drop for ArchiveExtractor {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for ArchiveExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveExtractor")
            .field("path", &self.path)
            .field("format", &self.format)
            .field("files", &self.file_count())
            .finish()
    }
}

/// DOS date/time (as used by zip and rar headers) to UTC
pub(crate) fn dos_datetime(
    year: u16,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
) -> Option<DateTime<Utc>> {
    NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)?
        .and_hms_opt(hour as u32, minute as u32, second as u32)
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::encoding::FormatDefaultDecoder;
    use ::zip::write::SimpleFileOptions;
    use ::zip::ZipWriter;
    use std::io::Read;
    use tempfile::TempDir;

    /// Write a zip with the given (name, contents) entries; names ending in
    /// '/' become explicit directory entries
    pub(crate) fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = std::fs::File::create(path).unwrap();
        write_zip_to(file, entries);
    }

    pub(crate) fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        write_zip_to(&mut buffer, entries);
        buffer.into_inner()
    }

    fn write_zip_to<W: Write + std::io::Seek>(writer: W, entries: &[(&str, &[u8])]) {
        let mut zip = ZipWriter::new(writer);
        let options = SimpleFileOptions::default();
        for (name, data) in entries {
            if name.ends_with('/') {
                zip.add_directory(*name, options).unwrap();
            } else {
                zip.start_file(*name, options).unwrap();
                zip.write_all(data).unwrap();
            }
        }
        zip.finish().unwrap();
    }

    fn open(path: &Path) -> ArchiveExtractor {
        ArchiveExtractor::open(path, Arc::new(FormatDefaultDecoder)).unwrap()
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(ArchiveFormat::from_path(Path::new("a.zip")), Some(ArchiveFormat::Zip));
        assert_eq!(ArchiveFormat::from_path(Path::new("a.CBZ")), Some(ArchiveFormat::Zip));
        assert_eq!(ArchiveFormat::from_path(Path::new("a.7z")), Some(ArchiveFormat::SevenZip));
        assert_eq!(ArchiveFormat::from_path(Path::new("a.rar")), Some(ArchiveFormat::Rar));
        assert_eq!(ArchiveFormat::from_path(Path::new("a.png")), None);
    }

    #[test]
    fn test_gzip_needs_tar_name() {
        assert_eq!(ArchiveFormat::from_path(Path::new("logs/app.log.gz")), None);
        assert_eq!(ArchiveFormat::from_path(Path::new("a.TAR.GZ")), Some(ArchiveFormat::TarGz));
        assert_eq!(ArchiveFormat::from_path(Path::new("a.tgz")), Some(ArchiveFormat::TarGz));
        assert!(!is_archive_name("app.log.gz"));
        assert!(!is_archive_name(".tar.gz"));
        assert!(is_archive_name("backup.tar.gz"));

        assert_eq!(archive_suffix("Backup.Tar.Gz").as_deref(), Some(".tar.gz"));
        assert_eq!(archive_suffix("vol1.CBZ").as_deref(), Some(".cbz"));
        assert_eq!(archive_suffix("notes.txt"), None);
    }

    #[test]
    fn test_plain_gzip_is_not_opened() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log.gz");
        std::fs::write(&path, b"\x1f\x8b not really").unwrap();
        let err = ArchiveExtractor::open(&path, Arc::new(FormatDefaultDecoder)).unwrap_err();
        assert!(matches!(err, FsError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plain.txt");
        std::fs::write(&path, b"hello").unwrap();
        let err = ArchiveExtractor::open(&path, Arc::new(FormatDefaultDecoder)).unwrap_err();
        assert!(matches!(err, FsError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_implicit_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("implicit.zip");
        write_zip(&path, &[("a/b.txt", b"bee"), ("top.txt", b"top")]);

        let extractor = open(&path);
        assert!(extractor.list_directories("").contains(&"a".to_string()));
        assert!(extractor.list_files("a").contains(&"a/b.txt".to_string()));
        assert_eq!(extractor.list_files(""), vec!["top.txt".to_string()]);
        assert!(extractor.is_directory("a"));
        assert!(!extractor.is_file("a"));
    }

    #[test]
    fn test_ancestor_synthesis_covers_every_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("deep.zip");
        write_zip(
            &path,
            &[
                ("x/y/z/1.txt", b"1"),
                ("x/2.txt", b"2"),
                ("q/", b""),
                ("m/n/3.txt", b"3"),
            ],
        );

        let extractor = open(&path);
        for file in extractor.all_files() {
            let mut current = file.as_str();
            while let Some((parent, _)) = current.rsplit_once('/') {
                assert!(extractor.is_directory(parent), "missing {}", parent);
                current = parent;
            }
        }
        assert!(extractor.is_directory("q"));
        assert_eq!(extractor.list_directories("x"), vec!["x/y".to_string()]);
    }

    #[test]
    fn test_extracted_length_matches_index() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.zip");
        let payload = vec![7u8; 10_000];
        write_zip(&path, &[("blob.bin", &payload)]);

        let extractor = open(&path);
        let mut stream = extractor.open_stream("blob.bin").unwrap();
        let mut read_back = Vec::new();
        stream.read_to_end(&mut read_back).unwrap();
        assert_eq!(read_back.len() as u64, extractor.size("blob.bin").unwrap());
        assert_eq!(read_back, payload);
    }

    #[test]
    fn test_missing_entry_is_not_found() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.zip");
        write_zip(&path, &[("a.txt", b"a")]);

        let extractor = open(&path);
        assert!(matches!(extractor.size("nope.txt"), Err(FsError::NotFound(_))));
        let mut sink = Vec::new();
        assert!(matches!(
            extractor.extract_to("nope.txt", &mut sink),
            Err(FsError::NotFound(_))
        ));
    }

    #[test]
    fn test_corrupt_archive_is_empty_container() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.zip");
        std::fs::write(&path, b"this is not a zip file at all").unwrap();

        let extractor = open(&path);
        assert!(extractor.exists(""));
        assert!(extractor.list_files("").is_empty());
        assert!(extractor.list_directories("").is_empty());
    }

    #[test]
    fn test_missing_archive_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = ArchiveExtractor::open(dir.path().join("absent.zip"), Arc::new(FormatDefaultDecoder))
            .unwrap_err();
        assert!(matches!(err, FsError::NotFound(_) | FsError::Io(_)));
    }

    #[test]
    fn test_close_clears_indices() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.zip");
        write_zip(&path, &[("a/b.txt", b"b")]);

        let extractor = open(&path);
        extractor.close();
        assert!(extractor.all_files().is_empty());
        assert!(!extractor.is_directory("a"));
    }

    #[test]
    fn test_temp_backing_removed_on_close() {
        let dir = TempDir::new().unwrap();
        let file = tempfile::Builder::new()
            .suffix(".zip")
            .tempfile_in(dir.path())
            .unwrap();
        write_zip(file.path(), &[("a.txt", b"a")]);
        let temp_path = file.into_temp_path();
        let location = temp_path.to_path_buf();

        let extractor = ArchiveExtractor::open_temp(temp_path, Arc::new(FormatDefaultDecoder)).unwrap();
        assert!(extractor.is_file("a.txt"));
        assert!(location.exists());
        drop(extractor);
        assert!(!location.exists());
    }

    #[test]
    fn test_dos_datetime() {
        let dt = dos_datetime(2020, 2, 29, 12, 30, 10).unwrap();
        assert_eq!(dt.to_rfc3339(), "2020-02-29T12:30:10+00:00");
        assert!(dos_datetime(2021, 2, 29, 0, 0, 0).is_none());
    }
}
