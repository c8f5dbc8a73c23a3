//! Physical file system browsing (depth-1 paths)

use crate::{FsError, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

/// Metadata of one physical directory child
#[derive(Debug, Clone)]
pub(crate) struct PhysicalEntry {
    pub path: PathBuf,
    pub is_dir: bool,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

impl PhysicalEntry {
    pub fn from_path(path: PathBuf) -> Result<Self> {
        let metadata = fs::metadata(&path).map_err(|e| FsError::from_io(e, &path))?;
        Ok(Self {
            is_dir: metadata.is_dir(),
            size: if metadata.is_dir() { 0 } else { metadata.len() },
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            path,
        })
    }
}

/// Children of a physical directory, unsorted
pub(crate) fn read_children(path: &Path) -> Result<Vec<PhysicalEntry>> {
    if !path.is_dir() {
        return Err(if path.exists() {
            FsError::InvalidPath(format!("Not a directory: {}", path.display()))
        } else {
            FsError::NotFound(path.display().to_string())
        });
    }

    let mut entries = Vec::new();
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        match PhysicalEntry::from_path(entry.path()) {
            Ok(e) => entries.push(e),
            // dangling links and entries removed mid-listing
            Err(e) => tracing::debug!("Skipping {}: {}", entry.path().display(), e),
        }
    }

    Ok(entries)
}

/// Check if path is a root/drive
pub fn is_root<P: AsRef<Path>>(path: P) -> bool {
    let path = path.as_ref();

    #[cfg(windows)]
    {
        let s = path.to_string_lossy();
        s.len() <= 3 && (s.ends_with('\\') || s.ends_with('/'))
    }

    #[cfg(not(windows))]
    {
        path.parent().is_none()
    }
}

/// List available drives (Windows) or the single root
#[cfg(windows)]
pub fn list_drives() -> Vec<PathBuf> {
    (b'A'..=b'Z')
        .map(|letter| PathBuf::from(format!("{}:\\", letter as char)))
        .filter(|drive| drive.exists())
        .collect()
}

#[cfg(not(windows))]
pub fn list_drives() -> Vec<PathBuf> {
    vec![PathBuf::from("/")]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_children() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("file.txt"), b"12345").unwrap();

        let mut children = read_children(dir.path()).unwrap();
        children.sort_by(|a, b| a.path.cmp(&b.path));
        assert_eq!(children.len(), 2);
        assert!(!children[0].is_dir);
        assert_eq!(children[0].size, 5);
        assert!(children[1].is_dir);
    }

    #[test]
    fn test_read_children_errors() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("file.txt");
        fs::write(&file, b"x").unwrap();

        assert!(matches!(read_children(&file), Err(FsError::InvalidPath(_))));
        assert!(matches!(
            read_children(&dir.path().join("absent")),
            Err(FsError::NotFound(_))
        ));
    }

    #[test]
    fn test_roots() {
        let drives = list_drives();
        assert!(!drives.is_empty());
        assert!(drives.iter().all(|d| is_root(d)));
    }
}
