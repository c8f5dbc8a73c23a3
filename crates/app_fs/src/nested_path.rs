//! NestedPath - a traversal through zero or more nested archive boundaries

use crate::{FsError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use xxhash_rust::xxh3::xxh3_64;

/// Separator used by `Display` and `FromStr` between segments
pub const SEGMENT_SEPARATOR: &str = "::";

/// An ordered, immutable sequence of path segments
///
/// - Segment 0 is a normalized absolute physical path
/// - Each further segment is an entry path inside the archive addressed by
///   all prior segments
/// - A trailing empty segment treats the preceding archive file as a
///   directory root
///
/// Equality and ordering are structural, so a `NestedPath` can be used as a
/// cache key directly.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct NestedPath {
    segments: Vec<String>,
}

impl NestedPath {
    /// Build a path from raw segments, normalizing each one
    pub fn new<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut iter = segments.into_iter();
        let first = iter
            .next()
            .ok_or_else(|| FsError::InvalidPath("empty segment sequence".into()))?;

        let mut normalized = vec![normalize_physical(Path::new(first.as_ref()))?];
        for segment in iter {
            normalized.push(normalize_entry(segment.as_ref())?);
        }

        Ok(Self { segments: normalized })
    }

    /// A depth-1 path addressing a physical file or directory
    pub fn physical<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            segments: vec![normalize_physical(path.as_ref())?],
        })
    }

    /// Append one segment
    pub fn combine(&self, segment: &str) -> Result<Self> {
        let mut segments = self.segments.clone();
        segments.push(normalize_entry(segment)?);
        Ok(Self { segments })
    }

    /// Treat this (archive) file as a directory root
    pub fn as_directory(&self) -> Self {
        if self.is_archive_root() {
            return self.clone();
        }
        let mut segments = self.segments.clone();
        segments.push(String::new());
        Self { segments }
    }

    /// Drop the last segment; `None` at depth 1
    pub fn parent(&self) -> Option<Self> {
        if self.segments.len() < 2 {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// The logical parent directory: the containing physical directory at
    /// depth 1, the containing in-archive directory otherwise
    pub fn parent_directory(&self) -> Option<Self> {
        if self.depth() == 1 {
            let parent = Path::new(&self.segments[0]).parent()?;
            return Self::physical(parent).ok();
        }

        let last = self.last_segment();
        let mut segments = self.segments[..self.segments.len() - 1].to_vec();
        if last.is_empty() {
            // archive root -> directory holding the archive file
            return Self { segments }.parent_directory();
        }
        segments.push(
            last.rsplit_once('/')
                .map(|(dir, _)| dir.to_string())
                .unwrap_or_default(),
        );
        Some(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments (1 = physical)
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn last_segment(&self) -> &str {
        // segments is never empty
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    /// Physical path of segment 0
    pub fn physical_path(&self) -> &Path {
        Path::new(&self.segments[0])
    }

    /// Does this path end with the "archive as directory" marker?
    pub fn is_archive_root(&self) -> bool {
        self.segments.len() > 1 && self.last_segment().is_empty()
    }

    /// Name of the last element (file or directory name)
    pub fn file_name(&self) -> &str {
        Self::file_name_of(&self.segments)
    }

    // Borrowing form of `file_name`; the parent is `segments[..len - 1]`
    fn file_name_of(segments: &[String]) -> &str {
        let last = segments.last().map(String::as_str).unwrap_or_default();
        if last.is_empty() && segments.len() >= 2 {
            return Self::file_name_of(&segments[..segments.len() - 1]);
        }
        last.rsplit('/').next().unwrap_or(last)
    }

    /// Lowercased extension of the last segment
    pub fn extension(&self) -> Option<String> {
        let name = self.file_name();
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_lowercase())
    }

    /// Stable hash of the canonical string form
    pub fn id(&self) -> u64 {
        xxh3_64(self.to_string().as_bytes())
    }

    /// Is `self` a proper prefix of `other`?
    pub fn is_prefix_of(&self, other: &NestedPath) -> bool {
        self.segments.len() < other.segments.len()
            && other.segments[..self.segments.len()] == self.segments[..]
    }

    /// All prefixes from depth 1 up to and including `self`
    pub fn prefixes(&self) -> impl Iterator<Item = NestedPath> + '_ {
        (1..=self.segments.len()).map(move |n| NestedPath {
            segments: self.segments[..n].to_vec(),
        })
    }
}

/// Normalize the physical root: absolute, `.`/`..` resolved, forward slashes
fn normalize_physical(path: &Path) -> Result<String> {
    if path.as_os_str().is_empty() {
        return Err(FsError::InvalidPath("empty physical path".into()));
    }

    let absolute: PathBuf = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::ParentDir => {
                normalized.pop();
            }
            Component::CurDir => {}
            other => normalized.push(other),
        }
    }

    let mut display = normalized.to_string_lossy().replace('\\', "/");
    while display.len() > 1 && display.ends_with('/') && !display.ends_with(":/") {
        display.pop();
    }
    Ok(display)
}

/// Normalize an in-archive entry path: forward slashes, no leading or
/// trailing slash, `.` dropped, `..` may not climb above the archive root
pub(crate) fn normalize_entry(segment: &str) -> Result<String> {
    let mut parts: Vec<&str> = Vec::new();
    for part in segment.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return Err(FsError::InvalidPath(format!(
                        "entry escapes archive root: {}",
                        segment
                    )));
                }
            }
            other => parts.push(other),
        }
    }
    Ok(parts.join("/"))
}

impl fmt::Display for NestedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join(SEGMENT_SEPARATOR))
    }
}

impl FromStr for NestedPath {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s.split(SEGMENT_SEPARATOR))
    }
}

impl TryFrom<Vec<String>> for NestedPath {
    type Error = FsError;

    fn try_from(segments: Vec<String>) -> Result<Self> {
        Self::new(segments)
    }
}

impl From<NestedPath> for Vec<String> {
    fn from(path: NestedPath) -> Self {
        path.segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> String {
        std::env::temp_dir().join("books.zip").to_string_lossy().to_string()
    }

    #[test]
    fn test_empty_is_invalid() {
        let err = NestedPath::new(Vec::<String>::new()).unwrap_err();
        assert!(matches!(err, FsError::InvalidPath(_)));
    }

    #[test]
    fn test_combine_and_parent() {
        let archive = NestedPath::physical(root()).unwrap();
        let inner = archive.combine("vol1/inner.zip").unwrap();
        let leaf = inner.combine("page01.png").unwrap();

        assert_eq!(leaf.depth(), 3);
        assert_eq!(leaf.parent().unwrap(), inner);
        assert_eq!(inner.parent().unwrap(), archive);
        assert!(archive.parent().is_none());
        assert_eq!(leaf.last_segment(), "page01.png");
        assert_eq!(leaf.extension().as_deref(), Some("png"));
    }

    #[test]
    fn test_entry_normalization() {
        let archive = NestedPath::physical(root()).unwrap();
        let p = archive.combine("\\a\\.\\b\\c.txt/").unwrap();
        assert_eq!(p.last_segment(), "a/b/c.txt");

        let p = archive.combine("a/../b.txt").unwrap();
        assert_eq!(p.last_segment(), "b.txt");

        assert!(archive.combine("../outside.txt").is_err());
    }

    #[test]
    fn test_archive_root_marker() {
        let archive = NestedPath::physical(root()).unwrap();
        let dir = archive.as_directory();
        assert!(dir.is_archive_root());
        assert_eq!(dir.depth(), 2);
        assert_eq!(dir.as_directory(), dir);
        assert_eq!(dir.file_name(), "books.zip");
        assert_eq!(dir.extension().as_deref(), Some("zip"));
    }

    #[test]
    fn test_parent_directory() {
        let archive = NestedPath::physical(root()).unwrap();
        let leaf = archive.combine("a/b/c.txt").unwrap();
        let dir = leaf.parent_directory().unwrap();
        assert_eq!(dir.last_segment(), "a/b");

        let top = archive.combine("c.txt").unwrap();
        assert!(top.parent_directory().unwrap().is_archive_root());

        let holder = archive.as_directory().parent_directory().unwrap();
        assert_eq!(holder.depth(), 1);
    }

    #[test]
    fn test_structural_equality_and_ordering() {
        let a = NestedPath::new([root().as_str(), "x/y.txt"]).unwrap();
        let b = NestedPath::new([root().as_str(), "x\\y.txt"]).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.id(), b.id());

        let c = NestedPath::new([root().as_str(), "x/z.txt"]).unwrap();
        assert!(a < c);
    }

    #[test]
    fn test_display_round_trip() {
        let p = NestedPath::new([root().as_str(), "inner.7z", "pic.jpg"]).unwrap();
        let parsed: NestedPath = p.to_string().parse().unwrap();
        assert_eq!(parsed, p);
    }

    #[test]
    fn test_prefixes() {
        let p = NestedPath::new([root().as_str(), "inner.7z", "pic.jpg"]).unwrap();
        let prefixes: Vec<_> = p.prefixes().collect();
        assert_eq!(prefixes.len(), 3);
        assert!(prefixes[0].is_prefix_of(&p));
        assert!(prefixes[1].is_prefix_of(&p));
        assert!(!prefixes[2].is_prefix_of(&p));
    }
}
