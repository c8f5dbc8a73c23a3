//! Thumbnail cache record types

use app_fs::NestedPath;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Validity key of a cached thumbnail: (logical path, length, mtime)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileIdentity {
    pub path: NestedPath,
    pub length: u64,
    pub modified: DateTime<Utc>,
}

impl FileIdentity {
    pub fn new(path: NestedPath, length: u64, modified: DateTime<Utc>) -> Self {
        Self {
            path,
            length,
            modified,
        }
    }

    /// Does the live file still match this identity?
    pub fn matches(&self, other: &FileIdentity) -> bool {
        self.path == other.path && self.length == other.length && self.modified == other.modified
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeMode {
    /// Fit inside the box, pad the rest with transparency
    #[default]
    Pad,
    /// Fill the box, cropping the overflow
    Crop,
}

impl ResizeMode {
    fn tag(self) -> u8 {
        match self {
            Self::Pad => 0,
            Self::Crop => 1,
        }
    }
}

impl std::str::FromStr for ResizeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pad" => Ok(Self::Pad),
            "crop" => Ok(Self::Crop),
            other => Err(format!("unknown resize mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThumbnailFormat {
    #[default]
    Png,
}

impl ThumbnailFormat {
    fn tag(self) -> u8 {
        match self {
            Self::Png => 0,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
        }
    }
}

/// Requested thumbnail box and encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThumbnailOptions {
    pub width: u32,
    pub height: u32,
    pub mode: ResizeMode,
    pub format: ThumbnailFormat,
}

impl ThumbnailOptions {
    pub fn new(width: u32, height: u32, mode: ResizeMode) -> Self {
        Self {
            width,
            height,
            mode,
            format: ThumbnailFormat::Png,
        }
    }

    /// Fixed-width binary form used inside store keys
    pub(crate) fn to_key_bytes(self) -> [u8; 10] {
        let mut key = [0u8; 10];
        key[0..4].copy_from_slice(&self.width.to_be_bytes());
        key[4..8].copy_from_slice(&self.height.to_be_bytes());
        key[8] = self.mode.tag();
        key[9] = self.format.tag();
        key
    }
}

impl Default for ThumbnailOptions {
    fn default() -> Self {
        Self::new(256, 256, ResizeMode::Pad)
    }
}

/// Persisted value: identity and options it was produced for, plus the
/// encoded images (several for movies, ordered by source timestamp)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbnailRecord {
    pub identity: FileIdentity,
    pub options: ThumbnailOptions,
    pub contents: Vec<Vec<u8>>,
}
