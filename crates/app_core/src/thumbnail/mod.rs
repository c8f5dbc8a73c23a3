//! Thumbnail pipeline
//!
//! - `FileThumbnailGenerator`: pictures and movies, cached in the persisted
//!   store by file identity and options
//! - `DirectoryThumbnailGenerator`: a fixed folder glyph per options
//!
//! Both walk `NoResult -> CacheHit | Miss -> Decoding -> Succeeded | Failed`.

mod directory;
mod file;
mod movie;
mod picture;

pub use app_db::{FileIdentity, ResizeMode, ThumbnailFormat, ThumbnailOptions};
pub use directory::DirectoryThumbnailGenerator;
pub use file::FileThumbnailGenerator;
pub use movie::{parse_duration, sample_offsets, FfmpegTools, FrameSource, MovieSampler};
pub use picture::{encoded_dimensions, render_image, render_picture};

/// Why a thumbnail was not produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailReason {
    /// `cache_only` was requested and nothing valid was cached
    CacheMiss,
    /// Not a picture or movie, or the decoder rejected it
    NotSupported,
    /// The caller cancelled
    Cancelled,
}

/// Terminal state of one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThumbnailResult {
    /// Encoded images; several for movies, ordered by source timestamp
    Succeeded(Vec<Vec<u8>>),
    Failed(FailReason),
}

impl ThumbnailResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ThumbnailResult::Succeeded(_))
    }

    pub fn contents(&self) -> Option<&[Vec<u8>]> {
        match self {
            ThumbnailResult::Succeeded(contents) => Some(contents),
            ThumbnailResult::Failed(_) => None,
        }
    }

    pub fn into_contents(self) -> Option<Vec<Vec<u8>>> {
        match self {
            ThumbnailResult::Succeeded(contents) => Some(contents),
            ThumbnailResult::Failed(_) => None,
        }
    }
}

/// Counters of a file generator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThumbnailStats {
    pub cache_hits: u64,
    /// Decode attempts (pictures and movies)
    pub decodes: u64,
    pub failures: u64,
}
