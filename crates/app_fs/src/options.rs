//! Storage configuration

use crate::encoding::NameEncoding;
use crate::provider::DEFAULT_EXTRACTOR_CAPACITY;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VfsOptions {
    /// Where nested archives and extracted files are materialized
    pub temp_dir: PathBuf,
    /// Maximum number of open archives after a shrink sweep
    pub extractor_capacity: usize,
    /// Period of the background shrink sweep
    pub shrink_interval_secs: u64,
    /// Zip entry-name decoding
    pub zip_name_encoding: NameEncoding,
}

impl Default for VfsOptions {
    fn default() -> Self {
        Self {
            temp_dir: std::env::temp_dir().join("nestfiler"),
            extractor_capacity: DEFAULT_EXTRACTOR_CAPACITY,
            shrink_interval_secs: 30,
            zip_name_encoding: NameEncoding::default(),
        }
    }
}

impl VfsOptions {
    pub fn shrink_interval(&self) -> Duration {
        Duration::from_secs(self.shrink_interval_secs.max(1))
    }
}
