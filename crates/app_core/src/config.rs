//! Application configuration

use crate::AppError;
use app_fs::VfsOptions;
use app_log::LogConfig;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub storage: VfsOptions,
    pub thumbnail: ThumbnailConfig,
    pub movie: MovieConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailConfig {
    /// Persisted thumbnail store location
    pub cache_dir: PathBuf,
    /// Extensions decoded as pictures (lowercase, no dot)
    pub picture_extensions: Vec<String>,
    /// Extensions sampled as movies (lowercase, no dot)
    pub movie_extensions: Vec<String>,
    /// Folder glyph color, `#rrggbb`
    pub directory_icon_color: String,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            cache_dir: app_db::default_cache_dir(),
            picture_extensions: ["jpg", "jpeg", "png", "gif", "webp", "bmp", "ico", "tif", "tiff"]
                .into_iter()
                .map(String::from)
                .collect(),
            movie_extensions: ["mp4", "m4v", "mkv", "webm", "avi", "mov", "wmv", "flv", "mpg", "mpeg", "ts"]
                .into_iter()
                .map(String::from)
                .collect(),
            directory_icon_color: "#f2c14e".to_string(),
        }
    }
}

impl ThumbnailConfig {
    pub fn is_picture(&self, ext: &str) -> bool {
        self.picture_extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }

    pub fn is_movie(&self, ext: &str) -> bool {
        self.movie_extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }

    /// Parsed icon color; falls back to the default on malformed input
    pub fn icon_rgb(&self) -> [u8; 3] {
        parse_hex_color(&self.directory_icon_color).unwrap_or([0xf2, 0xc1, 0x4e])
    }
}

/// External media tools and frame sampling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MovieConfig {
    /// Duration probe executable
    pub ffprobe: PathBuf,
    /// Frame extractor executable
    pub ffmpeg: PathBuf,
    /// Lower bound of the sampling interval
    pub min_interval_secs: f64,
    /// Upper bound of sampled frames per movie
    pub max_image_count: u32,
    /// Concurrent frame-extractor processes
    pub workers: usize,
    /// Offsets this close to the end are skipped
    pub end_margin_secs: f64,
}

impl Default for MovieConfig {
    fn default() -> Self {
        Self {
            ffprobe: PathBuf::from("ffprobe"),
            ffmpeg: PathBuf::from("ffmpeg"),
            min_interval_secs: 10.0,
            max_image_count: 12,
            workers: 8,
            end_margin_secs: 1.0,
        }
    }
}

impl MovieConfig {
    /// At least 0.1s; unusable values fall back to the default
    pub fn min_interval(&self) -> Duration {
        seconds_or(self.min_interval_secs.max(0.1), Self::default().min_interval_secs)
    }

    /// Unusable values fall back to the default
    pub fn end_margin(&self) -> Duration {
        seconds_or(self.end_margin_secs.max(0.0), Self::default().end_margin_secs)
    }
}

/// `secs` as a Duration, or `fallback` when NaN, infinite or out of range
fn seconds_or(secs: f64, fallback: f64) -> Duration {
    Duration::try_from_secs_f64(secs)
        .or_else(|_| Duration::try_from_secs_f64(fallback))
        .unwrap_or_default()
}

fn parse_hex_color(s: &str) -> Option<[u8; 3]> {
    let hex = s.strip_prefix('#').unwrap_or(s);
    if hex.len() != 6 {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    Some([channel(0)?, channel(2)?, channel(4)?])
}

impl AppConfig {
    /// Load configuration from the default location
    pub fn load() -> Result<Self, AppError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a file; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self, AppError> {
        if !path.exists() {
            tracing::info!("Using default configuration");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;
        tracing::info!("Configuration loaded from {:?}", path);
        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<(), AppError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), AppError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(path, content)?;

        tracing::info!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path() -> PathBuf {
        ProjectDirs::from("com", "NestFiler", "NestFiler")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("./config.toml"))
    }
}
