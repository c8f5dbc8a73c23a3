//! NestFiler Core Domain Logic
//!
//! This crate contains:
//! - Configuration
//! - Error types
//! - Thumbnail pipeline (pictures, movies, directories)
//! - Service wiring

pub mod config;
pub mod error;
pub mod services;
pub mod thumbnail;

pub use config::{AppConfig, MovieConfig, ThumbnailConfig};
pub use error::AppError;
pub use services::Services;
pub use thumbnail::{
    DirectoryThumbnailGenerator, FailReason, FileIdentity, FileThumbnailGenerator, FrameSource,
    ResizeMode, ThumbnailFormat, ThumbnailOptions, ThumbnailResult, ThumbnailStats,
};
