//! Service wiring: the VFS, thumbnail store and generators built from one
//! configuration and torn down together

use crate::thumbnail::{DirectoryThumbnailGenerator, FileThumbnailGenerator};
use crate::{AppConfig, AppError};
use app_db::ThumbnailStore;
use app_fs::VirtualFileSystem;
use std::sync::Arc;

/// Core services shared by every front end
pub struct Services {
    pub vfs: Arc<VirtualFileSystem>,
    pub store: Arc<ThumbnailStore>,
    pub file_thumbnails: FileThumbnailGenerator,
    pub directory_thumbnails: DirectoryThumbnailGenerator,
}

impl Services {
    /// Build every service; must run inside a tokio runtime so the VFS
    /// shrink loop starts
    pub fn new(config: &AppConfig) -> Result<Self, AppError> {
        let vfs = Arc::new(VirtualFileSystem::new(&config.storage));
        let store = Arc::new(
            ThumbnailStore::open(&config.thumbnail.cache_dir)
                .map_err(|e| AppError::Init(format!("thumbnail store: {}", e)))?,
        );

        let file_thumbnails = FileThumbnailGenerator::new(
            vfs.clone(),
            store.clone(),
            config.thumbnail.clone(),
            config.movie.clone(),
        );
        let directory_thumbnails = DirectoryThumbnailGenerator::new(&config.thumbnail);

        Ok(Self {
            vfs,
            store,
            file_thumbnails,
            directory_thumbnails,
        })
    }

    /// Release archives and temp files held by the VFS
    pub fn shutdown(&self) {
        let stats = self.vfs.stats();
        tracing::debug!(
            "Shutting down ({} archives open, {} extracted files)",
            stats.provider.open_archives,
            stats.extracted_files
        );
        self.vfs.shutdown();
    }
}
