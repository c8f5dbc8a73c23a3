//! File thumbnails: pictures decoded once, movies sampled into frames

use crate::config::{MovieConfig, ThumbnailConfig};
use crate::AppError;
use app_db::{ThumbnailRecord, ThumbnailStore};
use app_fs::{NestedPath, VfsEntry, VirtualFileSystem};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::movie::{FfmpegTools, FrameSource, MovieSampler};
use super::picture::render_picture;
use super::{FailReason, FileIdentity, ThumbnailOptions, ThumbnailResult, ThumbnailStats};

#[derive(Debug, Clone, Copy)]
enum MediaKind {
    Picture,
    Movie,
}

/// Thumbnail generator for files (pictures and movies)
pub struct FileThumbnailGenerator {
    vfs: Arc<VirtualFileSystem>,
    store: Arc<ThumbnailStore>,
    config: ThumbnailConfig,
    sampler: MovieSampler,
    cache_hits: AtomicU64,
    decodes: AtomicU64,
    failures: AtomicU64,
}

impl FileThumbnailGenerator {
    /// Generator sampling movies with ffprobe/ffmpeg
    pub fn new(
        vfs: Arc<VirtualFileSystem>,
        store: Arc<ThumbnailStore>,
        config: ThumbnailConfig,
        movie: MovieConfig,
    ) -> Self {
        let tools = Arc::new(FfmpegTools::new(&movie));
        Self::with_frame_source(vfs, store, config, movie, tools)
    }

    pub fn with_frame_source(
        vfs: Arc<VirtualFileSystem>,
        store: Arc<ThumbnailStore>,
        config: ThumbnailConfig,
        movie: MovieConfig,
        source: Arc<dyn FrameSource>,
    ) -> Self {
        Self {
            vfs,
            store,
            config,
            sampler: MovieSampler::new(source, movie),
            cache_hits: AtomicU64::new(0),
            decodes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Cached or freshly generated thumbnail for `file`
    ///
    /// "Not a picture or movie" and cancellation are `Failed` results; only
    /// unexpected I/O, decoder and store errors come back as `Err`.
    pub async fn generate(
        &self,
        file: &VfsEntry,
        options: ThumbnailOptions,
        cache_only: bool,
        cancel: &CancellationToken,
    ) -> Result<ThumbnailResult, AppError> {
        if file.is_dir() {
            return Ok(ThumbnailResult::Failed(FailReason::NotSupported));
        }

        // the caller's entry may predate a rewrite of the file
        let live = self.vfs.stat(&file.path).await?;
        if live.is_dir() {
            return Ok(ThumbnailResult::Failed(FailReason::NotSupported));
        }
        let identity = FileIdentity::new(live.path.clone(), live.size, live.modified);
        if let Some(contents) = self.lookup(&identity, options).await? {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Thumbnail cache hit: {}", file.path);
            return Ok(ThumbnailResult::Succeeded(contents));
        }

        if cache_only {
            return Ok(ThumbnailResult::Failed(FailReason::CacheMiss));
        }

        let Some(kind) = self.media_kind(&file.path) else {
            return Ok(ThumbnailResult::Failed(FailReason::NotSupported));
        };

        self.decodes.fetch_add(1, Ordering::Relaxed);
        let decoded = match kind {
            MediaKind::Picture => self.decode_picture(&file.path, options, cancel).await,
            MediaKind::Movie => self.decode_movie(&file.path, options, cancel).await,
        };

        match decoded {
            Ok(contents) => {
                self.save(ThumbnailRecord {
                    identity,
                    options,
                    contents: contents.clone(),
                })
                .await;
                Ok(ThumbnailResult::Succeeded(contents))
            }
            Err(AppError::Cancelled) => {
                tracing::debug!("Thumbnail cancelled: {}", file.path);
                Ok(ThumbnailResult::Failed(FailReason::Cancelled))
            }
            Err(e @ (AppError::UnsupportedFormat(_) | AppError::Media(_))) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("No thumbnail for {}: {}", file.path, e);
                Ok(ThumbnailResult::Failed(FailReason::NotSupported))
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                tracing::error!("Thumbnail generation failed for {}: {}", file.path, e);
                Err(e)
            }
        }
    }

    fn media_kind(&self, path: &NestedPath) -> Option<MediaKind> {
        let ext = path.extension()?;
        if self.config.is_movie(&ext) {
            Some(MediaKind::Movie)
        } else if self.config.is_picture(&ext) {
            Some(MediaKind::Picture)
        } else {
            None
        }
    }

    async fn decode_picture(
        &self,
        path: &NestedPath,
        options: ThumbnailOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<u8>>, AppError> {
        let bytes = self.vfs.read(path, cancel).await?;
        let png = tokio::task::spawn_blocking(move || render_picture(&bytes, options))
            .await
            .map_err(join_error)??;
        Ok(vec![png])
    }

    /// External tools need a real path; in-archive movies are extracted
    /// first and the handle is held until sampling finishes
    async fn decode_movie(
        &self,
        path: &NestedPath,
        options: ThumbnailOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<u8>>, AppError> {
        let extracted = self.vfs.try_extract_file(path, cancel).await?;
        let physical = match &extracted {
            Some(file) => file.path().to_path_buf(),
            None => path.physical_path().to_path_buf(),
        };

        let frames = self.sampler.sample(&physical, options, cancel).await;
        drop(extracted);
        frames
    }

    async fn lookup(
        &self,
        identity: &FileIdentity,
        options: ThumbnailOptions,
    ) -> Result<Option<Vec<Vec<u8>>>, AppError> {
        let store = self.store.clone();
        let identity = identity.clone();
        let contents = tokio::task::spawn_blocking(move || store.get(&identity, options))
            .await
            .map_err(join_error)??;
        Ok(contents)
    }

    async fn save(&self, record: ThumbnailRecord) {
        let store = self.store.clone();
        let path = record.identity.path.clone();
        let saved = tokio::task::spawn_blocking(move || store.put(&record)).await;
        match saved {
            Ok(Ok(())) => tracing::debug!("Thumbnail cached: {}", path),
            Ok(Err(e)) => tracing::warn!("Failed to cache thumbnail for {}: {}", path, e),
            Err(e) => tracing::warn!("Thumbnail cache task failed for {}: {}", path, e),
        }
    }

    pub fn stats(&self) -> ThumbnailStats {
        ThumbnailStats {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            decodes: self.decodes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

fn join_error(e: tokio::task::JoinError) -> AppError {
    AppError::Io(std::io::Error::new(std::io::ErrorKind::Other, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thumbnail::movie::tests::FakeFrames;
    use crate::thumbnail::picture::encoded_dimensions;
    use crate::thumbnail::picture::tests::solid_png;
    use crate::thumbnail::ResizeMode;
    use app_fs::VfsOptions;
    use std::io::Write;
    use std::path::Path;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    struct Fixture {
        generator: FileThumbnailGenerator,
        vfs: Arc<VirtualFileSystem>,
        frames: Arc<FakeFrames>,
        dir: TempDir,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let vfs = Arc::new(VirtualFileSystem::new(&VfsOptions {
            temp_dir: dir.path().join("tmp"),
            ..Default::default()
        }));
        let store = Arc::new(ThumbnailStore::open(&dir.path().join("thumbs")).unwrap());
        let frames = Arc::new(FakeFrames::new(Some(Duration::from_secs(40))));
        let generator = FileThumbnailGenerator::with_frame_source(
            vfs.clone(),
            store,
            ThumbnailConfig::default(),
            MovieConfig::default(),
            frames.clone(),
        );
        Fixture {
            generator,
            vfs,
            frames,
            dir,
        }
    }

    impl Fixture {
        async fn entry(&self, path: &NestedPath) -> VfsEntry {
            self.vfs.stat(path).await.unwrap()
        }

        fn physical(&self, name: &str) -> NestedPath {
            NestedPath::physical(self.dir.path().join(name)).unwrap()
        }

        async fn generate(&self, path: &NestedPath, cache_only: bool) -> ThumbnailResult {
            let entry = self.entry(path).await;
            self.generator
                .generate(&entry, options(), cache_only, &CancellationToken::new())
                .await
                .unwrap()
        }
    }

    fn options() -> ThumbnailOptions {
        ThumbnailOptions::new(128, 128, ResizeMode::Pad)
    }

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = std::fs::File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        for (name, data) in entries {
            writer
                .start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }

    fn set_mtime(path: &Path, time: SystemTime) {
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(time).unwrap();
    }

    #[tokio::test]
    async fn test_second_request_is_cached() {
        let fx = fixture();
        std::fs::write(fx.dir.path().join("a.png"), solid_png(64, 48, [9, 9, 9, 255])).unwrap();
        let path = fx.physical("a.png");

        let first = fx.generate(&path, false).await;
        let second = fx.generate(&path, false).await;

        assert!(first.is_success());
        assert_eq!(first, second);
        let stats = fx.generator.stats();
        assert_eq!(stats.decodes, 1);
        assert_eq!(stats.cache_hits, 1);

        let contents = second.into_contents().unwrap();
        assert_eq!(contents.len(), 1);
        assert_eq!(encoded_dimensions(&contents[0]).unwrap(), (128, 128));
    }

    #[tokio::test]
    async fn test_changed_length_regenerates() {
        let fx = fixture();
        let file = fx.dir.path().join("a.png");
        std::fs::write(&file, solid_png(64, 48, [9, 9, 9, 255])).unwrap();
        let path = fx.physical("a.png");
        fx.generate(&path, false).await;

        std::fs::write(&file, solid_png(300, 20, [200, 9, 9, 255])).unwrap();
        let result = fx.generate(&path, false).await;

        assert!(result.is_success());
        assert_eq!(fx.generator.stats().decodes, 2);
        assert_eq!(fx.generator.stats().cache_hits, 0);
    }

    #[tokio::test]
    async fn test_reused_entry_sees_file_changes() {
        let fx = fixture();
        let file = fx.dir.path().join("a.png");
        std::fs::write(&file, solid_png(64, 48, [9, 9, 9, 255])).unwrap();
        let path = fx.physical("a.png");
        let entry = fx.entry(&path).await;
        let cancel = CancellationToken::new();

        let first = fx.generator.generate(&entry, options(), false, &cancel).await.unwrap();
        assert!(first.is_success());

        std::fs::write(&file, solid_png(300, 20, [200, 9, 9, 255])).unwrap();
        set_mtime(&file, SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000));
        let second = fx.generator.generate(&entry, options(), false, &cancel).await.unwrap();

        assert!(second.is_success());
        assert_ne!(first, second);
        assert_eq!(fx.generator.stats().decodes, 2);
        assert_eq!(fx.generator.stats().cache_hits, 0);

        // the stale entry still finds the regenerated record
        fx.generator.generate(&entry, options(), false, &cancel).await.unwrap();
        assert_eq!(fx.generator.stats().decodes, 2);
        assert_eq!(fx.generator.stats().cache_hits, 1);
    }

    #[tokio::test]
    async fn test_changed_mtime_regenerates() {
        let fx = fixture();
        let file = fx.dir.path().join("a.png");
        std::fs::write(&file, solid_png(64, 48, [9, 9, 9, 255])).unwrap();
        let path = fx.physical("a.png");
        fx.generate(&path, false).await;

        set_mtime(&file, SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000));
        fx.generate(&path, false).await;
        assert_eq!(fx.generator.stats().decodes, 2);

        fx.generate(&path, false).await;
        assert_eq!(fx.generator.stats().decodes, 2);
        assert_eq!(fx.generator.stats().cache_hits, 1);
    }

    #[tokio::test]
    async fn test_cache_only() {
        let fx = fixture();
        std::fs::write(fx.dir.path().join("a.png"), solid_png(8, 8, [0, 0, 0, 255])).unwrap();
        let path = fx.physical("a.png");

        assert_eq!(
            fx.generate(&path, true).await,
            ThumbnailResult::Failed(FailReason::CacheMiss)
        );
        assert_eq!(fx.generator.stats().decodes, 0);

        fx.generate(&path, false).await;
        assert!(fx.generate(&path, true).await.is_success());
    }

    #[tokio::test]
    async fn test_unsupported_files() {
        let fx = fixture();
        std::fs::write(fx.dir.path().join("notes.txt"), b"hello").unwrap();
        std::fs::write(fx.dir.path().join("broken.png"), b"not a png at all").unwrap();

        assert_eq!(
            fx.generate(&fx.physical("notes.txt"), false).await,
            ThumbnailResult::Failed(FailReason::NotSupported)
        );
        assert_eq!(fx.generator.stats().decodes, 0);

        assert_eq!(
            fx.generate(&fx.physical("broken.png"), false).await,
            ThumbnailResult::Failed(FailReason::NotSupported)
        );
        assert_eq!(fx.generator.stats().failures, 1);
    }

    #[tokio::test]
    async fn test_directory_is_not_a_file_thumbnail() {
        let fx = fixture();
        std::fs::create_dir(fx.dir.path().join("sub")).unwrap();
        assert_eq!(
            fx.generate(&fx.physical("sub"), false).await,
            ThumbnailResult::Failed(FailReason::NotSupported)
        );
    }

    #[tokio::test]
    async fn test_picture_inside_archive() {
        let fx = fixture();
        let png = solid_png(32, 64, [1, 2, 3, 255]);
        write_zip(&fx.dir.path().join("book.zip"), &[("pages/01.png", &png)]);
        let path = fx.physical("book.zip").combine("pages/01.png").unwrap();

        let result = fx.generate(&path, false).await;
        let contents = result.into_contents().unwrap();
        assert_eq!(encoded_dimensions(&contents[0]).unwrap(), (128, 128));
    }

    #[tokio::test]
    async fn test_movie_frames_are_cached_in_order() {
        let fx = fixture();
        std::fs::write(fx.dir.path().join("clip.mp4"), b"fake movie").unwrap();
        let path = fx.physical("clip.mp4");

        let contents = fx.generate(&path, false).await.into_contents().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(
            fx.frames.seen_paths.lock().as_slice(),
            &[path.physical_path().to_path_buf()]
        );

        let again = fx.generate(&path, false).await.into_contents().unwrap();
        assert_eq!(again, contents);
        assert_eq!(fx.generator.stats().decodes, 1);
    }

    #[tokio::test]
    async fn test_movie_inside_archive_is_extracted() {
        let fx = fixture();
        write_zip(&fx.dir.path().join("clips.zip"), &[("a/clip.mp4", b"fake movie")]);
        let path = fx.physical("clips.zip").combine("a/clip.mp4").unwrap();

        let contents = fx.generate(&path, false).await.into_contents().unwrap();
        assert_eq!(contents.len(), 3);

        let seen = fx.frames.seen_paths.lock()[0].clone();
        assert!(seen.starts_with(fx.dir.path().join("tmp")));
        assert_eq!(seen.extension().and_then(|e| e.to_str()), Some("mp4"));
    }

    #[tokio::test]
    async fn test_cancelled_request() {
        let fx = fixture();
        std::fs::write(fx.dir.path().join("a.png"), solid_png(8, 8, [0, 0, 0, 255])).unwrap();
        let entry = fx.entry(&fx.physical("a.png")).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = fx
            .generator
            .generate(&entry, options(), false, &cancel)
            .await
            .unwrap();
        assert_eq!(result, ThumbnailResult::Failed(FailReason::Cancelled));
        assert_eq!(fx.generator.stats().failures, 0);
    }
}
