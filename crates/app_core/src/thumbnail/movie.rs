//! Movie frame sampling through external media tools

use crate::config::MovieConfig;
use crate::AppError;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::picture::render_picture;
use super::ThumbnailOptions;

/// Source of movie metadata and single encoded frames
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Duration of the first video stream
    async fn duration(&self, path: &Path, cancel: &CancellationToken) -> Result<Duration, AppError>;

    /// One encoded frame at `offset`
    async fn frame_at(
        &self,
        path: &Path,
        offset: Duration,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, AppError>;

    /// Best-effort representative frame, used when sampling yields nothing
    async fn representative_frame(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, AppError>;
}

/// ffprobe/ffmpeg invoked as child processes
pub struct FfmpegTools {
    ffprobe: PathBuf,
    ffmpeg: PathBuf,
}

impl FfmpegTools {
    pub fn new(config: &MovieConfig) -> Self {
        Self {
            ffprobe: config.ffprobe.clone(),
            ffmpeg: config.ffmpeg.clone(),
        }
    }

    /// Run a tool to completion and return its stdout
    ///
    /// The child is killed when cancellation wins the race.
    async fn run(&self, mut cmd: Command, cancel: &CancellationToken) -> Result<Vec<u8>, AppError> {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let program = format!("{:?}", cmd.as_std().get_program());
        let child = cmd
            .spawn()
            .map_err(|e| AppError::Media(format!("failed to start {}: {}", program, e)))?;

        let output = tokio::select! {
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
            output = child.wait_with_output() => output?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::Media(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                stderr.trim()
            )));
        }
        if output.stdout.is_empty() {
            return Err(AppError::Media(format!("{} produced no output", program)));
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl FrameSource for FfmpegTools {
    async fn duration(&self, path: &Path, cancel: &CancellationToken) -> Result<Duration, AppError> {
        let mut cmd = Command::new(&self.ffprobe);
        cmd.args(["-v", "error", "-select_streams", "v:0"])
            .args(["-show_entries", "stream=duration", "-sexagesimal"])
            .args(["-of", "default=noprint_wrappers=1:nokey=1"])
            .arg(path);

        let stdout = self.run(cmd, cancel).await?;
        let text = String::from_utf8_lossy(&stdout);
        parse_duration(&text)
            .ok_or_else(|| AppError::Media(format!("unparseable duration {:?}", text.trim())))
    }

    async fn frame_at(
        &self,
        path: &Path,
        offset: Duration,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, AppError> {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-loglevel", "error"])
            .arg("-ss")
            .arg(format!("{:.3}", offset.as_secs_f64()))
            .arg("-i")
            .arg(path)
            .args(["-vframes", "1", "-f", "image2", "pipe:1"]);
        self.run(cmd, cancel).await
    }

    async fn representative_frame(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, AppError> {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-loglevel", "error", "-i"])
            .arg(path)
            .args(["-vf", "thumbnail", "-vframes", "1", "-f", "image2", "pipe:1"]);
        self.run(cmd, cancel).await
    }
}

/// Parse ffprobe's duration line: sexagesimal `H:MM:SS.ffffff` or plain
/// seconds
pub fn parse_duration(output: &str) -> Option<Duration> {
    let line = output.lines().map(str::trim).find(|l| !l.is_empty())?;

    let mut seconds = 0.0_f64;
    for part in line.split(':') {
        let value: f64 = part.parse().ok()?;
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        seconds = seconds * 60.0 + value;
    }

    Duration::try_from_secs_f64(seconds).ok()
}

/// Seek offsets for a movie of `duration`
///
/// interval = max(min_interval, duration / max_count); offsets are
/// `1*interval, 2*interval, ...` up to `duration / interval` of them, minus
/// any closer than `end_margin` to the end.
pub fn sample_offsets(
    duration: Duration,
    min_interval: Duration,
    max_count: u32,
    end_margin: Duration,
) -> Vec<Duration> {
    if duration.is_zero() || min_interval.is_zero() {
        return Vec::new();
    }

    let interval = min_interval.max(duration / max_count.max(1));
    let count = (duration.as_secs_f64() / interval.as_secs_f64()).floor() as u32;

    (1..=count)
        .map(|i| interval * i)
        .filter(|offset| *offset + end_margin < duration)
        .collect()
}

/// Bounded fan-out over seek offsets, joined in offset order
pub struct MovieSampler {
    source: Arc<dyn FrameSource>,
    config: MovieConfig,
}

impl MovieSampler {
    pub fn new(source: Arc<dyn FrameSource>, config: MovieConfig) -> Self {
        Self { source, config }
    }

    /// Rendered frames ordered by seek offset
    pub async fn sample(
        &self,
        path: &Path,
        options: ThumbnailOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<u8>>, AppError> {
        let offsets = match self.source.duration(path, cancel).await {
            Ok(duration) => sample_offsets(
                duration,
                self.config.min_interval(),
                self.config.max_image_count,
                self.config.end_margin(),
            ),
            Err(AppError::Cancelled) => return Err(AppError::Cancelled),
            Err(e) => {
                tracing::debug!("Duration probe failed for {:?}: {}", path, e);
                Vec::new()
            }
        };

        let mut frames = self.sample_at(path, &offsets, options, cancel).await?;
        if frames.is_empty() {
            tracing::debug!("No sampled frames for {:?}, using representative frame", path);
            let bytes = self.source.representative_frame(path, cancel).await?;
            frames.push(encode_frame(bytes, options).await?);
        }

        Ok(frames)
    }

    async fn sample_at(
        &self,
        path: &Path,
        offsets: &[Duration],
        options: ThumbnailOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<u8>>, AppError> {
        let workers = self.config.workers.max(1);

        // decode process and encode both run inside the bounded slot
        let results: Vec<(Duration, Result<Vec<u8>, AppError>)> = stream::iter(offsets.iter().copied())
            .map(|offset| async move {
                let frame = match self.source.frame_at(path, offset, cancel).await {
                    Ok(bytes) => encode_frame(bytes, options).await,
                    Err(e) => Err(e),
                };
                (offset, frame)
            })
            .buffer_unordered(workers)
            .collect()
            .await;

        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        let mut frames = Vec::with_capacity(results.len());
        for (offset, result) in results {
            match result {
                Ok(frame) => frames.push((offset, frame)),
                Err(AppError::Cancelled) => return Err(AppError::Cancelled),
                Err(e) => tracing::debug!("Frame at {:?} of {:?} skipped: {}", offset, path, e),
            }
        }

        frames.sort_by_key(|(offset, _)| *offset);
        Ok(frames.into_iter().map(|(_, frame)| frame).collect())
    }
}

async fn encode_frame(bytes: Vec<u8>, options: ThumbnailOptions) -> Result<Vec<u8>, AppError> {
    tokio::task::spawn_blocking(move || render_picture(&bytes, options))
        .await
        .map_err(|e| AppError::Media(format!("encode task failed: {}", e)))?
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::thumbnail::picture::tests::solid_png;
    use crate::thumbnail::ResizeMode;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    /// Frames whose red channel is the offset in seconds; earlier offsets
    /// finish last
    pub(crate) struct FakeFrames {
        pub duration: Option<Duration>,
        pub fail_frames: bool,
        pub seen_paths: Mutex<Vec<PathBuf>>,
        pub frame_calls: AtomicUsize,
        pub fallback_calls: AtomicUsize,
    }

    impl FakeFrames {
        pub(crate) fn new(duration: Option<Duration>) -> Self {
            Self {
                duration,
                fail_frames: false,
                seen_paths: Mutex::new(Vec::new()),
                frame_calls: AtomicUsize::new(0),
                fallback_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl FrameSource for FakeFrames {
        async fn duration(&self, path: &Path, _: &CancellationToken) -> Result<Duration, AppError> {
            self.seen_paths.lock().push(path.to_path_buf());
            self.duration.ok_or_else(|| AppError::Media("no video stream".into()))
        }

        async fn frame_at(
            &self,
            _: &Path,
            offset: Duration,
            _: &CancellationToken,
        ) -> Result<Vec<u8>, AppError> {
            self.frame_calls.fetch_add(1, Ordering::SeqCst);
            let delay = 100u64.saturating_sub(offset.as_secs());
            tokio::time::sleep(Duration::from_millis(delay)).await;
            if self.fail_frames {
                return Err(AppError::Media("exit status 1".into()));
            }
            Ok(solid_png(8, 8, [offset.as_secs() as u8, 0, 0, 255]))
        }

        async fn representative_frame(
            &self,
            _: &Path,
            _: &CancellationToken,
        ) -> Result<Vec<u8>, AppError> {
            self.fallback_calls.fetch_add(1, Ordering::SeqCst);
            Ok(solid_png(8, 8, [255, 255, 255, 255]))
        }
    }

    /// Tracks how many frame decodes overlap
    #[derive(Default)]
    struct OverlapFrames {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl FrameSource for OverlapFrames {
        async fn duration(&self, _: &Path, _: &CancellationToken) -> Result<Duration, AppError> {
            Err(AppError::Media("unused".into()))
        }

        async fn frame_at(
            &self,
            _: &Path,
            offset: Duration,
            _: &CancellationToken,
        ) -> Result<Vec<u8>, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(solid_png(8, 8, [offset.as_secs() as u8, 0, 0, 255]))
        }

        async fn representative_frame(
            &self,
            _: &Path,
            _: &CancellationToken,
        ) -> Result<Vec<u8>, AppError> {
            Err(AppError::Media("unused".into()))
        }
    }

    fn config(workers: usize) -> MovieConfig {
        MovieConfig {
            workers,
            ..MovieConfig::default()
        }
    }

    fn red(frame: &[u8]) -> u8 {
        image::load_from_memory(frame).unwrap().to_rgba8().get_pixel(4, 4).0[0]
    }

    fn assert_reds(frames: &[Vec<u8>], expected: &[u8]) {
        let reds: Vec<u8> = frames.iter().map(|f| red(f)).collect();
        assert_eq!(reds.len(), expected.len(), "{:?}", reds);
        for (r, e) in reds.iter().zip(expected) {
            assert!(r.abs_diff(*e) <= 1, "{:?} != {:?}", reds, expected);
        }
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("0:01:23.500000\n"), Some(Duration::from_millis(83_500)));
        assert_eq!(parse_duration("1:00:00.000000"), Some(secs(3600)));
        assert_eq!(parse_duration("\n42.25\n"), Some(Duration::from_millis(42_250)));
        assert_eq!(parse_duration("N/A"), None);
        assert_eq!(parse_duration(""), None);
        // finite but beyond what a Duration holds
        assert_eq!(parse_duration("99999999999999999999999"), None);
        assert_eq!(parse_duration("1e300:00:00"), None);
    }

    #[test]
    fn test_sample_offsets() {
        // 120s, 12 frames max: 10s interval; 120 itself is too close to the end
        let offsets = sample_offsets(secs(120), secs(10), 12, secs(1));
        assert_eq!(offsets.len(), 11);
        assert_eq!(offsets[0], secs(10));
        assert_eq!(offsets[10], secs(110));

        // long movie: interval grows so at most max_count offsets exist
        let offsets = sample_offsets(secs(3600), secs(10), 12, secs(1));
        assert_eq!(offsets.first(), Some(&secs(300)));
        assert_eq!(offsets.len(), 11);

        // shorter than one interval
        assert!(sample_offsets(secs(5), secs(10), 12, secs(1)).is_empty());
        assert!(sample_offsets(Duration::ZERO, secs(10), 12, secs(1)).is_empty());
    }

    #[tokio::test]
    async fn test_frames_are_ordered_by_offset() {
        let source = Arc::new(FakeFrames::new(Some(secs(40))));
        let sampler = MovieSampler::new(source.clone(), config(8));
        let options = ThumbnailOptions::new(8, 8, ResizeMode::Pad);

        let frames = sampler
            .sample(Path::new("clip.mp4"), options, &CancellationToken::new())
            .await
            .unwrap();

        // offsets 10, 20, 30 complete in reverse order
        assert_reds(&frames, &[10, 20, 30]);
        assert_eq!(source.fallback_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_single_worker_gives_same_order() {
        let source = Arc::new(FakeFrames::new(Some(secs(40))));
        let sampler = MovieSampler::new(source, config(1));
        let frames = sampler
            .sample(
                Path::new("clip.mp4"),
                ThumbnailOptions::new(8, 8, ResizeMode::Crop),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_reds(&frames, &[10, 20, 30]);
    }

    #[tokio::test]
    async fn test_decodes_never_exceed_worker_count() {
        let source = Arc::new(OverlapFrames::default());
        let sampler = MovieSampler::new(source.clone(), config(3));
        let offsets: Vec<Duration> = (1..=12).map(|i| secs(i * 10)).collect();

        let frames = sampler
            .sample_at(
                Path::new("clip.mp4"),
                &offsets,
                ThumbnailOptions::new(8, 8, ResizeMode::Pad),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(frames.len(), 12);
        assert_reds(&frames[..3], &[10, 20, 30]);
        assert_eq!(source.calls.load(Ordering::SeqCst), 12);
        let peak = source.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak {}", peak);
        assert!(peak >= 2, "peak {}", peak);
        assert_eq!(source.in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_falls_back_when_sampling_yields_nothing() {
        let mut fake = FakeFrames::new(Some(secs(40)));
        fake.fail_frames = true;
        let source = Arc::new(fake);
        let sampler = MovieSampler::new(source.clone(), config(4));

        let frames = sampler
            .sample(Path::new("clip.mp4"), ThumbnailOptions::new(8, 8, ResizeMode::Pad), &CancellationToken::new())
            .await
            .unwrap();
        assert_reds(&frames, &[255]);
        assert_eq!(source.frame_calls.load(Ordering::SeqCst), 3);
        assert_eq!(source.fallback_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_probe_uses_representative_frame() {
        let source = Arc::new(FakeFrames::new(None));
        let sampler = MovieSampler::new(source.clone(), config(4));
        let frames = sampler
            .sample(Path::new("clip.mp4"), ThumbnailOptions::new(8, 8, ResizeMode::Pad), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(source.frame_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancellation_is_reported_as_cancelled() {
        let source = Arc::new(FakeFrames::new(Some(secs(40))));
        let sampler = MovieSampler::new(source, config(2));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = sampler
            .sample(Path::new("clip.mp4"), ThumbnailOptions::default(), &cancel)
            .await;
        assert!(matches!(result, Err(AppError::Cancelled)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_tool_is_media_error() {
        let tools = FfmpegTools::new(&MovieConfig {
            ffprobe: PathBuf::from("/nonexistent/ffprobe"),
            ..MovieConfig::default()
        });
        let result = tools
            .duration(Path::new("clip.mp4"), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(AppError::Media(_))));
    }
}
