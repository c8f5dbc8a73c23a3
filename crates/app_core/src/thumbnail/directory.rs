//! Directory thumbnails: a fixed folder glyph

use crate::config::ThumbnailConfig;
use crate::AppError;
use app_fs::VfsEntry;
use dashmap::DashMap;
use image::{DynamicImage, Rgba, RgbaImage};
use std::sync::Arc;

use super::picture::render_image;
use super::{FailReason, ThumbnailOptions, ThumbnailResult};

const GLYPH_SIZE: u32 = 256;

/// Folder icon generator; rendered icons are memoized per options
pub struct DirectoryThumbnailGenerator {
    color: [u8; 3],
    memo: DashMap<ThumbnailOptions, Arc<Vec<u8>>>,
}

impl DirectoryThumbnailGenerator {
    pub fn new(config: &ThumbnailConfig) -> Self {
        Self {
            color: config.icon_rgb(),
            memo: DashMap::new(),
        }
    }

    pub fn generate(
        &self,
        dir: &VfsEntry,
        options: ThumbnailOptions,
    ) -> Result<ThumbnailResult, AppError> {
        if !dir.is_dir() {
            return Ok(ThumbnailResult::Failed(FailReason::NotSupported));
        }
        Ok(ThumbnailResult::Succeeded(vec![self.icon(options)?]))
    }

    /// Encoded folder icon for `options`
    pub fn icon(&self, options: ThumbnailOptions) -> Result<Vec<u8>, AppError> {
        if let Some(hit) = self.memo.get(&options) {
            return Ok(hit.value().as_ref().clone());
        }

        let png = render_image(DynamicImage::ImageRgba8(folder_glyph(self.color)), options)?;
        self.memo.insert(options, Arc::new(png.clone()));
        tracing::debug!("Rendered folder icon {}x{}", options.width, options.height);
        Ok(png)
    }

    /// Number of memoized renderings
    pub fn memoized(&self) -> usize {
        self.memo.len()
    }
}

fn shade([r, g, b]: [u8; 3], factor: f32) -> Rgba<u8> {
    let scale = |c: u8| (c as f32 * factor).round().clamp(0.0, 255.0) as u8;
    Rgba([scale(r), scale(g), scale(b), 255])
}

fn fill_rect(img: &mut RgbaImage, x: u32, y: u32, w: u32, h: u32, color: Rgba<u8>) {
    for py in y..(y + h).min(img.height()) {
        for px in x..(x + w).min(img.width()) {
            img.put_pixel(px, py, color);
        }
    }
}

/// Tab, body and a highlight strip on a transparent square
fn folder_glyph(color: [u8; 3]) -> RgbaImage {
    let mut img = RgbaImage::new(GLYPH_SIZE, GLYPH_SIZE);
    fill_rect(&mut img, 24, 52, 88, 32, shade(color, 0.8));
    fill_rect(&mut img, 24, 76, 208, 140, shade(color, 1.0));
    fill_rect(&mut img, 24, 76, 208, 10, shade(color, 1.15));
    img
}
