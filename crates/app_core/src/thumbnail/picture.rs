//! Picture rendering: decode, fit to the requested box, encode

use crate::AppError;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader, RgbaImage};
use std::io::Cursor;

use super::{ResizeMode, ThumbnailFormat, ThumbnailOptions};

/// Decode an encoded picture and render it as a thumbnail
pub fn render_picture(bytes: &[u8], options: ThumbnailOptions) -> Result<Vec<u8>, AppError> {
    let img = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .decode()?;
    render_image(img, options)
}

/// Fit an already decoded image into the box (anchored center) and encode it
pub fn render_image(img: DynamicImage, options: ThumbnailOptions) -> Result<Vec<u8>, AppError> {
    let (width, height) = (options.width, options.height);
    if width == 0 || height == 0 {
        return Err(AppError::UnsupportedFormat(format!(
            "empty thumbnail box {}x{}",
            width, height
        )));
    }

    let fitted = match options.mode {
        ResizeMode::Pad => pad(&img, width, height),
        ResizeMode::Crop => img.resize_to_fill(width, height, FilterType::Triangle).to_rgba8(),
    };

    encode(&fitted, options.format)
}

/// Scale to fit inside the box, then center on a transparent canvas
fn pad(img: &DynamicImage, width: u32, height: u32) -> RgbaImage {
    let scaled = img.resize(width, height, FilterType::Triangle).to_rgba8();
    let (w, h) = scaled.dimensions();
    if (w, h) == (width, height) {
        return scaled;
    }

    let mut canvas = RgbaImage::new(width, height);
    let x = (width - w) / 2;
    let y = (height - h) / 2;
    imageops::overlay(&mut canvas, &scaled, x as i64, y as i64);
    canvas
}

fn encode(img: &RgbaImage, format: ThumbnailFormat) -> Result<Vec<u8>, AppError> {
    let format = match format {
        ThumbnailFormat::Png => ImageFormat::Png,
    };

    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, format)
        .map_err(|e| AppError::ImageDecode(format!("encode failed: {}", e)))?;
    Ok(buffer.into_inner())
}

/// Dimensions of an encoded image
pub fn encoded_dimensions(bytes: &[u8]) -> Result<(u32, u32), AppError> {
    let img = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .decode()?;
    Ok(img.dimensions())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba};

    /// PNG-encode a solid image
    pub(crate) fn solid_png(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba(color));
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    fn decode(bytes: &[u8]) -> RgbaImage {
        image::load_from_memory_with_format(bytes, ImageFormat::Png)
            .unwrap()
            .to_rgba8()
    }

    #[test]
    fn test_pad_preserves_aspect_ratio() {
        let source = DynamicImage::ImageRgb8(RgbImage::from_pixel(4000, 3000, Rgb([200, 0, 0])));
        let png = render_image(source, ThumbnailOptions::new(128, 128, ResizeMode::Pad)).unwrap();

        assert_eq!(&png[1..4], b"PNG");
        let thumb = decode(&png);
        assert_eq!(thumb.dimensions(), (128, 128));

        // 4:3 inside 128x128 is 128x96, leaving 16px bands top and bottom
        assert_eq!(thumb.get_pixel(64, 0).0[3], 0);
        assert_eq!(thumb.get_pixel(64, 127).0[3], 0);
        assert_eq!(thumb.get_pixel(64, 20).0[3], 255);
        let edge = thumb.get_pixel(0, 64).0;
        assert_eq!(edge[3], 255);
        assert!(edge[0] > 190 && edge[1] < 10);
        assert_eq!(thumb.get_pixel(127, 64).0[3], 255);
    }

    #[test]
    fn test_crop_fills_box_from_center() {
        let mut source = RgbaImage::new(300, 100);
        for (x, _, pixel) in source.enumerate_pixels_mut() {
            *pixel = match x {
                0..=99 => Rgba([255, 0, 0, 255]),
                100..=199 => Rgba([0, 255, 0, 255]),
                _ => Rgba([0, 0, 255, 255]),
            };
        }

        let png = render_image(
            DynamicImage::ImageRgba8(source),
            ThumbnailOptions::new(100, 100, ResizeMode::Crop),
        )
        .unwrap();
        let thumb = decode(&png);
        assert_eq!(thumb.dimensions(), (100, 100));
        let center = thumb.get_pixel(50, 50).0;
        assert!(center[1] > 250 && center[0] < 5 && center[2] < 5);
    }

    #[test]
    fn test_render_picture_from_bytes() {
        let png = solid_png(40, 20, [1, 2, 3, 255]);
        let thumb = render_picture(&png, ThumbnailOptions::new(16, 16, ResizeMode::Pad)).unwrap();
        assert_eq!(encoded_dimensions(&thumb).unwrap(), (16, 16));
    }

    #[test]
    fn test_garbage_is_unsupported() {
        let result = render_picture(b"definitely not an image", ThumbnailOptions::default());
        assert!(matches!(result, Err(AppError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_empty_box_is_rejected() {
        let png = solid_png(4, 4, [0, 0, 0, 255]);
        let result = render_picture(&png, ThumbnailOptions::new(0, 64, ResizeMode::Pad));
        assert!(matches!(result, Err(AppError::UnsupportedFormat(_))));
    }
}
