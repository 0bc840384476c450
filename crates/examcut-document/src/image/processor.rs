// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image processor — region crop, width-capped downscale, contrast and
// JPEG/PNG encoding. Operates on in-memory images using the `image` crate.

use std::path::Path;

use examcut_core::error::{ExamcutError, Result};
use examcut_core::geometry::PixelRect;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use tracing::{debug, instrument};

/// Image processing pipeline operating on a single in-memory image.
///
/// Each method consumes `self` and returns a new `ImageProcessor` wrapping the
/// transformed image, enabling method chaining.
///
/// ```ignore
/// let jpeg = ImageProcessor::from_dynamic(page.raster.clone())
///     .crop(rect)
///     .scale_down_to_width(1200)
///     .to_jpeg_bytes(90)?;
/// ```
pub struct ImageProcessor {
    image: DynamicImage,
}

impl ImageProcessor {
    // -- Construction ---------------------------------------------------------

    /// Load an image from a file path.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let img = image::open(path.as_ref()).map_err(|err| {
            ExamcutError::ImageError(format!(
                "failed to open {}: {}",
                path.as_ref().display(),
                err
            ))
        })?;
        debug!(width = img.width(), height = img.height(), "Image loaded");
        Ok(Self { image: img })
    }

    /// Wrap an already-decoded `DynamicImage`.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self { image }
    }

    // -- Accessors ------------------------------------------------------------

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn into_dynamic(self) -> DynamicImage {
        self.image
    }

    // -- Transformations (consume self, return new Self) -----------------------

    /// Crop a rectangular region. The rectangle is clamped to image bounds and
    /// never shrinks below 1x1 on a non-empty image.
    #[instrument(skip(self), fields(x = rect.x, y = rect.y, w = rect.width, h = rect.height))]
    pub fn crop(self, rect: PixelRect) -> Self {
        let img_w = self.image.width();
        let img_h = self.image.height();

        let safe_x = rect.x.min(img_w.saturating_sub(1));
        let safe_y = rect.y.min(img_h.saturating_sub(1));
        let safe_w = rect.width.min(img_w - safe_x).max(1);
        let safe_h = rect.height.min(img_h - safe_y).max(1);

        let cropped = self.image.crop_imm(safe_x, safe_y, safe_w, safe_h);
        Self { image: cropped }
    }

    /// Shrink to at most `max_width` pixels wide, preserving aspect ratio.
    /// Images already narrow enough are returned untouched (never upscaled).
    pub fn scale_down_to_width(self, max_width: u32) -> Self {
        let (w, h) = (self.image.width(), self.image.height());
        if max_width == 0 || w <= max_width {
            return self;
        }
        let new_h = ((h as f64 * max_width as f64 / w as f64).round() as u32).max(1);
        debug!(from_w = w, from_h = h, to_w = max_width, to_h = new_h, "Scaling down");
        let resized = self
            .image
            .resize_exact(max_width, new_h, FilterType::Lanczos3);
        Self { image: resized }
    }

    /// Scale both axes by `factor`.
    pub fn scale(self, factor: f32) -> Self {
        if (factor - 1.0).abs() < f32::EPSILON || factor <= 0.0 {
            return self;
        }
        let w = ((self.image.width() as f32 * factor).round() as u32).max(1);
        let h = ((self.image.height() as f32 * factor).round() as u32).max(1);
        let resized = self.image.resize_exact(w, h, FilterType::CatmullRom);
        Self { image: resized }
    }

    /// Adjust contrast by a factor. Values > 1.0 increase contrast; values
    /// < 1.0 decrease it. A value of 1.0 is a no-op.
    pub fn adjust_contrast(self, factor: f32) -> Self {
        let gray = self.image.to_luma8();
        let contrasted = image::ImageBuffer::from_fn(gray.width(), gray.height(), |x, y| {
            let image::Luma([v]) = *gray.get_pixel(x, y);
            let val = factor * (v as f32 - 128.0) + 128.0;
            image::Luma([val.clamp(0.0, 255.0) as u8])
        });
        Self {
            image: DynamicImage::ImageLuma8(contrasted),
        }
    }

    // -- Output ---------------------------------------------------------------

    /// Encode the current image as PNG bytes.
    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut buffer);
        self.image
            .write_to(&mut cursor, ImageFormat::Png)
            .map_err(|err| ExamcutError::ImageError(format!("PNG encoding failed: {}", err)))?;
        Ok(buffer)
    }

    /// Encode the current image as JPEG bytes with the given quality (1-100).
    pub fn to_jpeg_bytes(&self, quality: u8) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let rgb = self.image.to_rgb8();
        let encoder =
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
        rgb.write_with_encoder(encoder)
            .map_err(|err| ExamcutError::ImageError(format!("JPEG encoding failed: {}", err)))?;
        Ok(buffer)
    }

    /// Encode as JPEG and write to `path`, creating parent directories.
    pub fn save_jpeg(&self, path: impl AsRef<Path>, quality: u8) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.to_jpeg_bytes(quality)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, bytes)?;
        Ok(())
    }
}
