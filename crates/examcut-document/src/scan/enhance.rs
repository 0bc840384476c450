// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scan enhancement — Otsu ink masks for layout analysis and the
// contrast/upscale preparation used by accurate recognition.

use image::{DynamicImage, GrayImage};
use imageproc::filter::median_filter;
use tracing::{debug, instrument};

use crate::image::processor::ImageProcessor;

/// Contrast factor applied before accurate recognition.
const RECOGNITION_CONTRAST: f32 = 1.4;

/// Enhances scanned page images ahead of analysis and recognition.
pub struct ScanEnhancer {
    image: DynamicImage,
}

impl ScanEnhancer {
    // -- Construction ---------------------------------------------------------

    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self { image }
    }

    pub fn into_dynamic(self) -> DynamicImage {
        self.image
    }

    // -- Recognition preparation ----------------------------------------------

    /// Grayscale, despeckle, boost contrast and upscale by `scale`.
    ///
    /// Coordinates recognized on the result must be divided by `scale` to map
    /// back onto the input.
    #[instrument(skip(self), fields(scale))]
    pub fn prepare_for_recognition(self, scale: f32) -> Self {
        let gray = self.image.to_luma8();
        let despeckled = median_filter(&gray, 1, 1);
        let prepared = ImageProcessor::from_dynamic(DynamicImage::ImageLuma8(despeckled))
            .adjust_contrast(RECOGNITION_CONTRAST)
            .scale(scale)
            .into_dynamic();
        debug!(
            width = prepared.width(),
            height = prepared.height(),
            "Region prepared for accurate recognition"
        );
        Self { image: prepared }
    }
}

/// Per-pixel ink map of a page.
#[derive(Debug, Clone)]
pub struct InkMask {
    width: u32,
    height: u32,
    ink: Vec<bool>,
}

impl InkMask {
    /// Classify every pixel of `image` as ink or paper using an Otsu threshold.
    pub fn from_image(image: &DynamicImage) -> Self {
        let gray = image.to_luma8();
        let threshold = otsu_threshold(&gray);
        let (width, height) = gray.dimensions();
        let ink = gray
            .pixels()
            .map(|p| is_ink_value(p.0[0], threshold))
            .collect();
        Self { width, height, ink }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Ink flags of row `y`, left to right.
    pub fn row(&self, y: u32) -> &[bool] {
        let start = y as usize * self.width as usize;
        &self.ink[start..start + self.width as usize]
    }

    pub fn is_ink(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height && self.row(y)[x as usize]
    }

    /// Total inked pixels.
    pub fn ink_count(&self) -> usize {
        self.ink.iter().filter(|v| **v).count()
    }
}

/// A pixel belongs to the dark (ink) class when it is at or below the Otsu
/// threshold. A threshold of 0 with no dark pixels yields no ink.
fn is_ink_value(value: u8, threshold: u8) -> bool {
    value <= threshold && !(threshold == 0 && value > 0)
}

/// Compute the Otsu threshold for a grayscale image.
///
/// Finds the threshold value that maximises the between-class variance of
/// the dark and light pixel groups. Values at or below the threshold form
/// the dark class.
pub fn otsu_threshold(gray: &GrayImage) -> u8 {
    let mut histogram = [0u64; 256];
    for pixel in gray.pixels() {
        histogram[pixel.0[0] as usize] += 1;
    }

    let total_pixels = gray.width() as u64 * gray.height() as u64;
    if total_pixels == 0 {
        return 128;
    }

    let mut sum_total: f64 = 0.0;
    for (i, &count) in histogram.iter().enumerate() {
        sum_total += i as f64 * count as f64;
    }

    let mut sum_background: f64 = 0.0;
    let mut weight_background: u64 = 0;
    let mut max_variance: f64 = 0.0;
    let mut best_threshold: u8 = 0;

    for (t, &count) in histogram.iter().enumerate() {
        weight_background += count;
        if weight_background == 0 {
            continue;
        }
        let weight_foreground = total_pixels - weight_background;
        if weight_foreground == 0 {
            break;
        }

        sum_background += t as f64 * count as f64;
        let mean_background = sum_background / weight_background as f64;
        let mean_foreground = (sum_total - sum_background) / weight_foreground as f64;

        let between_variance = weight_background as f64
            * weight_foreground as f64
            * (mean_background - mean_foreground).powi(2);

        if between_variance > max_variance {
            max_variance = between_variance;
            best_threshold = t as u8;
        }
    }

    best_threshold
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn two_tone() -> GrayImage {
        let mut img = GrayImage::from_pixel(40, 20, Luma([250u8]));
        for y in 5..10 {
            for x in 5..30 {
                img.put_pixel(x, y, Luma([10u8]));
            }
        }
        img
    }

    #[test]
    fn otsu_separates_two_tones() {
        let t = otsu_threshold(&two_tone());
        assert!((10..250).contains(&t), "threshold {t}");
    }

    #[test]
    fn blank_page_has_no_ink() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(30, 30, Luma([255u8])));
        assert_eq!(InkMask::from_image(&img).ink_count(), 0);
    }

    #[test]
    fn pure_black_text_on_white_is_ink() {
        let mut img = GrayImage::from_pixel(20, 10, Luma([255u8]));
        img.put_pixel(3, 4, Luma([0u8]));
        let mask = InkMask::from_image(&DynamicImage::ImageLuma8(img));
        assert!(mask.is_ink(3, 4));
        assert_eq!(mask.ink_count(), 1);
    }

    #[test]
    fn preparation_upscales() {
        let out = ScanEnhancer::from_dynamic(DynamicImage::ImageLuma8(two_tone()))
            .prepare_for_recognition(2.0)
            .into_dynamic();
        assert_eq!((out.width(), out.height()), (80, 40));
    }
}
