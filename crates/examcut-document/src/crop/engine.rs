// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Crop engine — maps a question's page-space box onto the rendered raster,
// crops, scales down and writes the JPEG the question points at.

use std::path::{Path, PathBuf};

use examcut_core::config::DetectionConfig;
use examcut_core::error::{ExamcutError, Result};
use examcut_core::geometry::BoundingBox;
use examcut_core::types::{LearnedParams, Page, Question};
use image::DynamicImage;
use tracing::{debug, instrument, warn};

use crate::image::processor::ImageProcessor;

/// Crops questions out of rendered pages.
#[derive(Debug, Clone)]
pub struct CropEngine {
    output_dir: PathBuf,
    quality: u8,
    max_width: u32,
    bias: Option<LearnedParams>,
}

impl CropEngine {
    /// Engine writing into `output_dir` with the run's export settings and
    /// learned edge bias.
    pub fn new(output_dir: impl Into<PathBuf>, config: &DetectionConfig) -> Self {
        Self {
            output_dir: output_dir.into(),
            quality: config.export_quality,
            max_width: config.export_max_width_px,
            bias: config.learned_bias,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Where the crop of `question` is stored.
    pub fn crop_path(&self, question: &Question) -> PathBuf {
        self.output_dir
            .join(question.document_id.to_string())
            .join(format!("{}.jpg", question.id))
    }

    /// Cut `bbox` out of `raster` and scale it down to the export width.
    ///
    /// The box is adjusted by the learned bottom/left/right bias when
    /// `apply_bias` is set (the top bias already lives in the padding), then
    /// mapped per axis into raster pixels and clamped.
    pub fn crop_region(
        &self,
        bbox: &BoundingBox,
        raster: &DynamicImage,
        apply_bias: bool,
    ) -> Result<DynamicImage> {
        let adjusted = match (apply_bias, self.bias) {
            (true, Some(bias)) => bbox.expanded(
                0,
                bias.bottom_padding_bias.round() as i32,
                bias.left_padding_bias.round() as i32,
                bias.right_padding_bias.round() as i32,
            ),
            _ => *bbox,
        };
        let rect = adjusted.to_raster_rect(raster.width(), raster.height())?;
        Ok(ImageProcessor::from_dynamic(raster.clone())
            .crop(rect)
            .scale_down_to_width(self.max_width)
            .into_dynamic())
    }

    /// Crop and write `question`, returning the file path.
    #[instrument(skip_all, fields(question = %question.id, number = question.question_number))]
    pub fn try_crop(&self, question: &Question, page: &Page) -> Result<PathBuf> {
        self.write_crop(question, page, true)
    }

    /// Crop `question` from `page` and record the crop path on it.
    ///
    /// Failures are logged and leave the question without a crop.
    pub fn crop(&self, mut question: Question, page: &Page) -> Question {
        match self.try_crop(&question, page) {
            Ok(path) => question.crop_image_path = Some(path),
            Err(err) => {
                warn!(question = %question.id, %err, "Crop failed");
                question.crop_image_path = None;
            }
        }
        question
    }

    /// Replace the question's box with `new_box` and crop again.
    ///
    /// The box is taken as given: no learned bias is applied on top of a
    /// user-chosen boundary.
    pub fn recrop_with_new_boundary(
        &self,
        mut question: Question,
        new_box: BoundingBox,
        page: &Page,
    ) -> Question {
        question.bounding_box = new_box;
        match self.write_crop(&question, page, false) {
            Ok(path) => question.crop_image_path = Some(path),
            Err(err) => {
                warn!(question = %question.id, %err, "Re-crop failed");
                question.crop_image_path = None;
            }
        }
        question
    }

    fn write_crop(&self, question: &Question, page: &Page, apply_bias: bool) -> Result<PathBuf> {
        let image = self.crop_region(&question.bounding_box, &page.raster, apply_bias)?;
        let path = self.crop_path(question);
        ImageProcessor::from_dynamic(image).save_jpeg(&path, self.quality)?;
        debug!(path = %path.display(), "Crop written");
        Ok(path)
    }

    /// Re-encode an existing crop at `quality` into `destination`.
    pub fn export_to_file(question: &Question, destination: &Path, quality: u8) -> Result<PathBuf> {
        let source = question.crop_image_path.as_ref().ok_or_else(|| {
            ExamcutError::Export(format!(
                "question {} (number {}) has no crop",
                question.id, question.question_number
            ))
        })?;
        ImageProcessor::open(source)?.save_jpeg(destination, quality)?;
        Ok(destination.to_path_buf())
    }
}

/// Intersection-over-union, rescaling `b` into `a`'s page space if needed.
pub fn iou(a: &BoundingBox, b: &BoundingBox) -> f64 {
    let b = if a.same_space(b) {
        *b
    } else {
        match b.rescaled_to(a.page_width, a.page_height) {
            Ok(rescaled) => rescaled,
            Err(_) => return 0.0,
        }
    };
    a.iou(&b).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use examcut_core::types::{ContentFlags, DocumentId, PublisherFormat, QuestionId, Subject};
    use image::{GrayImage, Luma};

    fn question(bbox: BoundingBox) -> Question {
        Question {
            id: QuestionId::new(),
            document_id: DocumentId::new(),
            page_number: 0,
            question_number: 1,
            text: "1. Soru".into(),
            options: Vec::new(),
            bounding_box: bbox,
            crop_image_path: None,
            subject: Subject::Other,
            confidence: 0.9,
            verified: false,
            flags: ContentFlags::default(),
            column_index: 0,
            publisher_format: PublisherFormat::Generic,
            created_at: Utc::now(),
        }
    }

    fn page(w: u32, h: u32) -> Page {
        Page::new(0, DynamicImage::ImageLuma8(GrayImage::from_pixel(w, h, Luma([230u8]))), 200)
    }

    fn engine(dir: &Path, max_width: u32) -> CropEngine {
        let config = DetectionConfig {
            export_max_width_px: max_width,
            ..Default::default()
        };
        CropEngine::new(dir, &config)
    }

    #[test]
    fn crop_respects_max_width_and_aspect() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let bbox = BoundingBox::new(0, 0, 1600, 800, 2000, 2800).expect("valid");
        let out = engine(tmp.path(), 1200)
            .crop_region(&bbox, &page(2000, 2800).raster, true)
            .expect("crop");
        assert_eq!(out.width(), 1200);
        assert!((out.height() as i64 - 600).abs() <= 1);
    }

    #[test]
    fn written_and_exported_files_keep_width_cap_and_aspect() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let bbox = BoundingBox::new(0, 0, 1600, 800, 2000, 2800).expect("valid");
        let source = page(2000, 2800);
        let uncapped = engine(tmp.path(), 100_000)
            .crop_region(&bbox, &source.raster, true)
            .expect("crop");
        let expected_height =
            uncapped.height() as f64 * 1200.0 / uncapped.width() as f64;

        let cropped = engine(tmp.path(), 1200).crop(question(bbox), &source);
        let written = image::open(cropped.crop_image_path.as_ref().expect("crop path"))
            .expect("decode crop");
        assert_eq!(written.width(), 1200);
        assert!((written.height() as f64 - expected_height).abs() <= 1.0);

        let destination = tmp.path().join("soru_001_s1.jpg");
        CropEngine::export_to_file(&cropped, &destination, 70).expect("export");
        let exported = image::open(&destination).expect("decode export");
        assert_eq!(
            (exported.width(), exported.height()),
            (written.width(), written.height())
        );
    }

    #[test]
    fn crop_maps_page_space_onto_smaller_raster() {
        let tmp = tempfile::tempdir().expect("tempdir");
        // Box computed on a 2000px-wide page, cropped from a 1000px raster.
        let bbox = BoundingBox::new(200, 400, 1000, 1000, 2000, 2800).expect("valid");
        let out = engine(tmp.path(), 5000)
            .crop_region(&bbox, &page(1000, 1400).raster, true)
            .expect("crop");
        assert_eq!((out.width(), out.height()), (400, 300));
    }

    #[test]
    fn crop_writes_file_and_sets_path() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let q = question(BoundingBox::new(10, 10, 300, 200, 1000, 1400).expect("valid"));
        let cropped = engine(tmp.path(), 1200).crop(q, &page(1000, 1400));
        let path = cropped.crop_image_path.expect("crop path");
        assert!(path.exists());
        assert!(path.starts_with(tmp.path()));
    }

    #[test]
    fn degenerate_region_reports_error_without_file() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let q = question(BoundingBox::new(10, 10, 300, 200, 1000, 1400).expect("valid"));
        // A raster with no pixels cannot hold any crop.
        let empty = Page::new(0, DynamicImage::ImageLuma8(GrayImage::new(0, 0)), 200);
        let engine = engine(tmp.path(), 1200);
        assert!(matches!(
            engine.try_crop(&q, &empty),
            Err(ExamcutError::DegenerateRegion { .. })
        ));
        let cropped = engine.crop(q, &empty);
        assert!(cropped.crop_image_path.is_none());
    }

    #[test]
    fn learned_bias_widens_crop() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let config = DetectionConfig {
            export_max_width_px: 5000,
            ..Default::default()
        }
        .apply_learning(&LearnedParams {
            left_padding_bias: 20.0,
            right_padding_bias: 10.0,
            bottom_padding_bias: 15.0,
            sample_count: 5,
            ..Default::default()
        });
        let engine = CropEngine::new(tmp.path(), &config);
        let bbox = BoundingBox::new(100, 100, 300, 200, 1000, 1400).expect("valid");
        let raster = page(1000, 1400).raster;
        let biased = engine.crop_region(&bbox, &raster, true).expect("crop");
        assert_eq!((biased.width(), biased.height()), (230, 115));
        let exact = engine.crop_region(&bbox, &raster, false).expect("crop");
        assert_eq!((exact.width(), exact.height()), (200, 100));
    }

    #[test]
    fn recrop_replaces_box() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let q = question(BoundingBox::new(10, 10, 300, 200, 1000, 1400).expect("valid"));
        let new_box = BoundingBox::new(0, 0, 500, 600, 1000, 1400).expect("valid");
        let updated = engine(tmp.path(), 1200).recrop_with_new_boundary(q, new_box, &page(1000, 1400));
        assert_eq!(updated.bounding_box, new_box);
        let path = updated.crop_image_path.expect("path");
        let img = image::open(path).expect("decode");
        assert_eq!((img.width(), img.height()), (500, 600));
    }

    #[test]
    fn export_without_crop_fails() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let q = question(BoundingBox::new(10, 10, 300, 200, 1000, 1400).expect("valid"));
        let err = CropEngine::export_to_file(&q, &tmp.path().join("x.jpg"), 80);
        assert!(matches!(err, Err(ExamcutError::Export(_))));
    }

    #[test]
    fn iou_rescales_across_spaces() {
        let a = BoundingBox::new(0, 0, 100, 100, 1000, 1000).expect("valid");
        let b = BoundingBox::new(0, 0, 200, 200, 2000, 2000).expect("valid");
        assert!((iou(&a, &b) - 1.0).abs() < 1e-9);
        let far = BoundingBox::new(500, 500, 600, 600, 1000, 1000).expect("valid");
        assert_eq!(iou(&a, &far), 0.0);
    }
}
