// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page renderer over pre-rasterized page images.

use std::path::PathBuf;

use examcut_core::error::{ExamcutError, Result};
use examcut_core::traits::PageRenderer;
use examcut_core::types::Document;
use examcut_document::image::processor::ImageProcessor;
use image::DynamicImage;
use tracing::debug;

use crate::import::page_images;

/// Serves pages from a directory of images (`page_001.png`, ...), scaled from
/// the resolution they were scanned at to the requested DPI.
///
/// Without an explicit directory the document's own source path is used,
/// which fits documents imported from an image directory.
#[derive(Debug, Clone)]
pub struct ImageDirRenderer {
    pages_dir: Option<PathBuf>,
    source_dpi: u32,
}

impl ImageDirRenderer {
    pub fn new(source_dpi: u32) -> Self {
        Self {
            pages_dir: None,
            source_dpi: source_dpi.max(1),
        }
    }

    pub fn with_pages_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.pages_dir = Some(dir.into());
        self
    }
}

impl PageRenderer for ImageDirRenderer {
    fn render(&self, document: &Document, page_number: u32, dpi: u32) -> Result<DynamicImage> {
        let dir = self
            .pages_dir
            .clone()
            .unwrap_or_else(|| document.source_path.clone());
        if !dir.is_dir() {
            return Err(ExamcutError::Render {
                page: page_number,
                reason: format!("{} is not a page image directory", dir.display()),
            });
        }

        let pages = page_images(&dir).map_err(|e| ExamcutError::Render {
            page: page_number,
            reason: e.to_string(),
        })?;
        let path = pages
            .get(page_number as usize)
            .ok_or_else(|| ExamcutError::Render {
                page: page_number,
                reason: format!("no image for page {} in {}", page_number + 1, dir.display()),
            })?;

        let image = ImageProcessor::open(path).map_err(|e| ExamcutError::Render {
            page: page_number,
            reason: e.to_string(),
        })?;
        let factor = dpi as f32 / self.source_dpi as f32;
        debug!(page = page_number, path = %path.display(), factor, "Page loaded");
        Ok(image.scale(factor).into_dynamic())
    }
}
