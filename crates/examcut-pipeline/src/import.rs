// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document import — turns a PDF or a directory of page images into a
// `Document` record with page count, size, content hash and scan hint.

use std::path::{Path, PathBuf};

use examcut_core::error::{ExamcutError, Result};
use examcut_core::types::Document;
use examcut_document::pdf::reader::PdfReader;
use examcut_store::integrity::{hash_file, hash_files};
use tracing::{info, instrument};

/// File extensions accepted as page images.
pub const PAGE_IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff", "bmp"];

/// Builds `Document` records from files on disk.
#[derive(Debug, Default, Clone)]
pub struct DocumentImporter;

impl DocumentImporter {
    pub fn new() -> Self {
        Self
    }

    /// Inspect `path` and describe it as a document.
    ///
    /// PDFs are probed with `lopdf` for page count and text layer. A directory
    /// counts one page per image file and is always treated as scanned.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn import(&self, path: impl AsRef<Path>) -> Result<Document> {
        let path = path.as_ref();
        let document = if path.is_dir() {
            self.import_image_dir(path)?
        } else if has_extension(path, &["pdf"]) {
            self.import_pdf(path)?
        } else {
            return Err(ExamcutError::UnsupportedDocument(format!(
                "{} is neither a PDF nor a directory of page images",
                path.display()
            )));
        };
        info!(
            document = %document.id,
            pages = document.page_count,
            scanned = document.hints.is_scanned,
            "Document imported"
        );
        Ok(document)
    }

    fn import_pdf(&self, path: &Path) -> Result<Document> {
        let reader = PdfReader::open(path)?;
        let pages = reader.page_count();
        if pages == 0 {
            return Err(ExamcutError::UnsupportedDocument(format!(
                "{} has no pages",
                path.display()
            )));
        }
        let size = std::fs::metadata(path)?.len();
        let mut document = Document::new(path, pages, size, hash_file(path)?);
        document.hints.is_scanned = reader.is_scanned();
        Ok(document)
    }

    fn import_image_dir(&self, dir: &Path) -> Result<Document> {
        let images = page_images(dir)?;
        if images.is_empty() {
            return Err(ExamcutError::UnsupportedDocument(format!(
                "{} holds no page images",
                dir.display()
            )));
        }
        let mut size = 0u64;
        for image in &images {
            size += std::fs::metadata(image)?.len();
        }
        let mut document = Document::new(dir, images.len() as u32, size, hash_files(&images)?);
        document.hints.is_scanned = true;
        Ok(document)
    }
}

/// Page image files in `dir`, sorted by file name.
pub fn page_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && has_extension(&path, PAGE_IMAGE_EXTENSIONS) {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

fn has_extension(path: &Path, accepted: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| accepted.iter().any(|a| a.eq_ignore_ascii_case(e)))
}
