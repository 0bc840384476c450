// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF reader — open and inspect source PDFs at import time using the `lopdf`
// crate. Rasterization is left to the host's page renderer.

use std::path::Path;

use examcut_core::error::{ExamcutError, Result};
use lopdf::Document;
use tracing::{debug, info, instrument, warn};

/// Pages inspected when deciding whether a PDF carries a text layer.
pub const TEXT_PROBE_PAGES: u32 = 3;

/// Minimum extracted characters for a page to count as born-digital.
const MIN_TEXT_CHARS: usize = 16;

/// Reads existing PDF files for import-time inspection.
pub struct PdfReader {
    document: Document,
    source_path: Option<String>,
}

impl PdfReader {
    // -- Construction ---------------------------------------------------------

    /// Open a PDF from the filesystem.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path_ref = path.as_ref();
        info!("Opening PDF: {}", path_ref.display());

        let document = Document::load(path_ref).map_err(|err| {
            ExamcutError::PdfError(format!("failed to open {}: {}", path_ref.display(), err))
        })?;

        debug!(pages = document.get_pages().len(), "PDF loaded");

        Ok(Self {
            document,
            source_path: Some(path_ref.display().to_string()),
        })
    }

    /// Create a reader from raw PDF bytes already in memory.
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let document = Document::load_mem(data).map_err(|err| {
            ExamcutError::PdfError(format!("failed to load PDF from memory: {}", err))
        })?;

        debug!(pages = document.get_pages().len(), "PDF loaded from bytes");

        Ok(Self {
            document,
            source_path: None,
        })
    }

    // -- Inspection -----------------------------------------------------------

    pub fn page_count(&self) -> u32 {
        self.document.get_pages().len() as u32
    }

    pub fn source_path(&self) -> Option<&str> {
        self.source_path.as_deref()
    }

    /// Whether any of the first `max_pages` pages has extractable text.
    ///
    /// A PDF without a text layer on its leading pages is treated as a scan.
    pub fn has_text_layer(&self, max_pages: u32) -> bool {
        let pages = self.document.get_pages();
        let mut numbers: Vec<u32> = pages.keys().copied().collect();
        numbers.sort_unstable();

        for page_number in numbers.into_iter().take(max_pages as usize) {
            match self.document.extract_text(&[page_number]) {
                Ok(text) => {
                    let chars = text.chars().filter(|c| !c.is_whitespace()).count();
                    if chars >= MIN_TEXT_CHARS {
                        debug!(page_number, chars, "Text layer found");
                        return true;
                    }
                }
                Err(err) => {
                    warn!(page_number, %err, "Text extraction failed; treating page as image");
                }
            }
        }
        false
    }

    /// Shorthand for the import-time scanned check.
    pub fn is_scanned(&self) -> bool {
        !self.has_text_layer(TEXT_PROBE_PAGES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{Object, Stream, dictionary};

    /// Build a PDF with `pages` blank pages (or one text line each when
    /// `with_text` is set).
    fn sample_pdf(pages: usize, with_text: bool) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids = Vec::new();
        for _ in 0..pages {
            let content: &[u8] = if with_text {
                b"BT /F1 12 Tf 72 720 Td (Soru 1. Asagidakilerden hangisi dogrudur) Tj ET"
            } else {
                b""
            };
            let content_id = doc.add_object(Stream::new(lopdf::Dictionary::new(), content.to_vec()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            });
            kids.push(Object::Reference(page_id));
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Count" => pages as i64,
                "Kids" => kids,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut out = Vec::new();
        doc.save_to(&mut out).expect("serialize sample pdf");
        out
    }

    #[test]
    fn counts_pages() {
        let reader = PdfReader::from_bytes(&sample_pdf(3, false)).expect("load");
        assert_eq!(reader.page_count(), 3);
        assert!(reader.source_path().is_none());
    }

    #[test]
    fn blank_pages_are_scanned() {
        let reader = PdfReader::from_bytes(&sample_pdf(2, false)).expect("load");
        assert!(reader.is_scanned());
    }

    #[test]
    fn text_pages_are_not_scanned() {
        let reader = PdfReader::from_bytes(&sample_pdf(1, true)).expect("load");
        assert!(!reader.is_scanned());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(PdfReader::from_bytes(b"not a pdf").is_err());
    }
}
