// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// examcut-document — Page-level processing for Examcut.
//
// Provides PDF probing, image processing (crop, scale, JPEG encoding), scan
// preparation (ink masks, OCR pre-processing), column layout analysis,
// text recognition behind a pluggable backend trait, question detection and
// crop export.

pub mod crop;
pub mod detect;
pub mod image;
pub mod layout;
pub mod pdf;
pub mod recognition;
pub mod scan;

// Re-export the primary structs so callers can use `examcut_document::CropEngine` etc.
pub use crop::engine::CropEngine;
pub use crop::export::{ExportOptions, ExportReport, export_questions};
pub use detect::detector::QuestionDetector;
pub use image::processor::ImageProcessor;
pub use layout::analyzer::{LayoutAnalysis, LayoutAnalyzer};
pub use pdf::reader::PdfReader;
pub use recognition::backend::{RawLine, RecognitionBackend};
pub use recognition::engine::{LocalBackends, RecognitionEngine};
pub use scan::enhance::ScanEnhancer;

#[cfg(feature = "ocr")]
pub use recognition::ocrs_backend::OcrsBackend;
