// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Crop & export — question images from rendered pages, and batch export.

pub mod engine;
pub mod export;

pub use engine::{CropEngine, iou};
pub use export::{ExportItem, ExportOptions, ExportReport, export_file_name, export_questions};
