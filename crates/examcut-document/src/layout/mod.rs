// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Layout module — column detection on rasterized pages.

pub mod analyzer;

pub use analyzer::{LayoutAnalysis, LayoutAnalyzer};
