// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Recognition backend trait and the raw line type backends produce.

use async_trait::async_trait;
use examcut_core::error::Result;
use image::DynamicImage;

/// A line of text as reported by a backend, in region-local pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct RawLine {
    pub text: String,
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    /// In `[0, 1]`.
    pub confidence: f32,
}

impl RawLine {
    pub fn new(
        text: impl Into<String>,
        (left, top, right, bottom): (i32, i32, i32, i32),
        confidence: f32,
    ) -> Self {
        Self {
            text: text.into(),
            left,
            top,
            right,
            bottom,
            confidence,
        }
    }
}

/// A text recognition backend.
///
/// Backends see only the column region they are asked about and report
/// coordinates relative to it; the engine maps them onto the page.
#[async_trait]
pub trait RecognitionBackend: Send + Sync {
    /// Short name recorded on every result.
    fn name(&self) -> &str;

    /// Recognize the lines of `region`.
    async fn recognize(&self, region: &DynamicImage, column_index: u32) -> Result<Vec<RawLine>>;
}
