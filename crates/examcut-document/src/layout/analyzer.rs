// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Column layout analysis from whitespace ratios.
//
// The page is binarized, ink is smeared horizontally so characters and word
// gaps merge into line blobs, and for each x the fraction of text rows that
// are blank at x is measured. Only rows with ink on both sides of x count, so
// a column that ends partway down the page still reads as dense. A central
// band of mostly-blank x positions with dense text on both sides is a column
// gap. Everything is expressed as ratios of the page size, so the result does
// not depend on render resolution.

use examcut_core::config::DetectionConfig;
use examcut_core::types::Page;
use image::DynamicImage;
use tracing::{debug, instrument};

use crate::scan::enhance::InkMask;

/// Horizontal smoothing radius as a fraction of page width.
const SMOOTHING_FRACTION: f32 = 0.01;

/// Fraction of the content width on each side that cannot hold a gap.
const EDGE_MARGIN_FRACTION: f32 = 0.25;

/// Smallest raster the analyzer will look at.
const MIN_DIMENSION: u32 = 8;

/// Result of analyzing one page.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutAnalysis {
    /// 1 or 2.
    pub column_count: u32,
    /// x-coordinate of each column gap, in raster pixels.
    pub column_splits: Vec<u32>,
}

impl LayoutAnalysis {
    pub fn single_column() -> Self {
        Self {
            column_count: 1,
            column_splits: Vec::new(),
        }
    }
}

/// Detects one- or two-column page layouts.
#[derive(Debug, Clone)]
pub struct LayoutAnalyzer {
    multi_column: bool,
    split_threshold: f32,
    gap_threshold: f32,
}

impl LayoutAnalyzer {
    pub fn new(multi_column: bool, split_threshold: f32, gap_threshold: f32) -> Self {
        Self {
            multi_column,
            split_threshold,
            gap_threshold,
        }
    }

    pub fn from_config(config: &DetectionConfig) -> Self {
        Self::new(
            config.multi_column,
            config.column_split_threshold,
            config.column_gap_threshold,
        )
    }

    /// Analyze `page` and record the result on it.
    pub fn apply(&self, page: &mut Page) -> LayoutAnalysis {
        let analysis = self.analyze(&page.raster);
        page.column_count = analysis.column_count;
        page.column_splits = analysis.column_splits.clone();
        analysis
    }

    /// Detect the column layout of a raster.
    #[instrument(skip_all, fields(width = raster.width(), height = raster.height()))]
    pub fn analyze(&self, raster: &DynamicImage) -> LayoutAnalysis {
        if !self.multi_column {
            return LayoutAnalysis::single_column();
        }
        let (width, height) = (raster.width(), raster.height());
        if width < MIN_DIMENSION || height < MIN_DIMENSION {
            return LayoutAnalysis::single_column();
        }

        let mask = InkMask::from_image(raster);
        let Some(ratios) = whitespace_ratios(&mask) else {
            debug!("No text rows; single column");
            return LayoutAnalysis::single_column();
        };

        match self.find_gap(&ratios, width) {
            Some(split) => {
                debug!(split, "Two-column layout");
                LayoutAnalysis {
                    column_count: 2,
                    column_splits: vec![split],
                }
            }
            None => LayoutAnalysis::single_column(),
        }
    }

    /// Pick the widest acceptable gap band and return its centre.
    fn find_gap(&self, ratios: &[f32], width: u32) -> Option<u32> {
        // Content extent: x positions touched by ink in at least one row.
        let content_left = ratios.iter().position(|r| *r < 1.0)?;
        let content_right = ratios.iter().rposition(|r| *r < 1.0)?;
        let content_width = content_right - content_left + 1;

        let margin = (content_width as f32 * EDGE_MARGIN_FRACTION) as usize;
        let central_start = content_left + margin;
        let central_end = content_right.saturating_sub(margin);
        if central_start >= central_end {
            return None;
        }

        let min_gap = ((width as f32 * self.gap_threshold).ceil() as usize).max(1);
        let dense = |x: usize| ratios[x] <= self.split_threshold;

        let mut best: Option<(usize, usize)> = None;
        let mut x = content_left;
        while x <= content_right {
            if dense(x) {
                x += 1;
                continue;
            }
            let start = x;
            while x <= content_right && !dense(x) {
                x += 1;
            }
            let end = x; // exclusive
            let centre = (start + end) / 2;
            let band_width = end - start;

            let central = (central_start..=central_end).contains(&centre);
            let flanked = (content_left..start).any(dense) && (end..=content_right).any(dense);
            if central && flanked && band_width >= min_gap {
                let wider = best.is_none_or(|(s, e)| band_width > e - s);
                if wider {
                    best = Some((start, end));
                }
            }
        }

        best.map(|(s, e)| ((s + e) / 2) as u32)
    }
}

/// For each x, the fraction of text rows that are blank at x after
/// horizontal smoothing, counting only rows with ink on both sides of the
/// smoothing window. An x no row qualifies for reads as fully blank. `None`
/// when the page has no ink.
fn whitespace_ratios(mask: &InkMask) -> Option<Vec<f32>> {
    let width = mask.width() as usize;
    let radius = ((mask.width() as f32 * SMOOTHING_FRACTION).round() as usize).max(1);

    let mut blank_counts = vec![0u32; width];
    let mut row_counts = vec![0u32; width];
    let mut any_text = false;
    let mut prefix = vec![0u32; width + 1];

    for y in 0..mask.height() {
        let row = mask.row(y);
        if !row.iter().any(|v| *v) {
            continue;
        }
        any_text = true;

        for (x, ink) in row.iter().enumerate() {
            prefix[x + 1] = prefix[x] + u32::from(*ink);
        }
        let total = prefix[width];
        for x in 0..width {
            let lo = x.saturating_sub(radius);
            let hi = (x + radius + 1).min(width);
            let flanked = prefix[lo] > 0 && total > prefix[hi];
            if !flanked {
                continue;
            }
            row_counts[x] += 1;
            if prefix[hi] == prefix[lo] {
                blank_counts[x] += 1;
            }
        }
    }

    if !any_text {
        return None;
    }
    Some(
        blank_counts
            .into_iter()
            .zip(row_counts)
            .map(|(blank, rows)| {
                if rows == 0 {
                    1.0
                } else {
                    blank as f32 / rows as f32
                }
            })
            .collect(),
    )
}
