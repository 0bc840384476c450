// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Answer-option extraction from a question's lines.
//
// Options are labeled A through E with `A)`, `A.`, `A )` or `(A)` markers,
// either one per line or several on one line. A marker only counts when it
// opens the line or shares the line with another marker, which keeps stray
// capitals in the stem from being read as options.

use examcut_core::error::{ExamcutError, Result};
use examcut_core::geometry::BoundingBox;
use examcut_core::types::{QuestionOption, RecognizedLine};
use regex::Regex;

const MARKER_PATTERN: &str = r"(?:^|\s)\(?([A-E])\s*[).]";

/// Options found in a block plus where they begin.
#[derive(Debug, Clone, Default)]
pub struct ExtractedOptions {
    /// Sorted by label, first occurrence of each label kept.
    pub options: Vec<QuestionOption>,
    /// Index of the first line holding an option marker.
    pub first_option_line: Option<usize>,
}

impl ExtractedOptions {
    /// How many of A through D were found.
    pub fn core_labels_found(&self) -> usize {
        self.options
            .iter()
            .filter(|o| ('A'..='D').contains(&o.label))
            .count()
    }

    pub fn is_complete(&self) -> bool {
        self.core_labels_found() == 4
    }
}

/// Finds option markers in recognized lines.
#[derive(Debug, Clone)]
pub struct OptionExtractor {
    marker: Regex,
}

struct Marker {
    label: char,
    /// Byte offset of the marker (label or opening parenthesis).
    start: usize,
    /// Byte offset just past the marker.
    end: usize,
}

impl OptionExtractor {
    pub fn new() -> Result<Self> {
        let marker = Regex::new(MARKER_PATTERN)
            .map_err(|e| ExamcutError::Config(format!("option marker pattern: {e}")))?;
        Ok(Self { marker })
    }

    pub fn extract(&self, lines: &[RecognizedLine]) -> ExtractedOptions {
        let mut out = ExtractedOptions::default();
        // Index into `out.options` of the option collecting continuation lines.
        let mut open: Option<usize> = None;

        for (index, line) in lines.iter().enumerate() {
            let markers = self.markers(&line.text);
            if markers.is_empty() {
                if let Some(i) = open {
                    let option = &mut out.options[i];
                    if !option.text.is_empty() {
                        option.text.push(' ');
                    }
                    option.text.push_str(line.text.trim());
                    option.bounding_box = option
                        .bounding_box
                        .map(|b| union(&b, &line.bounding_box));
                }
                continue;
            }

            out.first_option_line.get_or_insert(index);
            let total_chars = line.text.chars().count().max(1);

            for (k, marker) in markers.iter().enumerate() {
                let text_end = markers.get(k + 1).map_or(line.text.len(), |next| next.start);
                let text = line.text[marker.end..text_end].trim().to_owned();

                if out.options.iter().any(|o| o.label == marker.label) {
                    open = None;
                    continue;
                }

                let bounding_box = if markers.len() == 1 {
                    Some(line.bounding_box)
                } else {
                    let from = line.text[..marker.start].chars().count();
                    let to = line.text[..text_end].chars().count();
                    horizontal_slice(&line.bounding_box, from, to, total_chars)
                };

                out.options.push(QuestionOption {
                    label: marker.label,
                    text,
                    bounding_box,
                });
                open = Some(out.options.len() - 1);
            }
        }

        out.options.sort_by_key(|o| o.label);
        out
    }

    /// Accepted markers of one line, left to right.
    fn markers(&self, text: &str) -> Vec<Marker> {
        let found: Vec<Marker> = self
            .marker
            .captures_iter(text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let label = caps.get(1)?;
                let start = whole.start() + (whole.as_str().len() - whole.as_str().trim_start().len());
                Some(Marker {
                    label: label.as_str().chars().next()?,
                    start,
                    end: whole.end(),
                })
            })
            .collect();

        let leading = found
            .first()
            .is_some_and(|m| text[..m.start].trim().is_empty());
        if leading || found.len() >= 2 {
            found
        } else {
            Vec::new()
        }
    }
}

fn union(a: &BoundingBox, b: &BoundingBox) -> BoundingBox {
    BoundingBox {
        left: a.left.min(b.left),
        top: a.top.min(b.top),
        right: a.right.max(b.right),
        bottom: a.bottom.max(b.bottom),
        ..*a
    }
}

/// The part of `line` between character offsets `from` and `to`, assuming
/// evenly spaced characters.
fn horizontal_slice(line: &BoundingBox, from: usize, to: usize, total: usize) -> Option<BoundingBox> {
    let width = line.width() as f64;
    let left = line.left + (width * from as f64 / total as f64).floor() as i32;
    let right = line.left + (width * to as f64 / total as f64).ceil() as i32;
    BoundingBox::new(
        left,
        line.top,
        right.max(left + 1),
        line.bottom,
        line.page_width,
        line.page_height,
    )
    .ok()
}
