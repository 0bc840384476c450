// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Content flags for detected questions: formulas, tables and figures.

use examcut_core::types::{ContentFlags, RecognizedLine};

/// Symbols that on their own mark a line as mathematical.
const STRONG_MATH: &[char] = &[
    '√', '∫', '∑', '∏', '≤', '≥', '≠', '±', '∞', '∈', '∉', '∪', '∩', '⊂', 'π', '²', '³', '÷', '×',
];

/// Symbols that are mathematical in bulk.
const WEAK_MATH: &[char] = &['=', '+', '^', '<', '>', '/', '*'];

/// Minimum share of weak symbols among non-blank characters.
const WEAK_MATH_DENSITY: f32 = 0.05;

/// Lines needed before a block counts as a table.
const TABLE_MIN_ROWS: usize = 3;

/// Figure gap at 200 DPI, scaled for other resolutions.
const FIGURE_GAP_AT_200_DPI: f32 = 120.0;

/// Derive content flags from a question's lines.
///
/// `block_height` is the height of the question block and `dpi` the render
/// resolution, both in page pixels.
pub fn content_flags(lines: &[RecognizedLine], block_height: i32, dpi: u32) -> ContentFlags {
    let text: String = lines
        .iter()
        .map(|l| l.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    ContentFlags {
        has_image: has_figure_gap(lines, block_height, dpi),
        has_table: looks_like_table(lines),
        is_math_formula: looks_like_math(&text),
    }
}

fn looks_like_math(text: &str) -> bool {
    if text.chars().any(|c| STRONG_MATH.contains(&c)) {
        return true;
    }
    let visible: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
    if visible.is_empty() {
        return false;
    }
    let weak = visible.iter().filter(|c| WEAK_MATH.contains(c)).count();
    weak >= 2 && weak as f32 / visible.len() as f32 >= WEAK_MATH_DENSITY
}

/// Three or more rows of at least three numeric cells, or pipe-separated rows.
fn looks_like_table(lines: &[RecognizedLine]) -> bool {
    let rows = lines
        .iter()
        .filter(|line| {
            let pipes = line.text.matches('|').count();
            let numeric = line
                .text
                .split_whitespace()
                .filter(|token| {
                    let trimmed = token.trim_matches(|c: char| !c.is_ascii_digit());
                    !trimmed.is_empty()
                        && trimmed
                            .chars()
                            .all(|c| c.is_ascii_digit() || c == '.' || c == ',')
                })
                .count();
            pipes >= 2 || numeric >= 3
        })
        .count();
    rows >= TABLE_MIN_ROWS
}

/// A vertical gap between consecutive lines large enough to hold a figure.
fn has_figure_gap(lines: &[RecognizedLine], block_height: i32, dpi: u32) -> bool {
    if lines.len() < 2 || block_height <= 0 {
        return false;
    }
    let absolute = (FIGURE_GAP_AT_200_DPI * dpi as f32 / 200.0) as i32;
    let relative = block_height / 3;

    let mut sorted: Vec<_> = lines.iter().map(|l| l.bounding_box).collect();
    sorted.sort_by_key(|b| b.top);

    let mut reach = sorted[0].bottom;
    for b in &sorted[1..] {
        let gap = b.top - reach;
        if gap > relative || gap > absolute {
            return true;
        }
        reach = reach.max(b.bottom);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use examcut_core::geometry::BoundingBox;

    fn line(text: &str, top: i32, bottom: i32) -> RecognizedLine {
        RecognizedLine {
            text: text.into(),
            bounding_box: BoundingBox::new(0, top, 500, bottom, 1000, 1400).expect("valid"),
            confidence: 0.9,
            line_index: 0,
        }
    }

    #[test]
    fn formula_detected() {
        assert!(looks_like_math("x² + 3x − 4 = 0 denkleminin kökleri"));
        assert!(looks_like_math("a+b=c ise a*b=?"));
        assert!(!looks_like_math("Paragrafta anlatılmak istenen nedir?"));
    }

    #[test]
    fn numeric_rows_form_table() {
        let lines = [
            line("Yıl Nüfus Alan", 0, 20),
            line("2020 83 780", 30, 50),
            line("2021 84 780", 60, 80),
            line("2022 85 780", 90, 110),
        ];
        assert!(looks_like_table(&lines));
        assert!(!looks_like_table(&lines[..3]));
    }

    #[test]
    fn figure_gap_detected() {
        let lines = [line("1. Şekilde", 0, 20), line("A) 1", 300, 320)];
        let flags = content_flags(&lines, 320, 200);
        assert!(flags.has_image);

        let tight = [line("1. Soru", 0, 20), line("A) 1", 30, 50)];
        assert!(!content_flags(&tight, 50, 200).has_image);
    }
}
