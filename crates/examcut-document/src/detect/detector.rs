// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Question boundary detection.
//
// Within each column, lines matching a question pattern open a question that
// runs until the line before the next opening line. Columns are processed in
// order and their questions concatenated.

use chrono::Utc;
use examcut_core::config::DetectionConfig;
use examcut_core::error::Result;
use examcut_core::geometry::BoundingBox;
use examcut_core::pattern::{PatternSet, QuestionPattern};
use examcut_core::types::{
    DocumentId, Page, PublisherFormat, Question, QuestionId, RecognitionResult, RecognizedLine,
    Subject,
};
use tracing::{debug, instrument};

use super::classify::content_flags;
use super::options::OptionExtractor;

/// Weight of the matched pattern's normalised priority.
const PATTERN_WEIGHT: f32 = 0.3;
/// Weight of the mean line confidence.
const LINE_CONFIDENCE_WEIGHT: f32 = 0.4;
/// Contribution of a complete A–D option set.
const COMPLETE_OPTIONS_SCORE: f32 = 0.3;
/// Per-option contribution (of four) when the set is incomplete.
const PARTIAL_OPTIONS_SCORE: f32 = 0.15;

/// Turns recognized column text into questions.
#[derive(Debug, Clone)]
pub struct QuestionDetector {
    patterns: PatternSet,
    options: OptionExtractor,
    publisher: PublisherFormat,
    min_height: i32,
    max_height: i32,
    padding: i32,
}

struct Start<'a> {
    line: usize,
    pattern: &'a QuestionPattern,
    number: u32,
}

impl QuestionDetector {
    /// Detector for one run. A known publisher lifts its preferred pattern
    /// above the others.
    pub fn new(config: &DetectionConfig, publisher: Option<PublisherFormat>) -> Result<Self> {
        let publisher = publisher.unwrap_or_default();
        let patterns =
            PatternSet::new(config.patterns.clone()).with_preferred(publisher.preferred_pattern());
        Ok(Self {
            patterns,
            options: OptionExtractor::new()?,
            publisher,
            min_height: config.min_question_height_px as i32,
            max_height: config.max_question_height_px as i32,
            padding: config.question_padding_px as i32,
        })
    }

    /// Detect the questions of one page.
    ///
    /// `results` holds one recognition result per column that produced text.
    /// The output is in column order, top to bottom within a column.
    #[instrument(skip_all, fields(page = page.page_number, columns = results.len()))]
    pub fn detect(
        &self,
        page: &Page,
        results: &[RecognitionResult],
        document_id: DocumentId,
    ) -> Vec<Question> {
        let spans = page.column_spans();
        let mut ordered: Vec<&RecognitionResult> = results.iter().collect();
        ordered.sort_by_key(|r| r.column_index);

        let mut questions = Vec::new();
        for result in ordered {
            let span = spans
                .get(result.column_index as usize)
                .copied()
                .unwrap_or((result.region.left.max(0) as u32, result.region.right.max(0) as u32));
            let lines = lines_in_page_space(result, page);
            questions.extend(self.detect_column(page, &lines, result.column_index, span, document_id));
        }

        debug!(found = questions.len(), "Page detection complete");
        questions
    }

    fn detect_column(
        &self,
        page: &Page,
        lines: &[RecognizedLine],
        column_index: u32,
        (span_left, span_right): (u32, u32),
        document_id: DocumentId,
    ) -> Vec<Question> {
        let starts: Vec<Start<'_>> = lines
            .iter()
            .enumerate()
            .filter_map(|(i, line)| {
                self.patterns
                    .first_match(&line.text)
                    .map(|(pattern, number)| Start {
                        line: i,
                        pattern,
                        number,
                    })
            })
            .collect();

        let mut out = Vec::with_capacity(starts.len());
        for (k, start) in starts.iter().enumerate() {
            let end = starts.get(k + 1).map_or(lines.len(), |next| next.line);
            let mut block = &lines[start.line..end];

            let top = block[0].bounding_box.top;
            let mut bottom = block
                .iter()
                .map(|l| l.bounding_box.bottom)
                .max()
                .unwrap_or(top);

            if bottom - top > self.max_height {
                bottom = top + self.max_height;
                let kept = block
                    .iter()
                    .take_while(|l| l.bounding_box.top < bottom)
                    .count()
                    .max(1);
                block = &block[..kept];
                debug!(number = start.number, "Question cut at maximum height");
            }

            let height = bottom - top;
            if height < self.min_height {
                debug!(number = start.number, height, "Discarding short candidate");
                continue;
            }

            let Ok(raw_box) = BoundingBox::new(
                span_left as i32,
                top,
                span_right as i32,
                bottom,
                page.width(),
                page.height(),
            ) else {
                continue;
            };

            let found = self.options.extract(block);
            let stem_end = found.first_option_line.unwrap_or(block.len()).max(1);
            let text = join_text(&block[..stem_end]);
            let full_text = join_text(block);

            let mean_line_confidence =
                block.iter().map(|l| l.confidence).sum::<f32>() / block.len() as f32;
            let completeness = if found.is_complete() {
                COMPLETE_OPTIONS_SCORE
            } else {
                PARTIAL_OPTIONS_SCORE * found.core_labels_found() as f32 / 4.0
            };
            let confidence = (PATTERN_WEIGHT * self.patterns.weight(start.pattern)
                + LINE_CONFIDENCE_WEIGHT * mean_line_confidence
                + completeness)
                .clamp(0.0, 1.0);

            out.push(Question {
                id: QuestionId::new(),
                document_id,
                page_number: page.page_number,
                question_number: start.number,
                text,
                options: found.options,
                bounding_box: raw_box.inflated(self.padding),
                crop_image_path: None,
                subject: Subject::classify(&full_text),
                confidence,
                verified: false,
                flags: content_flags(block, height, page.dpi),
                column_index,
                publisher_format: self.publisher,
                created_at: Utc::now(),
            });
        }
        out
    }
}

/// A result's lines in the page's own space, sorted top to bottom.
fn lines_in_page_space(result: &RecognitionResult, page: &Page) -> Vec<RecognizedLine> {
    let mut lines: Vec<RecognizedLine> = result
        .lines
        .iter()
        .filter_map(|line| {
            let bounding_box = line
                .bounding_box
                .rescaled_to(page.width(), page.height())
                .ok()?;
            Some(RecognizedLine {
                bounding_box,
                ..line.clone()
            })
        })
        .collect();
    lines.sort_by_key(|l| (l.bounding_box.top, l.bounding_box.left));
    lines
}

fn join_text(lines: &[RecognizedLine]) -> String {
    lines
        .iter()
        .map(|l| l.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use examcut_core::types::ContentFlags;
    use image::{DynamicImage, GrayImage};

    const W: u32 = 1000;
    const H: u32 = 1400;

    fn page(splits: Vec<u32>) -> Page {
        let mut page = Page::new(0, DynamicImage::ImageLuma8(GrayImage::new(W, H)), 200);
        page.column_count = splits.len() as u32 + 1;
        page.column_splits = splits;
        page
    }

    fn line(text: &str, left: i32, top: i32, confidence: f32) -> RecognizedLine {
        RecognizedLine {
            text: text.into(),
            bounding_box: BoundingBox::new(left, top, left + 300, top + 20, W, H).expect("valid"),
            confidence,
            line_index: 0,
        }
    }

    fn result(column_index: u32, left: i32, right: i32, lines: Vec<RecognizedLine>) -> RecognitionResult {
        RecognitionResult {
            full_text: String::new(),
            lines,
            column_index,
            region: BoundingBox::new(left, 0, right, H as i32, W, H).expect("valid"),
            backend: "test".into(),
        }
    }

    /// Question `n` at `top`, followed by four option lines.
    fn question_lines(n: u32, left: i32, top: i32) -> Vec<RecognizedLine> {
        let mut lines = vec![line(&format!("{n}. Aşağıdakilerden hangisidir?"), left, top, 0.9)];
        for (i, label) in ['A', 'B', 'C', 'D'].iter().enumerate() {
            lines.push(line(&format!("{label}) seçenek"), left, top + 30 * (i as i32 + 1), 0.9));
        }
        lines
    }

    fn detector() -> QuestionDetector {
        QuestionDetector::new(&DetectionConfig::default(), None).expect("detector")
    }

    #[test]
    fn single_column_three_questions() {
        let mut lines = question_lines(1, 100, 100);
        lines.extend(question_lines(2, 100, 400));
        lines.extend(question_lines(3, 100, 700));
        let questions = detector().detect(&page(vec![]), &[result(0, 0, 1000, lines)], DocumentId::new());

        assert_eq!(questions.len(), 3);
        let numbers: Vec<u32> = questions.iter().map(|q| q.question_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        for q in &questions {
            assert!(q.has_complete_options());
            assert_eq!(q.column_index, 0);
            assert_eq!(q.text, format!("{}. Aşağıdakilerden hangisidir?", q.question_number));
        }
        // Block spans the start line to the last option, inflated by padding.
        let b = questions[0].bounding_box;
        assert_eq!((b.left, b.right), (0, 1000));
        assert_eq!((b.top, b.bottom), (100 - 12, 240 + 12));
    }

    #[test]
    fn two_columns_keep_attribution_and_order() {
        let left = result(0, 0, 500, {
            let mut l = question_lines(1, 40, 100);
            l.extend(question_lines(2, 40, 500));
            l
        });
        let right = result(1, 500, 1000, {
            let mut l = question_lines(3, 540, 50);
            l.extend(question_lines(4, 540, 450));
            l
        });
        // Pass columns out of order; output follows column order.
        let questions = detector().detect(&page(vec![500]), &[right, left], DocumentId::new());
        let got: Vec<(u32, u32)> = questions.iter().map(|q| (q.question_number, q.column_index)).collect();
        assert_eq!(got, vec![(1, 0), (2, 0), (3, 1), (4, 1)]);
        let b = questions[2].bounding_box;
        assert_eq!((b.left, b.right), (500 - 12, 1000));
    }

    #[test]
    fn missing_option_lowers_confidence() {
        let complete = question_lines(1, 100, 100);
        let mut partial = question_lines(2, 100, 100);
        partial.remove(4); // drop D)

        let d = detector();
        let full = d.detect(&page(vec![]), &[result(0, 0, 1000, complete)], DocumentId::new());
        let part = d.detect(&page(vec![]), &[result(0, 0, 1000, partial)], DocumentId::new());
        assert_eq!(part.len(), 1);
        assert!(!part[0].has_complete_options());
        assert!(part[0].confidence < full[0].confidence);
        // 0.3 * 0.9 + 0.4 * 0.9 + 0.15 * 3/4
        assert!((part[0].confidence - (0.27 + 0.36 + 0.1125)).abs() < 1e-4);
    }

    #[test]
    fn short_candidate_discarded() {
        let lines = vec![
            line("1. Kısa", 100, 100, 0.9),
            line("2. Uzun soru", 100, 130, 0.9),
            line("devamı", 100, 200, 0.9),
        ];
        let questions = detector().detect(&page(vec![]), &[result(0, 0, 1000, lines)], DocumentId::new());
        let numbers: Vec<u32> = questions.iter().map(|q| q.question_number).collect();
        assert_eq!(numbers, vec![2]);
    }

    #[test]
    fn long_question_cut_at_max_height() {
        let config = DetectionConfig {
            max_question_height_px: 200,
            question_padding_px: 0,
            ..Default::default()
        };
        let lines = vec![
            line("1. Uzun", 100, 100, 0.9),
            line("satır", 100, 250, 0.9),
            line("çok aşağıda", 100, 900, 0.9),
        ];
        let questions = QuestionDetector::new(&config, None)
            .expect("detector")
            .detect(&page(vec![]), &[result(0, 0, 1000, lines)], DocumentId::new());
        assert_eq!(questions[0].bounding_box.bottom, 300);
        assert!(!questions[0].text.contains("çok"));
    }

    #[test]
    fn duplicate_numbers_are_distinct_questions() {
        let mut lines = question_lines(5, 100, 100);
        lines.extend(question_lines(5, 100, 400));
        let questions = detector().detect(&page(vec![]), &[result(0, 0, 1000, lines)], DocumentId::new());
        assert_eq!(questions.len(), 2);
        assert_ne!(questions[0].id, questions[1].id);
    }

    #[test]
    fn detection_is_deterministic() {
        let mut lines = question_lines(1, 100, 100);
        lines.extend(question_lines(2, 100, 400));
        let doc = DocumentId::new();
        let r = [result(0, 0, 1000, lines)];
        let d = detector();
        let strip = |qs: Vec<Question>| {
            qs.into_iter()
                .map(|q| (q.question_number, q.bounding_box, q.text, q.options, q.confidence))
                .collect::<Vec<_>>()
        };
        assert_eq!(strip(d.detect(&page(vec![]), &r, doc)), strip(d.detect(&page(vec![]), &r, doc)));
    }

    #[test]
    fn publisher_preference_raises_pattern_weight() {
        let lines = vec![line("7) Soru metni", 100, 100, 0.9), line("devam", 100, 160, 0.9)];
        let r = [result(0, 0, 1000, lines)];
        let generic = detector().detect(&page(vec![]), &r, DocumentId::new());
        assert_eq!(generic[0].question_number, 7);
        assert_eq!(generic[0].publisher_format, PublisherFormat::Generic);

        let palme = QuestionDetector::new(&DetectionConfig::default(), Some(PublisherFormat::Palme))
            .expect("detector")
            .detect(&page(vec![]), &r, DocumentId::new());
        assert_eq!(palme[0].question_number, 7);
        assert_eq!(palme[0].publisher_format, PublisherFormat::Palme);
        assert!(palme[0].confidence > generic[0].confidence);
    }

    #[test]
    fn plain_block_has_no_flags() {
        let questions = detector().detect(
            &page(vec![]),
            &[result(0, 0, 1000, question_lines(1, 100, 100))],
            DocumentId::new(),
        );
        assert_eq!(questions[0].flags, ContentFlags::default());
    }
}
