// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for Examcut.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::BoundingBox;

/// Unique identifier for an imported document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub Uuid);

impl DocumentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a detected question. Question numbers are visual
/// and may repeat; this id is the only uniqueness key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuestionId(pub Uuid);

impl QuestionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for QuestionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for QuestionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Classification hints
// ---------------------------------------------------------------------------

/// Layout convention of a known exam publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PublisherFormat {
    #[default]
    Generic,
    /// Central placement exams: plain "1." numbering, "A)" options.
    Osym,
    /// Ministry of education booklets: "Soru 1" headings.
    Meb,
    /// Commercial prep books: "1)" numbering.
    Palme,
}

impl PublisherFormat {
    const KEYWORDS: &'static [(PublisherFormat, &'static [&'static str])] = &[
        (PublisherFormat::Osym, &["ösym", "osym", "yks", "tyt", "ayt", "kpss"]),
        (PublisherFormat::Meb, &["meb", "milli eğitim", "milli egitim", "lgs"]),
        (PublisherFormat::Palme, &["palme", "yayınevi", "yayinevi"]),
    ];

    /// Guess the publisher from recognized page text.
    pub fn detect(text: &str) -> Self {
        let lower = text.to_lowercase();
        Self::KEYWORDS
            .iter()
            .find(|(_, words)| words.iter().any(|w| lower.contains(w)))
            .map(|(format, _)| *format)
            .unwrap_or_default()
    }

    /// Name of the question pattern this publisher favours, if any.
    pub fn preferred_pattern(&self) -> Option<&'static str> {
        match self {
            Self::Generic => None,
            Self::Osym => Some("number_dot"),
            Self::Meb => Some("soru_label"),
            Self::Palme => Some("number_paren"),
        }
    }
}

/// Subject area of a question or document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
    Mathematics,
    Physics,
    Chemistry,
    Biology,
    Turkish,
    History,
    Geography,
    #[default]
    Other,
}

impl Subject {
    const KEYWORDS: &'static [(Subject, &'static [&'static str])] = &[
        (
            Subject::Mathematics,
            &["denklem", "fonksiyon", "üçgen", "olasılık", "integral", "türev", "kümesi", "sayısı"],
        ),
        (
            Subject::Physics,
            &["kuvvet", "hız", "ivme", "enerji", "elektrik", "manyetik", "newton"],
        ),
        (
            Subject::Chemistry,
            &["mol", "atom", "element", "tepkime", "asit", "baz", "çözelti"],
        ),
        (
            Subject::Biology,
            &["hücre", "canlı", "enzim", "dna", "protein", "organizma", "ekosistem"],
        ),
        (
            Subject::Turkish,
            &["paragraf", "cümle", "sözcük", "anlatım", "yazım", "noktalama"],
        ),
        (
            Subject::History,
            &["osmanlı", "savaş", "antlaşma", "padişah", "cumhuriyet", "inkılap"],
        ),
        (
            Subject::Geography,
            &["iklim", "nüfus", "harita", "yeryüzü", "akarsu", "bölge"],
        ),
    ];

    /// Classify by counting keyword hits; the subject with most hits wins,
    /// ties go to the earlier entry.
    pub fn classify(text: &str) -> Self {
        let lower = text.to_lowercase();
        let mut best = (Subject::Other, 0usize);
        for (subject, words) in Self::KEYWORDS {
            let hits = words.iter().filter(|w| lower.contains(*w)).count();
            if hits > best.1 {
                best = (*subject, hits);
            }
        }
        best.0
    }
}

// ---------------------------------------------------------------------------
// Documents and pages
// ---------------------------------------------------------------------------

/// An imported source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub source_path: PathBuf,
    pub page_count: u32,
    pub byte_size: u64,
    /// SHA-256 hex digest of the source bytes.
    pub content_hash: String,
    pub hints: DocumentHints,
    pub created_at: DateTime<Utc>,
}

/// Detection hints, the only mutable part of a [`Document`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentHints {
    pub is_scanned: bool,
    pub publisher_format: Option<PublisherFormat>,
    pub subject: Option<Subject>,
}

impl Document {
    pub fn new(
        source_path: impl Into<PathBuf>,
        page_count: u32,
        byte_size: u64,
        content_hash: String,
    ) -> Self {
        Self {
            id: DocumentId::new(),
            source_path: source_path.into(),
            page_count,
            byte_size,
            content_hash,
            hints: DocumentHints::default(),
            created_at: Utc::now(),
        }
    }
}

/// One rasterized page of a document for the current run.
#[derive(Debug, Clone)]
pub struct Page {
    /// 0-indexed.
    pub page_number: u32,
    pub raster: DynamicImage,
    pub dpi: u32,
    pub column_count: u32,
    /// x-coordinates of column gaps, in raster pixels.
    pub column_splits: Vec<u32>,
}

impl Page {
    pub fn new(page_number: u32, raster: DynamicImage, dpi: u32) -> Self {
        Self {
            page_number,
            raster,
            dpi,
            column_count: 1,
            column_splits: Vec::new(),
        }
    }

    pub fn width(&self) -> u32 {
        self.raster.width()
    }

    pub fn height(&self) -> u32 {
        self.raster.height()
    }

    /// Horizontal span `[start, end)` of each column.
    pub fn column_spans(&self) -> Vec<(u32, u32)> {
        let mut edges = Vec::with_capacity(self.column_splits.len() + 2);
        edges.push(0);
        edges.extend(self.column_splits.iter().copied());
        edges.push(self.width());
        edges.windows(2).map(|w| (w[0], w[1])).collect()
    }
}

// ---------------------------------------------------------------------------
// Questions
// ---------------------------------------------------------------------------

/// A labeled answer choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub label: char,
    pub text: String,
    pub bounding_box: Option<BoundingBox>,
}

/// Content characteristics that affect how a crop should be reviewed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentFlags {
    pub has_image: bool,
    pub has_table: bool,
    pub is_math_formula: bool,
}

/// One detected exam question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub document_id: DocumentId,
    /// 0-indexed.
    pub page_number: u32,
    pub question_number: u32,
    pub text: String,
    pub options: Vec<QuestionOption>,
    pub bounding_box: BoundingBox,
    pub crop_image_path: Option<PathBuf>,
    pub subject: Subject,
    /// In `[0, 1]`.
    pub confidence: f32,
    pub verified: bool,
    pub flags: ContentFlags,
    pub column_index: u32,
    pub publisher_format: PublisherFormat,
    pub created_at: DateTime<Utc>,
}

impl Question {
    /// Whether all of A through D were found.
    pub fn has_complete_options(&self) -> bool {
        ['A', 'B', 'C', 'D']
            .iter()
            .all(|label| self.options.iter().any(|o| o.label == *label))
    }

    /// Whether a person should look at this question before it is trusted.
    pub fn needs_review(&self, min_confidence: f32) -> bool {
        self.confidence < min_confidence || !self.has_complete_options()
    }
}

// ---------------------------------------------------------------------------
// Recognition output
// ---------------------------------------------------------------------------

/// One recognized line of text, positioned in page space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedLine {
    pub text: String,
    pub bounding_box: BoundingBox,
    /// In `[0, 1]`.
    pub confidence: f32,
    pub line_index: usize,
}

/// Output of one recognition call over one column region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub full_text: String,
    pub lines: Vec<RecognizedLine>,
    pub column_index: u32,
    /// Region of the page that was recognized.
    pub region: BoundingBox,
    /// Name of the backend that produced the lines.
    pub backend: String,
}

impl RecognitionResult {
    /// Mean line confidence, 0 for an empty result.
    pub fn mean_confidence(&self) -> f32 {
        if self.lines.is_empty() {
            return 0.0;
        }
        self.lines.iter().map(|l| l.confidence).sum::<f32>() / self.lines.len() as f32
    }
}

// ---------------------------------------------------------------------------
// Corrections and learning
// ---------------------------------------------------------------------------

/// A user's boundary fix for one question. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserCorrection {
    pub question_id: QuestionId,
    pub document_id: DocumentId,
    pub original_box: BoundingBox,
    pub corrected_box: BoundingBox,
    pub timestamp: DateTime<Utc>,
}

/// Read-only accuracy snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AccuracyMetrics {
    pub total_questions: u64,
    pub verified_questions: u64,
    pub corrected_questions: u64,
    pub average_iou: f64,
    pub precision: f64,
    pub recall: f64,
}

impl AccuracyMetrics {
    pub fn f1(&self) -> f64 {
        let sum = self.precision + self.recall;
        if sum == 0.0 {
            0.0
        } else {
            2.0 * self.precision * self.recall / sum
        }
    }
}

/// Systematic edge offsets inferred from corrections, in page pixels.
///
/// Positive values mean users enlarged the box on that edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LearnedParams {
    pub top_padding_bias: f64,
    pub bottom_padding_bias: f64,
    pub left_padding_bias: f64,
    pub right_padding_bias: f64,
    pub sample_count: usize,
}

impl LearnedParams {
    pub fn neutral() -> Self {
        Self::default()
    }

    pub fn is_neutral(&self) -> bool {
        self.top_padding_bias == 0.0
            && self.bottom_padding_bias == 0.0
            && self.left_padding_bias == 0.0
            && self.right_padding_bias == 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;

    #[test]
    fn publisher_detection_by_keyword() {
        assert_eq!(PublisherFormat::detect("2024 TYT Deneme"), PublisherFormat::Osym);
        assert_eq!(PublisherFormat::detect("MEB ortak sınav"), PublisherFormat::Meb);
        assert_eq!(PublisherFormat::detect("plain text"), PublisherFormat::Generic);
    }

    #[test]
    fn subject_classification_picks_most_hits() {
        let text = "Bir hücre içindeki enzim ve protein miktarı";
        assert_eq!(Subject::classify(text), Subject::Biology);
        assert_eq!(Subject::classify("lorem ipsum"), Subject::Other);
    }

    #[test]
    fn column_spans_cover_page() {
        let raster = DynamicImage::ImageLuma8(GrayImage::new(1000, 100));
        let mut page = Page::new(0, raster, 150);
        assert_eq!(page.column_spans(), vec![(0, 1000)]);
        page.column_count = 2;
        page.column_splits = vec![480];
        assert_eq!(page.column_spans(), vec![(0, 480), (480, 1000)]);
    }

    #[test]
    fn review_flag_follows_confidence_and_options() {
        let mut q = Question {
            id: QuestionId::new(),
            document_id: DocumentId::new(),
            page_number: 0,
            question_number: 1,
            text: "1. Soru".into(),
            options: ['A', 'B', 'C', 'D']
                .into_iter()
                .map(|label| QuestionOption {
                    label,
                    text: String::new(),
                    bounding_box: None,
                })
                .collect(),
            bounding_box: BoundingBox::new(0, 0, 100, 100, 1000, 1400).expect("valid"),
            crop_image_path: None,
            subject: Subject::Other,
            confidence: 0.8,
            verified: false,
            flags: ContentFlags::default(),
            column_index: 0,
            publisher_format: PublisherFormat::Generic,
            created_at: Utc::now(),
        };
        assert!(!q.needs_review(0.5));
        q.confidence = 0.4;
        assert!(q.needs_review(0.5));
        q.confidence = 0.8;
        q.options.pop();
        assert!(q.needs_review(0.5));
    }

    #[test]
    fn f1_is_zero_without_precision_or_recall() {
        assert_eq!(AccuracyMetrics::default().f1(), 0.0);
        let m = AccuracyMetrics {
            precision: 0.5,
            recall: 1.0,
            ..Default::default()
        };
        assert!((m.f1() - 2.0 / 3.0).abs() < 1e-9);
    }
}
