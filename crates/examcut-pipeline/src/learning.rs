// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Adaptive learning — edge biases from stored boundary corrections.
//
// Each correction yields one signed delta per edge, expressed as expansion:
// positive means the user grew the box on that edge. Top and bottom biases
// are only trusted when users agree (low spread) and the shift is noticeable;
// left and right are always applied but clamped.

use std::sync::Arc;

use examcut_core::error::Result;
use examcut_core::traits::QuestionRepository;
use examcut_core::types::{DocumentId, LearnedParams, UserCorrection};
use tracing::{debug, info, instrument};

/// Corrections needed before any bias is learned.
pub const MIN_CORRECTIONS: usize = 3;

/// Vertical biases need a standard deviation below this (pixels).
const MAX_VERTICAL_STD: f64 = 20.0;

/// Vertical biases need a mean shift above this (pixels).
const MIN_VERTICAL_SHIFT: f64 = 5.0;

/// Horizontal biases are clamped to `±MAX_HORIZONTAL_BIAS` pixels.
const MAX_HORIZONTAL_BIAS: f64 = 30.0;

/// Compute biases from a set of corrections. Fewer than
/// [`MIN_CORRECTIONS`] usable corrections give neutral parameters.
pub fn learn_from(corrections: &[UserCorrection]) -> LearnedParams {
    let deltas: Vec<[f64; 4]> = corrections.iter().filter_map(edge_deltas).collect();
    if deltas.len() < MIN_CORRECTIONS {
        return LearnedParams::neutral();
    }

    let column = |i: usize| deltas.iter().map(|d| d[i]).collect::<Vec<_>>();
    let params = LearnedParams {
        top_padding_bias: vertical_bias(&column(0)),
        bottom_padding_bias: vertical_bias(&column(1)),
        left_padding_bias: horizontal_bias(&column(2)),
        right_padding_bias: horizontal_bias(&column(3)),
        sample_count: deltas.len(),
    };
    debug!(?params, "Learned parameters");
    params
}

/// `[top, bottom, left, right]` expansion with the corrected box expressed in
/// the original box's page space.
fn edge_deltas(correction: &UserCorrection) -> Option<[f64; 4]> {
    let original = correction.original_box;
    let corrected = correction
        .corrected_box
        .rescaled_to(original.page_width, original.page_height)
        .ok()?;
    Some([
        (original.top - corrected.top) as f64,
        (corrected.bottom - original.bottom) as f64,
        (original.left - corrected.left) as f64,
        (corrected.right - original.right) as f64,
    ])
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64], mean: f64) -> f64 {
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

fn vertical_bias(values: &[f64]) -> f64 {
    let m = mean(values);
    if std_dev(values, m) < MAX_VERTICAL_STD && m.abs() > MIN_VERTICAL_SHIFT {
        m
    } else {
        0.0
    }
}

fn horizontal_bias(values: &[f64]) -> f64 {
    mean(values).clamp(-MAX_HORIZONTAL_BIAS, MAX_HORIZONTAL_BIAS)
}

/// Learns biases from the corrections held in a repository.
#[derive(Clone)]
pub struct AdaptiveLearner {
    repository: Arc<dyn QuestionRepository>,
}

impl AdaptiveLearner {
    pub fn new(repository: Arc<dyn QuestionRepository>) -> Self {
        Self { repository }
    }

    /// Biases from one document's corrections.
    #[instrument(skip_all, fields(document = %document_id))]
    pub fn learn(&self, document_id: &DocumentId) -> Result<LearnedParams> {
        let corrections = self.repository.corrections_for_document(document_id)?;
        Ok(learn_from(&corrections))
    }

    /// Biases pooled over every document's corrections.
    pub fn learn_all(&self) -> Result<LearnedParams> {
        let corrections = self.repository.all_corrections()?;
        Ok(learn_from(&corrections))
    }

    /// The document's own biases, or the pooled set when the document has too
    /// few corrections of its own.
    pub fn params_for(&self, document_id: &DocumentId) -> Result<LearnedParams> {
        let own = self.learn(document_id)?;
        if own.sample_count >= MIN_CORRECTIONS {
            return Ok(own);
        }
        let pooled = self.learn_all()?;
        info!(
            document = %document_id,
            samples = pooled.sample_count,
            "Using pooled corrections"
        );
        Ok(pooled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use examcut_core::geometry::BoundingBox;
    use examcut_core::types::QuestionId;

    fn bbox(l: i32, t: i32, r: i32, b: i32) -> BoundingBox {
        BoundingBox::new(l, t, r, b, 1000, 1400).expect("valid")
    }

    fn correction(original: BoundingBox, corrected: BoundingBox) -> UserCorrection {
        UserCorrection {
            question_id: QuestionId::new(),
            document_id: DocumentId::new(),
            original_box: original,
            corrected_box: corrected,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn too_few_corrections_are_neutral() {
        let original = bbox(100, 100, 900, 400);
        let grown = bbox(80, 80, 920, 420);
        let params = learn_from(&[correction(original, grown), correction(original, grown)]);
        assert!(params.is_neutral());
        assert_eq!(params.sample_count, 0);
    }

    #[test]
    fn consistent_top_growth_is_learned() {
        let original = bbox(100, 100, 900, 400);
        let corrections: Vec<_> = (0..4)
            .map(|_| correction(original, bbox(100, 90, 900, 400)))
            .collect();
        let params = learn_from(&corrections);
        assert_eq!(params.sample_count, 4);
        assert!((params.top_padding_bias - 10.0).abs() < 1e-9);
        assert_eq!(params.bottom_padding_bias, 0.0);
    }

    #[test]
    fn noisy_vertical_edges_are_ignored() {
        let original = bbox(100, 200, 900, 400);
        let corrections = vec![
            correction(original, bbox(100, 140, 900, 400)),
            correction(original, bbox(100, 200, 900, 400)),
            correction(original, bbox(100, 260, 900, 400)),
            correction(original, bbox(100, 130, 900, 400)),
        ];
        let params = learn_from(&corrections);
        assert_eq!(params.top_padding_bias, 0.0);
    }

    #[test]
    fn small_vertical_shift_is_ignored() {
        let original = bbox(100, 100, 900, 400);
        let corrections: Vec<_> = (0..3)
            .map(|_| correction(original, bbox(100, 100, 900, 404)))
            .collect();
        assert_eq!(learn_from(&corrections).bottom_padding_bias, 0.0);
    }

    #[test]
    fn horizontal_bias_is_clamped() {
        let original = bbox(100, 100, 900, 400);
        let corrections: Vec<_> = (0..3)
            .map(|_| correction(original, bbox(50, 100, 890, 400)))
            .collect();
        let params = learn_from(&corrections);
        assert_eq!(params.left_padding_bias, 30.0);
        assert!((params.right_padding_bias + 10.0).abs() < 1e-9);
    }

    #[test]
    fn corrections_in_other_page_space_are_rescaled() {
        let original = bbox(100, 100, 900, 400);
        // Same correction drawn on a page rendered at twice the size.
        let doubled = BoundingBox::new(200, 180, 1800, 800, 2000, 2800).expect("valid");
        let corrections: Vec<_> = (0..3).map(|_| correction(original, doubled)).collect();
        let params = learn_from(&corrections);
        assert!((params.top_padding_bias - 10.0).abs() < 1e-9);
    }

    #[test]
    fn sparse_document_falls_back_to_pooled() {
        use examcut_core::traits::correction_for;
        use examcut_core::types::{ContentFlags, Document, PublisherFormat, Question, Subject};
        use examcut_store::SqliteRepository;

        let repo = Arc::new(SqliteRepository::open_in_memory().expect("db"));
        let question = |doc: &Document| Question {
            id: QuestionId::new(),
            document_id: doc.id,
            page_number: 0,
            question_number: 1,
            text: "1. Soru".into(),
            options: Vec::new(),
            bounding_box: bbox(100, 100, 900, 400),
            crop_image_path: None,
            subject: Subject::Other,
            confidence: 0.9,
            verified: false,
            flags: ContentFlags::default(),
            column_index: 0,
            publisher_format: PublisherFormat::Generic,
            created_at: Utc::now(),
        };

        let sparse = Document::new("/tmp/a.pdf", 1, 1, "a".into());
        let rich = Document::new("/tmp/b.pdf", 1, 1, "b".into());
        repo.upsert_document(&sparse).expect("doc");
        repo.upsert_document(&rich).expect("doc");

        let q = question(&sparse);
        repo.upsert_question(&q).expect("question");
        repo.record_correction(&correction_for(&q, bbox(100, 90, 900, 400)))
            .expect("correct");
        for _ in 0..3 {
            let q = question(&rich);
            repo.upsert_question(&q).expect("question");
            repo.record_correction(&correction_for(&q, bbox(100, 90, 900, 400)))
                .expect("correct");
        }

        let learner = AdaptiveLearner::new(repo);
        assert!(learner.learn(&sparse.id).expect("learn").is_neutral());
        assert_eq!(learner.learn(&rich.id).expect("learn").sample_count, 3);
        let params = learner.params_for(&sparse.id).expect("params");
        assert_eq!(params.sample_count, 4);
        assert!((params.top_padding_bias - 10.0).abs() < 1e-9);
    }
}
