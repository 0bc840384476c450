// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Accuracy metrics over stored questions and corrections.

use std::collections::HashSet;

use examcut_core::error::Result;
use examcut_core::traits::QuestionRepository;
use examcut_core::types::{AccuracyMetrics, DocumentId};
use examcut_document::crop::engine::iou;

/// A correction whose boxes overlap less than this counts as a missed
/// question rather than a tightened one.
pub const MISS_IOU: f64 = 0.5;

/// Snapshot metrics for one document, or for all documents with `None`.
///
/// Verified and corrected are independent counts and may overlap.
/// `precision` is the share of questions never corrected; `recall` the share
/// not corrected by a large move (IoU below [`MISS_IOU`]). `average_iou` is
/// taken over all corrections and is 1 when there are none.
pub fn accuracy_metrics(
    repository: &dyn QuestionRepository,
    document_id: Option<&DocumentId>,
) -> Result<AccuracyMetrics> {
    let total = repository.count_questions(document_id)?;
    let verified = repository.count_verified(document_id)?;
    let corrected = repository.count_corrected(document_id)?;
    let corrections = match document_id {
        Some(id) => repository.corrections_for_document(id)?,
        None => repository.all_corrections()?,
    };

    let average_iou = if corrections.is_empty() {
        1.0
    } else {
        corrections
            .iter()
            .map(|c| iou(&c.original_box, &c.corrected_box))
            .sum::<f64>()
            / corrections.len() as f64
    };

    let missed: HashSet<_> = corrections
        .iter()
        .filter(|c| iou(&c.original_box, &c.corrected_box) < MISS_IOU)
        .map(|c| c.question_id)
        .collect();

    let (precision, recall) = if total == 0 {
        (0.0, 0.0)
    } else {
        let total_f = total as f64;
        (
            total.saturating_sub(corrected) as f64 / total_f,
            total.saturating_sub(missed.len() as u64) as f64 / total_f,
        )
    };

    Ok(AccuracyMetrics {
        total_questions: total,
        verified_questions: verified,
        corrected_questions: corrected,
        average_iou,
        precision,
        recall,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use examcut_core::geometry::BoundingBox;
    use examcut_core::traits::correction_for;
    use examcut_core::types::{
        ContentFlags, Document, PublisherFormat, Question, QuestionId, Subject,
    };
    use examcut_store::SqliteRepository;

    fn bbox(l: i32, t: i32, r: i32, b: i32) -> BoundingBox {
        BoundingBox::new(l, t, r, b, 1000, 1400).expect("valid")
    }

    fn question(doc: &Document, number: u32) -> Question {
        Question {
            id: QuestionId::new(),
            document_id: doc.id,
            page_number: 0,
            question_number: number,
            text: format!("{number}. Soru"),
            options: Vec::new(),
            bounding_box: bbox(0, 0, 100, 100),
            crop_image_path: None,
            subject: Subject::Other,
            confidence: 0.9,
            verified: false,
            flags: ContentFlags::default(),
            column_index: 0,
            publisher_format: PublisherFormat::Generic,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn empty_store_has_zero_scores() {
        let repo = SqliteRepository::open_in_memory().expect("db");
        let metrics = accuracy_metrics(&repo, None).expect("metrics");
        assert_eq!(metrics.total_questions, 0);
        assert_eq!(metrics.f1(), 0.0);
        assert_eq!(metrics.average_iou, 1.0);
    }

    #[test]
    fn corrections_drive_precision_and_recall() {
        let repo = SqliteRepository::open_in_memory().expect("db");
        let doc = Document::new("/tmp/x.pdf", 1, 1, "h".into());
        repo.upsert_document(&doc).expect("doc");
        let questions: Vec<_> = (1..=4).map(|n| question(&doc, n)).collect();
        repo.insert_questions(&questions).expect("insert");

        // Slight tightening: IoU 0.81.
        repo.record_correction(&correction_for(&questions[0], bbox(0, 0, 90, 90)))
            .expect("correct");
        // Moved elsewhere entirely: IoU 0.
        repo.record_correction(&correction_for(&questions[1], bbox(500, 500, 600, 600)))
            .expect("correct");
        repo.set_verified(&questions[0].id, true).expect("verify");
        repo.set_verified(&questions[2].id, true).expect("verify");

        let m = accuracy_metrics(&repo, Some(&doc.id)).expect("metrics");
        assert_eq!(m.total_questions, 4);
        assert_eq!(m.verified_questions, 2);
        assert_eq!(m.corrected_questions, 2);
        assert!((m.precision - 0.5).abs() < 1e-9);
        assert!((m.recall - 0.75).abs() < 1e-9);
        assert!((m.average_iou - 0.405).abs() < 1e-9);
        let expected_f1 = 2.0 * 0.5 * 0.75 / 1.25;
        assert!((m.f1() - expected_f1).abs() < 1e-9);
    }
}
