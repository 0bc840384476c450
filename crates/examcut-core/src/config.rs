// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Detection configuration. One immutable snapshot is captured per extraction
// run; learning produces a new snapshot instead of editing a live one.

use serde::{Deserialize, Serialize};

use crate::error::{ExamcutError, Result};
use crate::pattern::{QuestionPattern, default_patterns};
use crate::types::LearnedParams;

/// Remote vision-language provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteProvider {
    /// OpenAI-compatible chat completions endpoint.
    OpenAi,
    /// Google Gemini `generateContent`.
    Gemini,
}

impl RemoteProvider {
    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
        }
    }

    /// Environment variable the default credential provider reads.
    pub fn credential_env_var(&self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Gemini => "GEMINI_API_KEY",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4o-mini",
            Self::Gemini => "gemini-1.5-flash",
        }
    }
}

/// Which recognition backend(s) a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "provider")]
pub enum OcrEngineKind {
    LocalFast,
    LocalAccurate,
    /// Fast first, accurate when the fast result is not confident enough.
    Hybrid,
    RemoteVision(RemoteProvider),
}

/// Immutable configuration for one extraction run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Resolution pages are rendered at.
    pub render_dpi: u32,
    pub ocr_engine: OcrEngineKind,
    /// Model name for remote engines; provider default when `None`.
    pub remote_model: Option<String>,
    /// Shorter candidates are discarded as false positives (page pixels).
    pub min_question_height_px: u32,
    /// Longer questions are cut at this height (page pixels).
    pub max_question_height_px: u32,
    /// Inflation applied to every side of a question box.
    pub question_padding_px: u32,
    pub multi_column: bool,
    /// Minimum whitespace ratio for a column gap band.
    pub column_split_threshold: f32,
    /// Minimum gap width as a fraction of page width.
    pub column_gap_threshold: f32,
    pub patterns: Vec<QuestionPattern>,
    /// Hybrid fallback threshold on mean line confidence.
    pub min_option_confidence: f32,
    /// Questions below this confidence are flagged for review.
    pub min_question_confidence: f32,
    /// JPEG quality, 0-100.
    pub export_quality: u8,
    pub export_max_width_px: u32,
    pub adaptive_learning: bool,
    /// Side biases from the last learning pass. Top is folded into padding.
    pub learned_bias: Option<LearnedParams>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            render_dpi: 200,
            ocr_engine: OcrEngineKind::Hybrid,
            remote_model: None,
            min_question_height_px: 40,
            max_question_height_px: 2400,
            question_padding_px: 12,
            multi_column: true,
            column_split_threshold: 0.45,
            column_gap_threshold: 0.02,
            patterns: default_patterns(),
            min_option_confidence: 0.6,
            min_question_confidence: 0.5,
            export_quality: 90,
            export_max_width_px: 1200,
            adaptive_learning: true,
            learned_bias: None,
        }
    }
}

/// Padding bounds after folding in a learned top bias.
pub const MAX_LEARNED_PADDING_PX: u32 = 60;

impl DetectionConfig {
    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(36..=1200).contains(&self.render_dpi) {
            return Err(ExamcutError::Config(format!(
                "render_dpi {} outside 36..=1200",
                self.render_dpi
            )));
        }
        if self.min_question_height_px == 0 {
            return Err(ExamcutError::Config(
                "min_question_height_px must be positive".into(),
            ));
        }
        if self.max_question_height_px <= self.min_question_height_px {
            return Err(ExamcutError::Config(format!(
                "max_question_height_px {} must exceed min_question_height_px {}",
                self.max_question_height_px, self.min_question_height_px
            )));
        }
        if !(0.0..=1.0).contains(&self.column_split_threshold) {
            return Err(ExamcutError::Config(format!(
                "column_split_threshold {} outside [0, 1]",
                self.column_split_threshold
            )));
        }
        if !(0.0..0.5).contains(&self.column_gap_threshold) {
            return Err(ExamcutError::Config(format!(
                "column_gap_threshold {} outside [0, 0.5)",
                self.column_gap_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.min_option_confidence)
            || !(0.0..=1.0).contains(&self.min_question_confidence)
        {
            return Err(ExamcutError::Config(
                "confidence thresholds must lie in [0, 1]".into(),
            ));
        }
        if self.export_quality > 100 {
            return Err(ExamcutError::Config(format!(
                "export_quality {} above 100",
                self.export_quality
            )));
        }
        if self.export_max_width_px == 0 {
            return Err(ExamcutError::Config(
                "export_max_width_px must be positive".into(),
            ));
        }
        if self.patterns.is_empty() {
            return Err(ExamcutError::Config("no question patterns configured".into()));
        }
        Ok(())
    }

    /// Model to request from a remote provider.
    pub fn remote_model_for(&self, provider: RemoteProvider) -> String {
        self.remote_model
            .clone()
            .unwrap_or_else(|| provider.default_model().to_owned())
    }

    /// New snapshot with learned biases folded in.
    ///
    /// The top bias adjusts `question_padding_px` (clamped to
    /// `0..=MAX_LEARNED_PADDING_PX`); the full parameter set is kept in
    /// `learned_bias` for the crop engine's remaining edges.
    pub fn apply_learning(&self, params: &LearnedParams) -> Self {
        let mut next = self.clone();
        if params.is_neutral() {
            return next;
        }
        let padding = self.question_padding_px as f64 + params.top_padding_bias;
        next.question_padding_px = padding.round().clamp(0.0, MAX_LEARNED_PADDING_PX as f64) as u32;
        next.learned_bias = Some(*params);
        next
    }
}
