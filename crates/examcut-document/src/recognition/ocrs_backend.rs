// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Local recognition with the pure-Rust `ocrs` engine.
//
// # Feature Gate
//
// Only available with the `ocr` feature:
//
// ```toml
// examcut-document = { path = "crates/examcut-document", features = ["ocr"] }
// ```
//
// # Model Setup
//
// The engine needs `text-detection.rten` and `text-recognition.rten`. Running
// `ocrs-cli` once downloads them to `$XDG_CACHE_HOME/ocrs` (typically
// `~/.cache/ocrs`), which is where this module looks by default.
//
// Inference is CPU-bound and blocking, so every call is moved onto
// `tokio::task::spawn_blocking`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use examcut_core::error::{ExamcutError, Result};
use image::DynamicImage;
use ocrs::{ImageSource, OcrEngine as OcrsEngine, OcrEngineParams, TextItem};
use rten::Model;
use tracing::{debug, info, instrument};

use super::backend::{RawLine, RecognitionBackend};
use super::engine::LocalBackends;
use crate::scan::enhance::ScanEnhancer;

const DETECTION_MODEL_FILENAME: &str = "text-detection.rten";
const RECOGNITION_MODEL_FILENAME: &str = "text-recognition.rten";

/// Upscale factor for the accurate pass.
const ACCURATE_SCALE: f32 = 2.0;

fn default_model_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
        PathBuf::from(xdg).join("ocrs")
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".cache").join("ocrs")
    } else {
        PathBuf::from("ocrs-models")
    }
}

/// Locations of the two model files.
#[derive(Debug, Clone)]
pub struct OcrModelPaths {
    pub detection: PathBuf,
    pub recognition: PathBuf,
}

impl Default for OcrModelPaths {
    fn default() -> Self {
        Self::from_dir(default_model_dir())
    }
}

impl OcrModelPaths {
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            detection: dir.join(DETECTION_MODEL_FILENAME),
            recognition: dir.join(RECOGNITION_MODEL_FILENAME),
        }
    }

    pub fn validate(&self) -> Result<()> {
        for path in [&self.detection, &self.recognition] {
            if !path.exists() {
                return Err(ExamcutError::Config(format!(
                    "OCR model not found at {}; run `ocrs-cli` once to download models",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}

/// Whether the two passes differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrsMode {
    /// The region as rendered.
    Fast,
    /// Despeckled, contrast-boosted and upscaled before recognition.
    Accurate,
}

/// `ocrs`-backed recognition backend.
pub struct OcrsBackend {
    engine: Arc<OcrsEngine>,
    mode: OcrsMode,
}

impl OcrsBackend {
    /// Load the models. This is the expensive step; share the engine between
    /// both modes with [`OcrsBackend::load_pair`].
    #[instrument(skip_all, fields(detection = %paths.detection.display()))]
    pub fn load_engine(paths: &OcrModelPaths) -> Result<Arc<OcrsEngine>> {
        paths.validate()?;

        info!("Loading OCR models");
        let load = |path: &Path| {
            Model::load_file(path).map_err(|err| {
                ExamcutError::Config(format!("failed to load model {}: {}", path.display(), err))
            })
        };
        let detection_model = load(&paths.detection)?;
        let recognition_model = load(&paths.recognition)?;

        let engine = OcrsEngine::new(OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            ..Default::default()
        })
        .map_err(|err| ExamcutError::Config(format!("failed to initialise OCR engine: {}", err)))?;
        Ok(Arc::new(engine))
    }

    pub fn new(engine: Arc<OcrsEngine>, mode: OcrsMode) -> Self {
        Self { engine, mode }
    }

    /// Fast and accurate backends over one loaded engine.
    pub fn load_pair(paths: &OcrModelPaths) -> Result<LocalBackends> {
        let engine = Self::load_engine(paths)?;
        Ok(LocalBackends {
            fast: Some(Arc::new(Self::new(engine.clone(), OcrsMode::Fast))),
            accurate: Some(Arc::new(Self::new(engine, OcrsMode::Accurate))),
        })
    }
}

#[async_trait]
impl RecognitionBackend for OcrsBackend {
    fn name(&self) -> &str {
        match self.mode {
            OcrsMode::Fast => "ocrs-fast",
            OcrsMode::Accurate => "ocrs-accurate",
        }
    }

    async fn recognize(&self, region: &DynamicImage, column_index: u32) -> Result<Vec<RawLine>> {
        let engine = self.engine.clone();
        let mode = self.mode;
        let region = region.clone();
        let lines = tokio::task::spawn_blocking(move || run_ocrs(&engine, region, mode))
            .await
            .map_err(|e| ExamcutError::Recognition(format!("OCR task failed: {}", e)))??;
        debug!(column_index, lines = lines.len(), "ocrs recognition complete");
        Ok(lines)
    }
}

fn run_ocrs(engine: &OcrsEngine, region: DynamicImage, mode: OcrsMode) -> Result<Vec<RawLine>> {
    let (input_image, scale) = match mode {
        OcrsMode::Fast => (region, 1.0f32),
        OcrsMode::Accurate => (
            ScanEnhancer::from_dynamic(region)
                .prepare_for_recognition(ACCURATE_SCALE)
                .into_dynamic(),
            ACCURATE_SCALE,
        ),
    };

    let rgb = input_image.to_rgb8();
    let (width, height) = rgb.dimensions();
    let source = ImageSource::from_bytes(rgb.as_raw(), (width, height)).map_err(|err| {
        ExamcutError::Recognition(format!(
            "failed to create image source ({}x{}): {}",
            width, height, err
        ))
    })?;
    let input = engine
        .prepare_input(source)
        .map_err(|err| ExamcutError::Recognition(format!("OCR preprocessing failed: {}", err)))?;

    let word_rects = engine
        .detect_words(&input)
        .map_err(|err| ExamcutError::Recognition(format!("word detection failed: {}", err)))?;
    let line_rects = engine.find_text_lines(&input, &word_rects);
    let line_texts = engine
        .recognize_text(&input, &line_rects)
        .map_err(|err| ExamcutError::Recognition(format!("line recognition failed: {}", err)))?;

    let mut lines = Vec::with_capacity(line_texts.len());
    for line in line_texts.iter().flatten() {
        let text = line.to_string();
        if text.trim().is_empty() {
            continue;
        }
        let rect: rten_imageproc::Rect = line.bounding_rect();
        let unscale = |v: i32| (v as f32 / scale).round() as i32;
        lines.push(RawLine::new(
            text.trim(),
            (
                unscale(rect.left()),
                unscale(rect.top()),
                unscale(rect.right()),
                unscale(rect.bottom()),
            ),
            plausibility(&text),
        ));
    }
    Ok(lines)
}

/// Confidence estimate from how plausible the recognized characters are.
///
/// `ocrs` reports no scores, so lines made mostly of letters, digits and
/// ordinary punctuation score high and noise-like lines score low.
pub fn plausibility(text: &str) -> f32 {
    let chars: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
    if chars.is_empty() {
        return 0.0;
    }
    let plausible = chars
        .iter()
        .filter(|c| c.is_alphanumeric() || ".,;:()?!-+=/%'\"*<>[]".contains(**c))
        .count();
    let ratio = plausible as f32 / chars.len() as f32;
    let length_factor = if chars.len() < 3 { 0.7 } else { 1.0 };
    (0.4 + 0.6 * ratio) * length_factor
}
