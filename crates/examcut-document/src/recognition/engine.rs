// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Recognition engine — picks backends from the configuration, runs them on a
// column region and maps their lines into page space.

use std::sync::Arc;

use examcut_core::config::{DetectionConfig, OcrEngineKind};
use examcut_core::error::{ExamcutError, Result};
use examcut_core::geometry::BoundingBox;
use examcut_core::traits::CredentialProvider;
use examcut_core::types::{RecognitionResult, RecognizedLine};
use image::DynamicImage;
use tracing::{debug, info, instrument, warn};

use super::backend::{RawLine, RecognitionBackend};
use super::remote::RemoteVisionBackend;

/// Locally available backends handed to [`RecognitionEngine::from_config`].
#[derive(Clone, Default)]
pub struct LocalBackends {
    pub fast: Option<Arc<dyn RecognitionBackend>>,
    pub accurate: Option<Arc<dyn RecognitionBackend>>,
}

#[derive(Clone)]
enum Mode {
    Single(Arc<dyn RecognitionBackend>),
    /// Fast first; accurate replaces it when confidence is too low.
    Hybrid {
        fast: Arc<dyn RecognitionBackend>,
        accurate: Arc<dyn RecognitionBackend>,
    },
}

/// Runs recognition over column regions with the configured backend(s).
#[derive(Clone)]
pub struct RecognitionEngine {
    mode: Mode,
}

impl RecognitionEngine {
    // -- Construction ---------------------------------------------------------

    pub fn single(backend: Arc<dyn RecognitionBackend>) -> Self {
        Self {
            mode: Mode::Single(backend),
        }
    }

    pub fn hybrid(fast: Arc<dyn RecognitionBackend>, accurate: Arc<dyn RecognitionBackend>) -> Self {
        Self {
            mode: Mode::Hybrid { fast, accurate },
        }
    }

    /// Build the engine `config.ocr_engine` asks for.
    ///
    /// Fails with a configuration error when a required local backend is
    /// missing or a remote provider has no credential, so a run never starts
    /// with an engine that cannot work.
    pub fn from_config(
        config: &DetectionConfig,
        local: LocalBackends,
        credentials: &dyn CredentialProvider,
    ) -> Result<Self> {
        let missing = |which: &str| {
            ExamcutError::Config(format!(
                "{which} recognition backend is not available in this build"
            ))
        };

        let engine = match config.ocr_engine {
            OcrEngineKind::LocalFast => Self::single(local.fast.ok_or_else(|| missing("fast"))?),
            OcrEngineKind::LocalAccurate => {
                Self::single(local.accurate.ok_or_else(|| missing("accurate"))?)
            }
            OcrEngineKind::Hybrid => Self::hybrid(
                local.fast.ok_or_else(|| missing("fast"))?,
                local.accurate.ok_or_else(|| missing("accurate"))?,
            ),
            OcrEngineKind::RemoteVision(provider) => {
                let backend = RemoteVisionBackend::from_config(config, provider, credentials)?;
                Self::single(Arc::new(backend))
            }
        };

        info!(engine = %engine.describe(), "Recognition engine ready");
        Ok(engine)
    }

    /// Backend names, for logs.
    pub fn describe(&self) -> String {
        match &self.mode {
            Mode::Single(backend) => backend.name().to_owned(),
            Mode::Hybrid { fast, accurate } => {
                format!("hybrid({}, {})", fast.name(), accurate.name())
            }
        }
    }

    // -- Recognition ----------------------------------------------------------

    /// Recognize one column region.
    ///
    /// `placement` is where `region` sits on the page; its top-left corner is
    /// added to every line and its page size is stamped on every box. Backend
    /// failures and empty output are logged and yield `None`.
    #[instrument(skip_all, fields(column = column_index, region = %placement))]
    pub async fn recognize(
        &self,
        region: &DynamicImage,
        column_index: u32,
        placement: BoundingBox,
        config: &DetectionConfig,
    ) -> Option<RecognitionResult> {
        match &self.mode {
            Mode::Single(backend) => {
                run_backend(backend.as_ref(), region, column_index, placement).await
            }
            Mode::Hybrid { fast, accurate } => {
                let first = run_backend(fast.as_ref(), region, column_index, placement).await;
                if let Some(result) = &first {
                    let mean = result.mean_confidence();
                    if mean >= config.min_option_confidence {
                        return first;
                    }
                    debug!(
                        mean,
                        threshold = config.min_option_confidence,
                        "Fast result below threshold; running accurate backend"
                    );
                }
                run_backend(accurate.as_ref(), region, column_index, placement).await
            }
        }
    }
}

async fn run_backend(
    backend: &dyn RecognitionBackend,
    region: &DynamicImage,
    column_index: u32,
    placement: BoundingBox,
) -> Option<RecognitionResult> {
    match backend.recognize(region, column_index).await {
        Ok(raw) if raw.is_empty() => {
            debug!(backend = backend.name(), "Backend returned no lines");
            None
        }
        Ok(raw) => to_page_space(raw, column_index, placement, backend.name()),
        Err(err) => {
            warn!(backend = backend.name(), %err, "Recognition failed");
            None
        }
    }
}

/// Offset region-local lines into page space, drop empty or degenerate ones
/// and order the rest top to bottom.
fn to_page_space(
    raw: Vec<RawLine>,
    column_index: u32,
    placement: BoundingBox,
    backend: &str,
) -> Option<RecognitionResult> {
    let page_w = placement.page_width as i32;
    let page_h = placement.page_height as i32;

    let mut lines: Vec<RecognizedLine> = raw
        .into_iter()
        .filter_map(|line| {
            let text = line.text.trim().to_owned();
            if text.is_empty() {
                return None;
            }
            let bbox = BoundingBox::new(
                (line.left + placement.left).clamp(0, page_w),
                (line.top + placement.top).clamp(0, page_h),
                (line.right + placement.left).clamp(0, page_w),
                (line.bottom + placement.top).clamp(0, page_h),
                placement.page_width,
                placement.page_height,
            )
            .ok()?;
            Some(RecognizedLine {
                text,
                bounding_box: bbox,
                confidence: line.confidence.clamp(0.0, 1.0),
                line_index: 0,
            })
        })
        .collect();

    if lines.is_empty() {
        return None;
    }

    lines.sort_by_key(|l| (l.bounding_box.top, l.bounding_box.left));
    for (i, line) in lines.iter_mut().enumerate() {
        line.line_index = i;
    }
    let full_text = lines
        .iter()
        .map(|l| l.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    Some(RecognitionResult {
        full_text,
        lines,
        column_index,
        region: placement,
        backend: backend.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::static_backend::StaticBackend;
    use examcut_core::config::RemoteProvider;
    use examcut_core::traits::StaticCredentialProvider;
    use image::GrayImage;

    fn region() -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::new(400, 600))
    }

    fn placement() -> BoundingBox {
        BoundingBox::new(500, 0, 900, 600, 1000, 1400).expect("valid")
    }

    fn line(text: &str, top: i32, confidence: f32) -> RawLine {
        RawLine::new(text, (10, top, 300, top + 20), confidence)
    }

    #[tokio::test]
    async fn single_backend_offsets_lines() {
        let backend = StaticBackend::fixed(vec![line("2. Soru", 40, 0.9), line("1. Soru", 10, 0.9)]);
        let engine = RecognitionEngine::single(Arc::new(backend));
        let result = engine
            .recognize(&region(), 1, placement(), &DetectionConfig::default())
            .await
            .expect("lines");

        assert_eq!(result.column_index, 1);
        assert_eq!(result.lines[0].text, "1. Soru");
        assert_eq!(result.lines[0].bounding_box.left, 510);
        assert_eq!(result.lines[0].bounding_box.page_width, 1000);
        assert_eq!(result.lines[1].line_index, 1);
        assert_eq!(result.full_text, "1. Soru\n2. Soru");
    }

    #[tokio::test]
    async fn hybrid_keeps_confident_fast_result() {
        let fast = StaticBackend::fixed(vec![line("fast", 10, 0.9)]).named("fast");
        let accurate = StaticBackend::fixed(vec![line("accurate", 10, 0.99)]).named("accurate");
        let engine = RecognitionEngine::hybrid(Arc::new(fast), Arc::new(accurate));
        let result = engine
            .recognize(&region(), 0, placement(), &DetectionConfig::default())
            .await
            .expect("lines");
        assert_eq!(result.backend, "fast");
    }

    #[tokio::test]
    async fn hybrid_replaces_weak_fast_result() {
        let fast = StaticBackend::fixed(vec![line("f1", 10, 0.3), line("f2", 40, 0.4)]).named("fast");
        let accurate = StaticBackend::fixed(vec![line("a1", 10, 0.95)]).named("accurate");
        let engine = RecognitionEngine::hybrid(Arc::new(fast), Arc::new(accurate));
        let result = engine
            .recognize(&region(), 0, placement(), &DetectionConfig::default())
            .await
            .expect("lines");
        assert_eq!(result.backend, "accurate");
        assert_eq!(result.lines.len(), 1);
        assert_eq!(result.lines[0].text, "a1");
    }

    #[tokio::test]
    async fn empty_output_is_none() {
        let engine = RecognitionEngine::single(Arc::new(StaticBackend::fixed(vec![
            RawLine::new("   ", (0, 0, 10, 10), 0.9),
            RawLine::new("x", (5, 5, 5, 9), 0.9),
        ])));
        let result = engine
            .recognize(&region(), 0, placement(), &DetectionConfig::default())
            .await;
        assert!(result.is_none());
    }

    #[test]
    fn remote_without_credential_is_config_error() {
        let config = DetectionConfig {
            ocr_engine: OcrEngineKind::RemoteVision(RemoteProvider::OpenAi),
            ..Default::default()
        };
        let err = RecognitionEngine::from_config(
            &config,
            LocalBackends::default(),
            &StaticCredentialProvider::new(),
        )
        .err()
        .expect("must fail");
        assert!(matches!(err, ExamcutError::MissingCredential { .. }));
    }

    #[test]
    fn remote_with_credential_builds() {
        let config = DetectionConfig {
            ocr_engine: OcrEngineKind::RemoteVision(RemoteProvider::Gemini),
            ..Default::default()
        };
        let creds = StaticCredentialProvider::new().with(RemoteProvider::Gemini, "key");
        let engine = RecognitionEngine::from_config(&config, LocalBackends::default(), &creds)
            .expect("engine");
        assert_eq!(engine.describe(), "gemini");
    }

    #[test]
    fn hybrid_requires_both_local_backends() {
        let local = LocalBackends {
            fast: Some(Arc::new(StaticBackend::fixed(Vec::new()))),
            accurate: None,
        };
        let result = RecognitionEngine::from_config(
            &DetectionConfig::default(),
            local,
            &StaticCredentialProvider::new(),
        );
        assert!(matches!(result, Err(ExamcutError::Config(_))));
    }
}
