// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline orchestrator — runs one extraction over a document, page by page.
//
// Each page goes render → layout → recognition per column → detection →
// crop → save, with a progress event at every phase transition. Errors are
// classified: per-page failures skip the page, anything else ends the run.
// Low-confidence questions are kept and flagged for review. The cancel
// token is checked at every phase boundary and pages already saved stay
// saved.

use std::path::PathBuf;
use std::sync::Arc;

use examcut_core::config::DetectionConfig;
use examcut_core::error::{ErrorClass, ExamcutError, Result, classify_error};
use examcut_core::geometry::BoundingBox;
use examcut_core::human_errors::humanize_error;
use examcut_core::traits::{PageRenderer, QuestionRepository};
use examcut_core::types::{
    Document, DocumentHints, Page, PublisherFormat, Question, RecognitionResult, Subject,
};
use examcut_document::crop::engine::CropEngine;
use examcut_document::detect::detector::QuestionDetector;
use examcut_document::layout::analyzer::LayoutAnalyzer;
use examcut_document::recognition::engine::RecognitionEngine;
use image::DynamicImage;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::learning::AdaptiveLearner;
use crate::progress::{
    CancelToken, Phase, ProgressEvent, ProgressReceiver, ProgressSender, progress_channel,
};

/// How a run ended.
#[derive(Debug)]
pub enum Outcome {
    /// Every page was attempted. `failed_pages` are zero-based.
    Completed {
        questions_found: u32,
        failed_pages: Vec<u32>,
    },
    /// Stopped by the cancel token; earlier pages remain saved.
    Cancelled { questions_saved: u32 },
    /// A configuration or persistence error ended the run.
    Failed { error: ExamcutError },
}

/// A run started with [`Orchestrator::start`].
pub struct RunHandle {
    pub events: ProgressReceiver,
    pub cancel: CancelToken,
    pub join: JoinHandle<Outcome>,
}

/// Sequences the extraction stages for whole documents.
#[derive(Clone)]
pub struct Orchestrator {
    renderer: Arc<dyn PageRenderer>,
    repository: Arc<dyn QuestionRepository>,
    engine: RecognitionEngine,
    crop_dir: PathBuf,
}

/// Mutable per-run state carried from page to page.
struct RunState {
    config: DetectionConfig,
    detector: QuestionDetector,
    analyzer: LayoutAnalyzer,
    cropper: CropEngine,
    hints: DocumentHints,
    hints_known: bool,
    saved: u32,
    failed_pages: Vec<u32>,
}

enum PageOutcome {
    Saved(u32),
    Skipped,
    Cancelled,
}

struct Reporter<'a> {
    events: &'a ProgressSender,
    total_pages: u32,
}

impl Reporter<'_> {
    fn send(&self, current_page: u32, phase: Phase, questions_found: u32, message: String) {
        // A host that dropped its receiver simply stops listening.
        let _ = self.events.send(ProgressEvent {
            current_page,
            total_pages: self.total_pages,
            phase,
            questions_found,
            message,
        });
    }
}

impl Orchestrator {
    pub fn new(
        renderer: Arc<dyn PageRenderer>,
        repository: Arc<dyn QuestionRepository>,
        engine: RecognitionEngine,
        crop_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            renderer,
            repository,
            engine,
            crop_dir: crop_dir.into(),
        }
    }

    /// Run on a background task. The handle carries the event stream, the
    /// cancel token and the task's join handle.
    pub fn start(&self, document: Document, config: DetectionConfig) -> RunHandle {
        let (tx, rx) = progress_channel();
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let this = self.clone();
        let join = tokio::spawn(async move { this.run(&document, &config, &tx, &token).await });
        RunHandle {
            events: rx,
            cancel,
            join,
        }
    }

    /// Extract every page of `document`.
    #[instrument(skip_all, fields(document = %document.id, pages = document.page_count))]
    pub async fn run(
        &self,
        document: &Document,
        config: &DetectionConfig,
        events: &ProgressSender,
        cancel: &CancelToken,
    ) -> Outcome {
        let reporter = Reporter {
            events,
            total_pages: document.page_count,
        };
        if cancel.is_cancelled() {
            return Outcome::Cancelled { questions_saved: 0 };
        }

        let mut state = match self.prepare(document, config) {
            Ok(state) => state,
            Err(err) => return fail(&reporter, 0, 0, err),
        };

        for page_number in 0..document.page_count {
            match self
                .process_page(document, page_number, &mut state, &reporter, cancel)
                .await
            {
                Ok(PageOutcome::Saved(count)) => state.saved += count,
                Ok(PageOutcome::Skipped) => state.failed_pages.push(page_number),
                Ok(PageOutcome::Cancelled) => {
                    info!(saved = state.saved, "Run cancelled");
                    return Outcome::Cancelled {
                        questions_saved: state.saved,
                    };
                }
                Err(err) => return fail(&reporter, page_number + 1, state.saved, err),
            }
        }

        let mut message = format!("Found {} questions", state.saved);
        if !state.failed_pages.is_empty() {
            message.push_str(&format!("; {} page(s) skipped", state.failed_pages.len()));
        }
        reporter.send(document.page_count, Phase::Complete, state.saved, message);
        info!(
            questions = state.saved,
            failed_pages = state.failed_pages.len(),
            "Run complete"
        );
        Outcome::Completed {
            questions_found: state.saved,
            failed_pages: state.failed_pages,
        }
    }

    /// Validate the configuration, fold in learned biases and build the
    /// per-run stages.
    fn prepare(&self, document: &Document, config: &DetectionConfig) -> Result<RunState> {
        config.validate()?;

        let mut config = config.clone();
        if config.adaptive_learning {
            match AdaptiveLearner::new(Arc::clone(&self.repository)).params_for(&document.id) {
                Ok(params) if !params.is_neutral() => {
                    info!(samples = params.sample_count, "Applying learned biases");
                    config = config.apply_learning(&params);
                }
                Ok(_) => debug!("No learned biases yet"),
                Err(err) => warn!(%err, "Learning unavailable; using configured padding"),
            }
        }

        Ok(RunState {
            detector: QuestionDetector::new(&config, document.hints.publisher_format)?,
            analyzer: LayoutAnalyzer::from_config(&config),
            cropper: CropEngine::new(&self.crop_dir, &config),
            hints: document.hints.clone(),
            hints_known: document.hints.publisher_format.is_some(),
            saved: 0,
            failed_pages: Vec::new(),
            config,
        })
    }

    async fn process_page(
        &self,
        document: &Document,
        page_number: u32,
        state: &mut RunState,
        reporter: &Reporter<'_>,
        cancel: &CancelToken,
    ) -> Result<PageOutcome> {
        let shown = page_number + 1;
        let total = document.page_count;
        let dpi = state.config.render_dpi;

        if cancel.is_cancelled() {
            return Ok(PageOutcome::Cancelled);
        }
        reporter.send(shown, Phase::Rendering, state.saved, format!("Rendering page {shown}/{total}"));
        let raster = match self.render(document, page_number, dpi).await {
            Ok(raster) => raster,
            Err(err) => return skip_or_abort(page_number, err),
        };
        let mut page = Page::new(page_number, raster, dpi);

        if cancel.is_cancelled() {
            return Ok(PageOutcome::Cancelled);
        }
        reporter.send(shown, Phase::AnalyzingLayout, state.saved, format!("Analyzing layout of page {shown}"));
        let layout = state.analyzer.apply(&mut page);

        if cancel.is_cancelled() {
            return Ok(PageOutcome::Cancelled);
        }
        reporter.send(
            shown,
            Phase::RunningOcr,
            state.saved,
            format!("Recognizing {} column(s) on page {shown}", layout.column_count),
        );
        let results = self.recognize_columns(&page, &state.config).await;
        if results.is_empty() {
            warn!(page = page_number, "No text recognized; skipping page");
            return Ok(PageOutcome::Skipped);
        }
        if !state.hints_known {
            self.detect_hints(document, &results, state);
        }

        if cancel.is_cancelled() {
            return Ok(PageOutcome::Cancelled);
        }
        reporter.send(shown, Phase::DetectingQuestions, state.saved, format!("Detecting questions on page {shown}"));
        let questions = state.detector.detect(&page, &results, document.id);

        if cancel.is_cancelled() {
            return Ok(PageOutcome::Cancelled);
        }
        reporter.send(
            shown,
            Phase::Cropping,
            state.saved,
            format!("Cropping {} question(s) on page {shown}", questions.len()),
        );
        let questions: Vec<Question> = questions
            .into_iter()
            .map(|q| state.cropper.crop(q, &page))
            .collect();

        if cancel.is_cancelled() {
            return Ok(PageOutcome::Cancelled);
        }
        reporter.send(shown, Phase::Saving, state.saved, format!("Saving page {shown}"));
        if let Err(err) = self.repository.insert_questions(&questions) {
            return skip_or_abort(page_number, err);
        }

        let count = questions.len() as u32;
        let flagged = questions
            .iter()
            .filter(|q| q.needs_review(state.config.min_question_confidence))
            .count();
        info!(page = page_number, questions = count, flagged, "Page saved");
        Ok(PageOutcome::Saved(count))
    }

    async fn render(&self, document: &Document, page_number: u32, dpi: u32) -> Result<DynamicImage> {
        let renderer = Arc::clone(&self.renderer);
        let document = document.clone();
        tokio::task::spawn_blocking(move || renderer.render(&document, page_number, dpi))
            .await
            .map_err(|e| ExamcutError::Render {
                page: page_number,
                reason: format!("render task: {e}"),
            })?
    }

    /// One recognition call per column; columns without text are left out.
    async fn recognize_columns(
        &self,
        page: &Page,
        config: &DetectionConfig,
    ) -> Vec<RecognitionResult> {
        let (width, height) = (page.width(), page.height());
        let mut results = Vec::new();
        for (index, (start, end)) in page.column_spans().into_iter().enumerate() {
            let placement =
                match BoundingBox::new(start as i32, 0, end as i32, height as i32, width, height) {
                    Ok(b) => b,
                    Err(err) => {
                        warn!(column = index, %err, "Skipping empty column");
                        continue;
                    }
                };
            let region = page.raster.crop_imm(start, 0, end - start, height);
            if let Some(result) = self
                .engine
                .recognize(&region, index as u32, placement, config)
                .await
            {
                results.push(result);
            }
        }
        results
    }

    /// Publisher and subject from the first recognized page, stored on the
    /// document. A newly recognized publisher also re-weights the patterns.
    fn detect_hints(&self, document: &Document, results: &[RecognitionResult], state: &mut RunState) {
        let text = results
            .iter()
            .map(|r| r.full_text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let publisher = PublisherFormat::detect(&text);
        state.hints.publisher_format = Some(publisher);
        if state.hints.subject.is_none() {
            let subject = Subject::classify(&text);
            if subject != Subject::Other {
                state.hints.subject = Some(subject);
            }
        }
        state.hints_known = true;

        if let Err(err) = self.repository.update_document_hints(&document.id, &state.hints) {
            warn!(%err, "Could not store document hints");
        }
        if publisher != PublisherFormat::Generic {
            match QuestionDetector::new(&state.config, Some(publisher)) {
                Ok(detector) => state.detector = detector,
                Err(err) => warn!(%err, "Keeping generic pattern weights"),
            }
        }
        debug!(?publisher, subject = ?state.hints.subject, "Document hints detected");
    }
}

/// Per-page and per-item failures skip the page; every other class is
/// returned to end the run.
fn skip_or_abort(page_number: u32, err: ExamcutError) -> Result<PageOutcome> {
    match classify_error(&err) {
        ErrorClass::PerPage | ErrorClass::Export => {
            warn!(page = page_number, %err, "Skipping page");
            Ok(PageOutcome::Skipped)
        }
        ErrorClass::Configuration | ErrorClass::Fatal => Err(err),
    }
}

fn fail(reporter: &Reporter<'_>, page: u32, saved: u32, err: ExamcutError) -> Outcome {
    let class = classify_error(&err);
    error!(%err, ?class, "Run failed");
    let message = humanize_error(&err).to_string();
    reporter.send(page, Phase::Error, saved, message);
    Outcome::Failed { error: err }
}

#[cfg(test)]
mod tests {
    use super::*;
    use examcut_document::recognition::backend::RawLine;
    use examcut_document::recognition::static_backend::StaticBackend;
    use examcut_store::SqliteRepository;
    use image::{GrayImage, Luma};
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;
    use std::sync::Mutex;

    const W: u32 = 1000;
    const H: u32 = 1400;

    /// White page with black text bars spanning `[x0, x1)` every 30px.
    fn page_with_bars(spans: &[(i32, i32)]) -> DynamicImage {
        let mut img = GrayImage::from_pixel(W, H, Luma([255u8]));
        let mut y = 60;
        while y + 12 < H as i32 - 60 {
            for (x0, x1) in spans {
                draw_filled_rect_mut(
                    &mut img,
                    Rect::at(*x0, y).of_size((*x1 - *x0) as u32, 12),
                    Luma([0u8]),
                );
            }
            y += 30;
        }
        DynamicImage::ImageLuma8(img)
    }

    /// Stem plus options A to D, region-local coordinates.
    fn question_lines(number: u32, top: i32, left: i32, right: i32) -> Vec<RawLine> {
        let mut lines = vec![RawLine::new(
            format!("{number}. Aşağıdakilerden hangisi doğrudur?"),
            (left, top, right, top + 20),
            0.92,
        )];
        for (i, label) in ['A', 'B', 'C', 'D'].into_iter().enumerate() {
            let y = top + 30 * (i as i32 + 1);
            lines.push(RawLine::new(format!("{label}) seçenek {number}"), (left, y, right, y + 20), 0.9));
        }
        lines
    }

    /// Serves prepared pages; `None` fails to render. Optionally cancels a
    /// token when a given page is requested.
    struct FakeRenderer {
        pages: Vec<Option<DynamicImage>>,
        cancel_on: Mutex<Option<(u32, CancelToken)>>,
    }

    impl FakeRenderer {
        fn new(pages: Vec<Option<DynamicImage>>) -> Self {
            Self {
                pages,
                cancel_on: Mutex::new(None),
            }
        }

        fn cancelling_at(self, page: u32, token: CancelToken) -> Self {
            if let Ok(mut slot) = self.cancel_on.lock() {
                *slot = Some((page, token));
            }
            self
        }
    }

    impl PageRenderer for FakeRenderer {
        fn render(&self, _document: &Document, page_number: u32, _dpi: u32) -> Result<DynamicImage> {
            if let Ok(slot) = self.cancel_on.lock() {
                if let Some((page, token)) = slot.as_ref() {
                    if *page == page_number {
                        token.cancel();
                    }
                }
            }
            self.pages
                .get(page_number as usize)
                .cloned()
                .flatten()
                .ok_or_else(|| ExamcutError::Render {
                    page: page_number,
                    reason: "scanner jam".into(),
                })
        }
    }

    struct Fixture {
        orchestrator: Orchestrator,
        repo: Arc<SqliteRepository>,
        document: Document,
        _crops: tempfile::TempDir,
    }

    fn fixture(renderer: FakeRenderer, responses: Vec<Vec<RawLine>>) -> Fixture {
        let repo = Arc::new(SqliteRepository::open_in_memory().expect("db"));
        let document = Document::new("/tmp/deneme", renderer.pages.len() as u32, 1, "hash".into());
        repo.upsert_document(&document).expect("document");
        let crops = tempfile::tempdir().expect("tempdir");
        let engine = RecognitionEngine::single(Arc::new(StaticBackend::sequence(responses)));
        let orchestrator = Orchestrator::new(
            Arc::new(renderer),
            Arc::clone(&repo) as Arc<dyn QuestionRepository>,
            engine,
            crops.path(),
        );
        Fixture {
            orchestrator,
            repo,
            document,
            _crops: crops,
        }
    }

    /// Page 1 single column with questions 1-3; page 2 two columns with 4-5
    /// on the left and 6-7 on the right.
    fn two_page_script() -> (Vec<Option<DynamicImage>>, Vec<Vec<RawLine>>) {
        let pages = vec![
            Some(page_with_bars(&[(100, 900)])),
            Some(page_with_bars(&[(80, 460), (540, 920)])),
        ];
        let page_one: Vec<RawLine> = [(1, 100), (2, 400), (3, 700)]
            .into_iter()
            .flat_map(|(n, top)| question_lines(n, top, 100, 900))
            .collect();
        let left: Vec<RawLine> = [(4, 100), (5, 500)]
            .into_iter()
            .flat_map(|(n, top)| question_lines(n, top, 80, 450))
            .collect();
        let right: Vec<RawLine> = [(6, 100), (7, 500)]
            .into_iter()
            .flat_map(|(n, top)| question_lines(n, top, 40, 400))
            .collect();
        (pages, vec![page_one, left, right])
    }

    async fn drain(mut rx: ProgressReceiver) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn two_pages_yield_seven_questions() {
        let (pages, responses) = two_page_script();
        let fx = fixture(FakeRenderer::new(pages), responses);
        let handle = fx
            .orchestrator
            .start(fx.document.clone(), DetectionConfig::default());
        let outcome = handle.join.await.expect("join");
        let events = drain(handle.events).await;

        match outcome {
            Outcome::Completed {
                questions_found,
                failed_pages,
            } => {
                assert_eq!(questions_found, 7);
                assert!(failed_pages.is_empty());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        let last = events.last().expect("events");
        assert_eq!(last.phase, Phase::Complete);
        assert_eq!(last.questions_found, 7);

        let stored = fx.repo.questions_for_document(&fx.document.id).expect("list");
        let placement: Vec<(u32, u32, u32)> = stored
            .iter()
            .map(|q| (q.question_number, q.page_number, q.column_index))
            .collect();
        assert_eq!(
            placement,
            vec![
                (1, 0, 0),
                (2, 0, 0),
                (3, 0, 0),
                (4, 1, 0),
                (5, 1, 0),
                (6, 1, 1),
                (7, 1, 1),
            ]
        );
        assert!(stored.iter().all(|q| q.has_complete_options()));
        assert!(stored.iter().all(|q| q.crop_image_path.is_some()));
        let right_column = stored.iter().find(|q| q.question_number == 6).expect("q6");
        assert!(right_column.bounding_box.left > 400);
    }

    #[tokio::test]
    async fn phases_arrive_in_order() {
        let (pages, responses) = two_page_script();
        let fx = fixture(FakeRenderer::new(pages), responses);
        let (tx, rx) = progress_channel();
        fx.orchestrator
            .run(&fx.document, &DetectionConfig::default(), &tx, &CancelToken::new())
            .await;
        drop(tx);
        let events = drain(rx).await;

        let first_page: Vec<Phase> = events
            .iter()
            .filter(|e| e.current_page == 1)
            .map(|e| e.phase)
            .collect();
        assert_eq!(
            first_page,
            vec![
                Phase::Rendering,
                Phase::AnalyzingLayout,
                Phase::RunningOcr,
                Phase::DetectingQuestions,
                Phase::Cropping,
                Phase::Saving,
            ]
        );
        assert!(events.iter().all(|e| e.total_pages == 2));
    }

    #[tokio::test]
    async fn failed_render_skips_page() {
        let pages = vec![None, Some(page_with_bars(&[(100, 900)]))];
        let responses = vec![
            [(1, 100), (2, 400)]
                .into_iter()
                .flat_map(|(n, top)| question_lines(n, top, 100, 900))
                .collect(),
        ];
        let fx = fixture(FakeRenderer::new(pages), responses);
        let (tx, rx) = progress_channel();
        let outcome = fx
            .orchestrator
            .run(&fx.document, &DetectionConfig::default(), &tx, &CancelToken::new())
            .await;
        drop(tx);

        match outcome {
            Outcome::Completed {
                questions_found,
                failed_pages,
            } => {
                assert_eq!(questions_found, 2);
                assert_eq!(failed_pages, vec![0]);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        let events = drain(rx).await;
        let last = events.last().expect("events");
        assert_eq!((last.phase, last.questions_found), (Phase::Complete, 2));
        let stored = fx.repo.questions_for_document(&fx.document.id).expect("list");
        assert!(stored.iter().all(|q| q.page_number == 1));
    }

    #[tokio::test]
    async fn cancellation_keeps_saved_pages() {
        let (pages, responses) = two_page_script();
        let token = CancelToken::new();
        let renderer = FakeRenderer::new(pages).cancelling_at(1, token.clone());
        let fx = fixture(renderer, responses);
        let (tx, rx) = progress_channel();
        let outcome = fx
            .orchestrator
            .run(&fx.document, &DetectionConfig::default(), &tx, &token)
            .await;
        drop(tx);

        assert!(matches!(outcome, Outcome::Cancelled { questions_saved: 3 }));
        let events = drain(rx).await;
        let last = events.last().expect("events");
        assert_eq!((last.current_page, last.phase), (2, Phase::Rendering));
        assert!(events.iter().all(|e| !e.phase.is_terminal()));
        assert_eq!(fx.repo.count_questions(Some(&fx.document.id)).expect("count"), 3);
    }

    #[tokio::test]
    async fn cancelled_before_start_emits_nothing() {
        let (pages, responses) = two_page_script();
        let fx = fixture(FakeRenderer::new(pages), responses);
        let (tx, rx) = progress_channel();
        let token = CancelToken::new();
        token.cancel();
        let outcome = fx
            .orchestrator
            .run(&fx.document, &DetectionConfig::default(), &tx, &token)
            .await;
        drop(tx);
        assert!(matches!(outcome, Outcome::Cancelled { questions_saved: 0 }));
        assert!(drain(rx).await.is_empty());
    }

    #[tokio::test]
    async fn invalid_config_fails_before_processing() {
        let (pages, responses) = two_page_script();
        let fx = fixture(FakeRenderer::new(pages), responses);
        let config = DetectionConfig {
            render_dpi: 5,
            ..Default::default()
        };
        let (tx, rx) = progress_channel();
        let outcome = fx
            .orchestrator
            .run(&fx.document, &config, &tx, &CancelToken::new())
            .await;
        drop(tx);

        assert!(matches!(
            outcome,
            Outcome::Failed {
                error: ExamcutError::Config(_)
            }
        ));
        let events = drain(rx).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].phase, Phase::Error);
        assert_eq!(fx.repo.count_questions(None).expect("count"), 0);
    }

    #[tokio::test]
    async fn optionless_question_is_kept_for_review() {
        let pages = vec![Some(page_with_bars(&[(100, 900)]))];
        let lines = vec![
            RawLine::new("1. Şekildeki grafiğe göre hangisi doğrudur?", (100, 100, 900, 120), 0.55),
            RawLine::new("Grafik yukarıda verilmiştir.", (100, 130, 900, 150), 0.55),
            RawLine::new("Seçenekler şekil olarak basılmıştır.", (100, 160, 900, 180), 0.55),
        ];
        let fx = fixture(FakeRenderer::new(pages), vec![lines]);
        let config = DetectionConfig::default();
        let (tx, _rx) = progress_channel();
        let outcome = fx
            .orchestrator
            .run(&fx.document, &config, &tx, &CancelToken::new())
            .await;

        assert!(matches!(outcome, Outcome::Completed { questions_found: 1, .. }));
        let stored = fx.repo.questions_for_document(&fx.document.id).expect("list");
        assert_eq!(stored.len(), 1);
        assert!(stored[0].confidence < config.min_question_confidence);
        assert!(stored[0].needs_review(config.min_question_confidence));
    }

    /// Fails every page with an error the run cannot continue past.
    struct UnreadableSource;

    impl PageRenderer for UnreadableSource {
        fn render(&self, _document: &Document, _page_number: u32, _dpi: u32) -> Result<DynamicImage> {
            Err(ExamcutError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "source unreadable",
            )))
        }
    }

    #[tokio::test]
    async fn fatal_render_error_ends_run() {
        let repo = Arc::new(SqliteRepository::open_in_memory().expect("db"));
        let document = Document::new("/tmp/deneme", 2, 1, "hash".into());
        repo.upsert_document(&document).expect("document");
        let crops = tempfile::tempdir().expect("tempdir");
        let orchestrator = Orchestrator::new(
            Arc::new(UnreadableSource),
            Arc::clone(&repo) as Arc<dyn QuestionRepository>,
            RecognitionEngine::single(Arc::new(StaticBackend::sequence(Vec::new()))),
            crops.path(),
        );
        let (tx, rx) = progress_channel();
        let outcome = orchestrator
            .run(&document, &DetectionConfig::default(), &tx, &CancelToken::new())
            .await;
        drop(tx);

        assert!(matches!(
            outcome,
            Outcome::Failed {
                error: ExamcutError::Io(_)
            }
        ));
        let events = drain(rx).await;
        let last = events.last().expect("events");
        assert_eq!((last.current_page, last.phase), (1, Phase::Error));
    }

    #[tokio::test]
    async fn hints_are_stored_after_first_page() {
        let pages = vec![Some(page_with_bars(&[(100, 900)]))];
        let mut lines = question_lines(1, 100, 100, 900);
        lines.insert(
            0,
            RawLine::new("TYT Deneme Sınavı - denklem ve fonksiyon", (100, 40, 900, 60), 0.9),
        );
        let fx = fixture(FakeRenderer::new(pages), vec![lines]);
        let (tx, _rx) = progress_channel();
        fx.orchestrator
            .run(&fx.document, &DetectionConfig::default(), &tx, &CancelToken::new())
            .await;

        let stored = fx.repo.get_document(&fx.document.id).expect("get").expect("found");
        assert_eq!(stored.hints.publisher_format, Some(PublisherFormat::Osym));
        assert_eq!(stored.hints.subject, Some(Subject::Mathematics));
    }
}
