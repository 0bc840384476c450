// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Central service layer — opens the database and settings once and gives the
// command handlers one place to reach the store, the pipeline and the crop
// engine.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use examcut_core::config::{DetectionConfig, OcrEngineKind};
use examcut_core::error::{ExamcutError, Result};
use examcut_core::geometry::BoundingBox;
use examcut_core::traits::{EnvCredentialProvider, PageRenderer, QuestionRepository, correction_for};
use examcut_core::types::{
    AccuracyMetrics, Document, DocumentId, LearnedParams, Page, Question, QuestionId,
};
use examcut_document::crop::{CropEngine, ExportOptions, ExportReport, export_questions};
use examcut_document::recognition::{LocalBackends, RecognitionEngine};
use examcut_pipeline::{AdaptiveLearner, DocumentImporter, Orchestrator, accuracy_metrics};
use examcut_store::SqliteRepository;
use tracing::{info, warn};

use super::data_dir;

/// Shared services for every command.
///
/// All fields are Arc-wrapped so the struct can be cloned into spawned
/// extraction tasks.
#[derive(Clone)]
pub struct AppServices {
    repository: Arc<SqliteRepository>,
    data_dir: PathBuf,
    config_path: PathBuf,
    config: Arc<Mutex<DetectionConfig>>,
}

impl AppServices {
    /// Open the data directory (default location unless overridden), the
    /// database inside it, and the settings file.
    pub fn init(data_dir: Option<PathBuf>, config_path: Option<PathBuf>) -> Result<Self> {
        let dir = match data_dir {
            Some(dir) => {
                std::fs::create_dir_all(&dir)?;
                dir
            }
            None => data_dir::data_dir()?,
        };
        info!(path = %dir.display(), "Opening data directory");

        let repository = SqliteRepository::open(dir.join("examcut.db"))?;
        let config_path = config_path.unwrap_or_else(|| dir.join(data_dir::CONFIG_FILE));
        let config = data_dir::load_config(&config_path)?;

        Ok(Self {
            repository: Arc::new(repository),
            data_dir: dir,
            config_path,
            config: Arc::new(Mutex::new(config)),
        })
    }

    pub fn repository(&self) -> Arc<dyn QuestionRepository> {
        Arc::clone(&self.repository) as Arc<dyn QuestionRepository>
    }

    // -- Config Persistence --------------------------------------------------

    /// A snapshot of the current settings.
    pub fn config(&self) -> DetectionConfig {
        match self.config.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Validate, keep and persist `config`.
    pub fn save_config(&self, config: &DetectionConfig) -> Result<()> {
        config.validate()?;
        match self.config.lock() {
            Ok(mut guard) => *guard = config.clone(),
            Err(poisoned) => *poisoned.into_inner() = config.clone(),
        }
        data_dir::persist_config(&self.config_path, config)?;
        info!(path = %self.config_path.display(), "Settings saved");
        Ok(())
    }

    pub fn crop_dir(&self) -> Result<PathBuf> {
        data_dir::data_subdir(&self.data_dir, "crops")
    }

    // -- Documents -----------------------------------------------------------

    /// Import `path`, or return the stored document with the same content.
    /// The flag is `true` when the document is new.
    pub fn import(&self, path: &Path) -> Result<(Document, bool)> {
        let document = DocumentImporter::new().import(path)?;
        if let Some(existing) = self.repository.find_document_by_hash(&document.content_hash)? {
            info!(document = %existing.id, "Document already imported");
            return Ok((existing, false));
        }
        self.repository.upsert_document(&document)?;
        Ok((document, true))
    }

    pub fn documents(&self) -> Result<Vec<Document>> {
        self.repository.list_documents()
    }

    /// Find a document by full id or unique id prefix.
    pub fn resolve_document(&self, key: &str) -> Result<Document> {
        if let Some(id) = DocumentId::parse(key) {
            return self
                .repository
                .get_document(&id)?
                .ok_or_else(|| ExamcutError::not_found("document", key));
        }
        let matches: Vec<Document> = self
            .documents()?
            .into_iter()
            .filter(|d| d.id.to_string().starts_with(key))
            .collect();
        unique(matches, "document", key)
    }

    pub fn questions(&self, document_id: &DocumentId) -> Result<Vec<Question>> {
        self.repository.questions_for_document(document_id)
    }

    /// Delete a document and the crops written for it.
    pub fn delete_document(&self, document: &Document) -> Result<()> {
        self.repository.delete_document(&document.id)?;
        let crops = self.crop_dir()?.join(document.id.to_string());
        if crops.exists() {
            if let Err(e) = std::fs::remove_dir_all(&crops) {
                warn!(path = %crops.display(), error = %e, "Could not remove crops");
            }
        }
        info!(document = %document.id, "Document deleted");
        Ok(())
    }

    // -- Questions -----------------------------------------------------------

    /// Find a question by full id or unique id prefix.
    pub fn resolve_question(&self, key: &str) -> Result<Question> {
        if let Some(id) = QuestionId::parse(key) {
            return self
                .repository
                .get_question(&id)?
                .ok_or_else(|| ExamcutError::not_found("question", key));
        }
        let mut matches = Vec::new();
        for document in self.documents()? {
            self.repository.for_each_question(&document.id, &mut |q| {
                if q.id.to_string().starts_with(key) {
                    matches.push(q);
                }
                Ok(())
            })?;
        }
        unique(matches, "question", key)
    }

    pub fn set_verified(&self, id: &QuestionId, verified: bool) -> Result<()> {
        self.repository.set_verified(id, verified)
    }

    /// Record a boundary correction and, when the page can be rendered,
    /// re-crop the question with the new box.
    pub fn correct(
        &self,
        question: &Question,
        edges: [i32; 4],
        renderer: Option<&dyn PageRenderer>,
    ) -> Result<Question> {
        let [left, top, right, bottom] = edges;
        let original = question.bounding_box;
        let new_box = BoundingBox::new(
            left,
            top,
            right,
            bottom,
            original.page_width,
            original.page_height,
        )?;
        self.repository
            .record_correction(&correction_for(question, new_box))?;

        let mut updated = question.clone();
        updated.bounding_box = new_box;
        let Some(renderer) = renderer else {
            return Ok(updated);
        };

        let document = self
            .repository
            .get_document(&question.document_id)?
            .ok_or_else(|| ExamcutError::not_found("document", question.document_id))?;
        let config = self.config();
        let raster = renderer.render(&document, question.page_number, config.render_dpi)?;
        let page = Page::new(question.page_number, raster, config.render_dpi);
        let updated = CropEngine::new(self.crop_dir()?, &config)
            .recrop_with_new_boundary(updated, new_box, &page);
        self.repository
            .set_crop_path(&updated.id, updated.crop_image_path.as_deref())?;
        Ok(updated)
    }

    // -- Extraction ----------------------------------------------------------

    /// Build the recognition engine `config` asks for.
    pub fn recognition_engine(
        &self,
        config: &DetectionConfig,
        models: Option<&Path>,
    ) -> Result<RecognitionEngine> {
        let local = local_backends(config, models)?;
        RecognitionEngine::from_config(config, local, &EnvCredentialProvider)
    }

    pub fn orchestrator(
        &self,
        renderer: Arc<dyn PageRenderer>,
        engine: RecognitionEngine,
    ) -> Result<Orchestrator> {
        Ok(Orchestrator::new(
            renderer,
            self.repository(),
            engine,
            self.crop_dir()?,
        ))
    }

    // -- Learning and metrics --------------------------------------------------

    pub fn learn(&self, document_id: Option<&DocumentId>) -> Result<LearnedParams> {
        let learner = AdaptiveLearner::new(self.repository());
        match document_id {
            Some(id) => learner.learn(id),
            None => learner.learn_all(),
        }
    }

    pub fn metrics(&self, document_id: Option<&DocumentId>) -> Result<AccuracyMetrics> {
        accuracy_metrics(self.repository.as_ref(), document_id)
    }

    // -- Export ----------------------------------------------------------------

    pub fn export(
        &self,
        document: &Document,
        destination: &Path,
        options: &ExportOptions,
        verified_only: bool,
    ) -> Result<ExportReport> {
        let mut questions = self.questions(&document.id)?;
        if verified_only {
            questions.retain(|q| q.verified);
        }
        std::fs::create_dir_all(destination)?;
        Ok(export_questions(&questions, destination, options))
    }
}

fn unique<T>(mut matches: Vec<T>, entity: &'static str, key: &str) -> Result<T> {
    match matches.len() {
        0 => Err(ExamcutError::not_found(entity, key)),
        1 => Ok(matches.remove(0)),
        n => Err(ExamcutError::Config(format!(
            "{n} {entity}s start with `{key}`; give more of the id"
        ))),
    }
}

#[cfg(feature = "ocr")]
fn local_backends(config: &DetectionConfig, models: Option<&Path>) -> Result<LocalBackends> {
    use examcut_document::recognition::{OcrModelPaths, OcrsBackend};

    if matches!(config.ocr_engine, OcrEngineKind::RemoteVision(_)) {
        return Ok(LocalBackends::default());
    }
    let paths = models.map(OcrModelPaths::from_dir).unwrap_or_default();
    paths.validate()?;
    OcrsBackend::load_pair(&paths)
}

#[cfg(not(feature = "ocr"))]
fn local_backends(config: &DetectionConfig, models: Option<&Path>) -> Result<LocalBackends> {
    if models.is_some() && !matches!(config.ocr_engine, OcrEngineKind::RemoteVision(_)) {
        warn!("--models is ignored: this build has no local recognition");
    }
    Ok(LocalBackends::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use examcut_core::types::{ContentFlags, PublisherFormat, Subject};
    use examcut_pipeline::ImageDirRenderer;
    use image::{GrayImage, Luma};

    /// Blank 200x280 pages named page_001.png, ...
    fn write_pages(dir: &Path, count: u32) {
        for n in 1..=count {
            GrayImage::from_pixel(200, 280, Luma([255u8]))
                .save(dir.join(format!("page_{n:03}.png")))
                .expect("write");
        }
    }

    fn services(root: &Path) -> AppServices {
        AppServices::init(Some(root.join("data")), None).expect("init")
    }

    fn question(document: &Document, number: u32) -> Question {
        Question {
            id: QuestionId::new(),
            document_id: document.id,
            page_number: 0,
            question_number: number,
            text: format!("{number}. Soru"),
            options: Vec::new(),
            bounding_box: BoundingBox::new(20, 20, 180, 120, 200, 280).expect("box"),
            crop_image_path: None,
            subject: Subject::Other,
            confidence: 0.9,
            verified: false,
            flags: ContentFlags::default(),
            column_index: 0,
            publisher_format: PublisherFormat::Generic,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn reimport_returns_existing_document() {
        let root = tempfile::tempdir().expect("tempdir");
        let pages = root.path().join("scan");
        std::fs::create_dir_all(&pages).expect("mkdir");
        write_pages(&pages, 2);

        let svc = services(root.path());
        let (first, new) = svc.import(&pages).expect("import");
        assert!(new);
        assert_eq!(first.page_count, 2);
        let (again, new) = svc.import(&pages).expect("import");
        assert!(!new);
        assert_eq!(again.id, first.id);
        assert_eq!(svc.documents().expect("list").len(), 1);
    }

    #[test]
    fn documents_resolve_by_prefix() {
        let root = tempfile::tempdir().expect("tempdir");
        let pages = root.path().join("scan");
        std::fs::create_dir_all(&pages).expect("mkdir");
        write_pages(&pages, 1);

        let svc = services(root.path());
        let (document, _) = svc.import(&pages).expect("import");
        let id = document.id.to_string();
        assert_eq!(svc.resolve_document(&id[..8]).expect("prefix").id, document.id);
        assert_eq!(svc.resolve_document(&id).expect("full").id, document.id);
        assert!(matches!(
            svc.resolve_document("zzzz"),
            Err(ExamcutError::NotFound { .. })
        ));
    }

    #[test]
    fn correction_recrops_and_feeds_learning() {
        let root = tempfile::tempdir().expect("tempdir");
        let pages = root.path().join("scan");
        std::fs::create_dir_all(&pages).expect("mkdir");
        write_pages(&pages, 1);

        let svc = services(root.path());
        let (document, _) = svc.import(&pages).expect("import");
        let repo = svc.repository();
        let questions: Vec<Question> = (1..=3).map(|n| question(&document, n)).collect();
        repo.insert_questions(&questions).expect("insert");

        let renderer = ImageDirRenderer::new(200);
        for q in &questions {
            let key = q.id.to_string();
            let found = svc.resolve_question(&key[..13]).expect("resolve");
            let updated = svc
                .correct(&found, [20, 10, 180, 120], Some(&renderer))
                .expect("correct");
            assert_eq!(updated.bounding_box.top, 10);
            let crop = updated.crop_image_path.expect("crop");
            assert!(crop.exists());
        }

        let stored = repo.get_question(&questions[0].id).expect("get").expect("found");
        assert_eq!(stored.bounding_box.top, 10);
        assert!(stored.crop_image_path.is_some());

        let params = svc.learn(Some(&document.id)).expect("learn");
        assert_eq!(params.sample_count, 3);
        assert!((params.top_padding_bias - 10.0).abs() < 1e-9);

        let metrics = svc.metrics(Some(&document.id)).expect("metrics");
        assert_eq!(metrics.total_questions, 3);
        assert_eq!(metrics.corrected_questions, 3);
    }

    #[test]
    fn delete_removes_crops() {
        let root = tempfile::tempdir().expect("tempdir");
        let pages = root.path().join("scan");
        std::fs::create_dir_all(&pages).expect("mkdir");
        write_pages(&pages, 1);

        let svc = services(root.path());
        let (document, _) = svc.import(&pages).expect("import");
        let q = question(&document, 1);
        svc.repository().upsert_question(&q).expect("insert");
        svc.correct(&q, [10, 10, 150, 150], Some(&ImageDirRenderer::new(200)))
            .expect("correct");
        let crops = svc.crop_dir().expect("crops").join(document.id.to_string());
        assert!(crops.exists());

        svc.delete_document(&document).expect("delete");
        assert!(!crops.exists());
        assert!(svc.documents().expect("list").is_empty());
    }

    #[test]
    fn saved_settings_survive_reopen() {
        let root = tempfile::tempdir().expect("tempdir");
        let svc = services(root.path());
        let config = DetectionConfig {
            export_quality: 70,
            ..Default::default()
        };
        svc.save_config(&config).expect("save");
        assert_eq!(services(root.path()).config().export_quality, 70);

        let invalid = DetectionConfig {
            render_dpi: 1,
            ..Default::default()
        };
        assert!(svc.save_config(&invalid).is_err());
        assert_eq!(svc.config().export_quality, 70);
    }
}
