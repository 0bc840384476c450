// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Command handlers. Each prints its result to stdout; logs go to stderr.

use std::path::Path;
use std::sync::Arc;

use examcut_core::error::{ExamcutError, Result};
use examcut_core::traits::PageRenderer;
use examcut_core::types::{Document, Question};
use examcut_document::crop::ExportOptions;
use examcut_pipeline::{ImageDirRenderer, Outcome};
use tracing::{info, warn};

use crate::cli::{Command, CorrectArgs, ExportArgs, ExtractArgs, PageSource};
use crate::progress::PageProgress;
use crate::services::app_services::AppServices;

pub async fn dispatch(svc: &AppServices, command: Command) -> Result<()> {
    match command {
        Command::Import { path } => import(svc, &path),
        Command::Extract(args) => extract(svc, args).await,
        Command::List { document } => list(svc, document.as_deref()),
        Command::Verify { question, undo } => verify(svc, &question, !undo),
        Command::Correct(args) => correct(svc, args),
        Command::Learn { document, save } => learn(svc, document.as_deref(), save),
        Command::Metrics { document, json } => metrics(svc, document.as_deref(), json),
        Command::Export(args) => export(svc, args),
        Command::Delete { document } => delete(svc, &document),
    }
}

// -- Documents ---------------------------------------------------------------

fn import(svc: &AppServices, path: &Path) -> Result<()> {
    let (document, new) = svc.import(path)?;
    if new {
        println!(
            "Imported {} ({} pages{})",
            document.id,
            document.page_count,
            if document.hints.is_scanned { ", scanned" } else { "" }
        );
    } else {
        println!("Already imported as {}", document.id);
    }
    Ok(())
}

/// A path on disk is imported (or matched by content); anything else is
/// taken as a document id.
fn locate_document(svc: &AppServices, source: &str) -> Result<Document> {
    let path = Path::new(source);
    if path.exists() {
        let (document, _) = svc.import(path)?;
        Ok(document)
    } else {
        svc.resolve_document(source)
    }
}

/// Page images come from `--pages`, or from the document itself when it was
/// imported from an image directory.
fn page_renderer(document: &Document, pages: &PageSource) -> Option<Arc<dyn PageRenderer>> {
    let renderer = ImageDirRenderer::new(pages.source_dpi);
    match &pages.pages {
        Some(dir) => Some(Arc::new(renderer.with_pages_dir(dir))),
        None if document.source_path.is_dir() => Some(Arc::new(renderer)),
        None => None,
    }
}

fn list(svc: &AppServices, document: Option<&str>) -> Result<()> {
    let repository = svc.repository();
    let Some(key) = document else {
        let documents = svc.documents()?;
        if documents.is_empty() {
            println!("No documents imported yet.");
        }
        for d in documents {
            let questions = repository.count_questions(Some(&d.id))?;
            let publisher = d
                .hints
                .publisher_format
                .map(|p| format!("{p:?}"))
                .unwrap_or_else(|| "-".into());
            let subject = d
                .hints
                .subject
                .map(|s| format!("{s:?}"))
                .unwrap_or_else(|| "-".into());
            println!(
                "{}  {:>3} pages  {:>4} questions  {:<8} {:<12} {}",
                d.id,
                d.page_count,
                questions,
                publisher,
                subject,
                d.source_path.display()
            );
        }
        return Ok(());
    };

    let document = svc.resolve_document(key)?;
    let questions = svc.questions(&document.id)?;
    println!(
        "{}: {} questions on {} pages",
        document.source_path.display(),
        questions.len(),
        document.page_count
    );
    let min_confidence = svc.config().min_question_confidence;
    for q in &questions {
        print_question(q, min_confidence);
    }
    Ok(())
}

fn print_question(q: &Question, min_confidence: f32) {
    let mut marks = Vec::new();
    if q.verified {
        marks.push("verified");
    } else if q.needs_review(min_confidence) {
        marks.push("review");
    }
    if !q.has_complete_options() {
        marks.push("options?");
    }
    if q.crop_image_path.is_none() {
        marks.push("no crop");
    }
    if q.flags.has_image {
        marks.push("image");
    }
    if q.flags.has_table {
        marks.push("table");
    }
    if q.flags.is_math_formula {
        marks.push("math");
    }
    println!(
        "{:>4}  p{:<3} c{}  {:.2}  {}  {}",
        q.question_number,
        q.page_number + 1,
        q.column_index,
        q.confidence,
        q.id,
        marks.join(", ")
    );
}

fn delete(svc: &AppServices, key: &str) -> Result<()> {
    let document = svc.resolve_document(key)?;
    svc.delete_document(&document)?;
    println!("Deleted {}", document.id);
    Ok(())
}

// -- Extraction --------------------------------------------------------------

async fn extract(svc: &AppServices, args: ExtractArgs) -> Result<()> {
    let document = locate_document(svc, &args.source)?;
    let config = args.apply_to(svc.config());
    config.validate()?;
    if args.save_config {
        svc.save_config(&config)?;
    }

    let renderer = page_renderer(&document, &args.pages).ok_or_else(|| {
        ExamcutError::Config(format!(
            "{} has no page images; render its pages and pass --pages DIR",
            document.source_path.display()
        ))
    })?;
    let engine = svc.recognition_engine(&config, args.models.as_deref())?;
    let orchestrator = svc.orchestrator(renderer, engine)?;

    info!(document = %document.id, pages = document.page_count, "Starting extraction");
    let progress = PageProgress::new(document.page_count);
    let mut handle = orchestrator.start(document, config);
    let mut interrupted = false;
    loop {
        tokio::select! {
            event = handle.events.recv() => match event {
                Some(event) => progress.update(&event),
                None => break,
            },
            signal = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                match signal {
                    Ok(()) => handle.cancel.cancel(),
                    Err(e) => warn!(error = %e, "Cannot listen for interrupts"),
                }
            }
        }
    }

    let outcome = handle
        .join
        .await
        .map_err(|e| ExamcutError::Io(std::io::Error::other(format!("extraction task: {e}"))))?;
    match outcome {
        Outcome::Completed {
            questions_found,
            failed_pages,
        } => {
            println!("Found {questions_found} questions.");
            if !failed_pages.is_empty() {
                let pages: Vec<String> = failed_pages.iter().map(|p| (p + 1).to_string()).collect();
                println!("Skipped pages: {}", pages.join(", "));
            }
            Ok(())
        }
        Outcome::Cancelled { questions_saved } => {
            progress.abandon("cancelled");
            println!("Cancelled; {questions_saved} questions from finished pages were kept.");
            Ok(())
        }
        Outcome::Failed { error } => Err(error),
    }
}

// -- Review ------------------------------------------------------------------

fn verify(svc: &AppServices, key: &str, verified: bool) -> Result<()> {
    let question = svc.resolve_question(key)?;
    svc.set_verified(&question.id, verified)?;
    println!(
        "Question {} (page {}) {}",
        question.question_number,
        question.page_number + 1,
        if verified { "verified" } else { "unverified" }
    );
    Ok(())
}

fn correct(svc: &AppServices, args: CorrectArgs) -> Result<()> {
    let question = svc.resolve_question(&args.question)?;
    let document = svc.resolve_document(&question.document_id.to_string())?;
    let renderer = page_renderer(&document, &args.pages);
    if renderer.is_none() {
        warn!("No page images available; boundary stored without a new crop");
    }
    let updated = svc.correct(&question, args.bounds, renderer.as_deref())?;
    println!("Boundary of question {} set to {}", updated.question_number, updated.bounding_box);
    if let Some(path) = &updated.crop_image_path {
        println!("Crop: {}", path.display());
    }
    Ok(())
}

fn learn(svc: &AppServices, key: Option<&str>, save: bool) -> Result<()> {
    let document = key.map(|k| svc.resolve_document(k)).transpose()?;
    let params = svc.learn(document.as_ref().map(|d| &d.id))?;
    if params.is_neutral() {
        println!(
            "Not enough consistent corrections yet ({} usable).",
            params.sample_count
        );
        return Ok(());
    }
    println!("Learned from {} corrections:", params.sample_count);
    println!("  top    {:+.1}px", params.top_padding_bias);
    println!("  bottom {:+.1}px", params.bottom_padding_bias);
    println!("  left   {:+.1}px", params.left_padding_bias);
    println!("  right  {:+.1}px", params.right_padding_bias);

    if save {
        let mut config = svc.config().apply_learning(&params);
        config.adaptive_learning = false;
        svc.save_config(&config)?;
        println!("Saved as fixed padding; per-run learning is now off.");
    }
    Ok(())
}

fn metrics(svc: &AppServices, key: Option<&str>, json: bool) -> Result<()> {
    let document = key.map(|k| svc.resolve_document(k)).transpose()?;
    let m = svc.metrics(document.as_ref().map(|d| &d.id))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&m)?);
        return Ok(());
    }
    println!("Questions  {}", m.total_questions);
    println!("Verified   {}", m.verified_questions);
    println!("Corrected  {}", m.corrected_questions);
    println!("Mean IoU   {:.3}", m.average_iou);
    println!("Precision  {:.3}", m.precision);
    println!("Recall     {:.3}", m.recall);
    println!("F1         {:.3}", m.f1());
    Ok(())
}

// -- Export ------------------------------------------------------------------

fn export(svc: &AppServices, args: ExportArgs) -> Result<()> {
    let document = svc.resolve_document(&args.document)?;
    let options = ExportOptions {
        prefix: args.prefix,
        per_page_dirs: args.per_page,
        zip: args.zip,
        quality: args.quality.unwrap_or(svc.config().export_quality),
    };
    let report = svc.export(&document, &args.destination, &options, args.verified_only)?;

    for item in &report.items {
        if let Err(err) = &item.result {
            println!("  failed {}: {err}", item.file_name);
        }
    }
    println!(
        "Exported {} of {} questions to {}",
        report.succeeded(),
        report.items.len(),
        args.destination.display()
    );
    match &report.archive {
        Some(Ok(path)) => println!("Archive: {}", path.display()),
        Some(Err(err)) => println!("Archive failed: {err}"),
        None => {}
    }
    Ok(())
}
