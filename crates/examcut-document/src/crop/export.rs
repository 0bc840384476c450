// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Batch export — copies question crops out under stable names, optionally
// grouped per page and bundled into a ZIP archive.

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use examcut_core::error::{ExamcutError, Result};
use examcut_core::types::{Question, QuestionId};
use tracing::{info, instrument, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::engine::CropEngine;

/// How a batch export lays out its files.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// File name prefix, e.g. `soru` gives `soru_001_s1.jpg`.
    pub prefix: String,
    /// Place each file under `page_{n}/`.
    pub per_page_dirs: bool,
    /// Also write `{prefix}.zip` holding every exported file.
    pub zip: bool,
    /// JPEG quality of the re-encoded files.
    pub quality: u8,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            prefix: "soru".into(),
            per_page_dirs: false,
            zip: false,
            quality: 90,
        }
    }
}

/// Outcome of one question's export.
#[derive(Debug)]
pub struct ExportItem {
    pub question_id: QuestionId,
    pub file_name: String,
    pub result: Result<PathBuf>,
}

/// Outcome of a batch export. One failing item never aborts the batch.
#[derive(Debug, Default)]
pub struct ExportReport {
    pub items: Vec<ExportItem>,
    pub archive: Option<Result<PathBuf>>,
}

impl ExportReport {
    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|i| i.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.items.len() - self.succeeded()
    }
}

/// `{prefix}_{number:03}_s{page}.jpg` with a one-based page number.
pub fn export_file_name(prefix: &str, question: &Question) -> String {
    format!(
        "{prefix}_{:03}_s{}.jpg",
        question.question_number,
        question.page_number + 1
    )
}

/// Export every question's crop into `destination`.
#[instrument(skip_all, fields(count = questions.len(), destination = %destination.display()))]
pub fn export_questions(
    questions: &[Question],
    destination: &Path,
    options: &ExportOptions,
) -> ExportReport {
    let mut report = ExportReport::default();
    let mut seen: HashMap<String, usize> = HashMap::new();

    for question in questions {
        let file_name = unique_name(&mut seen, export_file_name(&options.prefix, question));
        let target = if options.per_page_dirs {
            destination
                .join(format!("page_{}", question.page_number + 1))
                .join(&file_name)
        } else {
            destination.join(&file_name)
        };

        let result = CropEngine::export_to_file(question, &target, options.quality);
        if let Err(ref err) = result {
            warn!(question = %question.id, %err, "Export failed");
        }
        report.items.push(ExportItem {
            question_id: question.id,
            file_name,
            result,
        });
    }

    if options.zip {
        let entries: Vec<(String, PathBuf)> = report
            .items
            .iter()
            .filter_map(|item| match &item.result {
                Ok(path) => Some((item.file_name.clone(), path.clone())),
                Err(_) => None,
            })
            .collect();
        let archive_path = destination.join(format!("{}.zip", options.prefix));
        let archive = write_archive(&archive_path, &entries);
        if let Err(ref err) = archive {
            warn!(%err, "Archive failed");
        }
        report.archive = Some(archive);
    }

    info!(
        succeeded = report.succeeded(),
        failed = report.failed(),
        "Export finished"
    );
    report
}

/// Second and later uses of a name get `_2`, `_3`, ... before the extension.
fn unique_name(seen: &mut HashMap<String, usize>, name: String) -> String {
    let count = seen.entry(name.clone()).or_insert(0);
    *count += 1;
    if *count == 1 {
        return name;
    }
    let stem = name.strip_suffix(".jpg").unwrap_or(&name);
    format!("{stem}_{count}.jpg")
}

fn write_archive(path: &Path, entries: &[(String, PathBuf)]) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    let mut zip = ZipWriter::new(file);

    for (name, source) in entries {
        let bytes = std::fs::read(source)?;
        // JPEG data does not shrink under deflate.
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        zip.start_file(name.as_str(), options)
            .map_err(|e| ExamcutError::Archive(format!("{name}: {e}")))?;
        zip.write_all(&bytes)?;
    }

    zip.finish()
        .map_err(|e| ExamcutError::Archive(format!("finalize {}: {e}", path.display())))?;
    Ok(path.to_path_buf())
}
