// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages for progress status lines and CLI output.

use crate::error::ExamcutError;

/// How the user should react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Nothing to do; the run skipped an item and carried on.
    Skipped,
    /// The user must change settings or provide something before retrying.
    ActionRequired,
    /// Cannot be fixed by retrying.
    Permanent,
}

/// A plain-language error with an actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    pub message: String,
    pub suggestion: String,
    pub severity: Severity,
}

impl HumanError {
    fn new(message: impl Into<String>, suggestion: impl Into<String>, severity: Severity) -> Self {
        Self {
            message: message.into(),
            suggestion: suggestion.into(),
            severity,
        }
    }
}

impl std::fmt::Display for HumanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.message, self.suggestion)
    }
}

/// Convert an `ExamcutError` into a message someone preparing a worksheet
/// can act on.
pub fn humanize_error(err: &ExamcutError) -> HumanError {
    match err {
        ExamcutError::Config(detail) => HumanError::new(
            "The extraction settings are not valid.",
            format!("Fix the setting and start again. ({detail})"),
            Severity::ActionRequired,
        ),

        ExamcutError::MissingCredential { provider, env_var } => HumanError::new(
            format!("The {provider} recognition service needs an API key."),
            format!("Set {env_var} or choose a local recognition engine."),
            Severity::ActionRequired,
        ),

        ExamcutError::Render { page, .. } => HumanError::new(
            format!("Page {} could not be read.", page + 1),
            "The page was skipped. Re-scan it if its questions are needed.",
            Severity::Skipped,
        ),

        ExamcutError::Recognition(_) => HumanError::new(
            "No text could be recognized on part of a page.",
            "That part was skipped. A higher scan resolution often helps.",
            Severity::Skipped,
        ),

        ExamcutError::DegenerateRegion { .. } | ExamcutError::InvalidBox(_) => HumanError::new(
            "A question's frame fell outside the page.",
            "Adjust the frame by hand and crop it again.",
            Severity::Skipped,
        ),

        ExamcutError::UnsupportedDocument(detail) => HumanError::new(
            "This type of file isn't supported.",
            format!("Use a PDF or a folder of page images. (File type: {detail})"),
            Severity::Permanent,
        ),

        ExamcutError::PdfError(_) => HumanError::new(
            "This PDF could not be opened.",
            "The file may be damaged or password-protected. Try exporting it again.",
            Severity::Permanent,
        ),

        ExamcutError::ImageError(_) => HumanError::new(
            "An image could not be processed.",
            "The page may be damaged. Try scanning it again.",
            Severity::Skipped,
        ),

        ExamcutError::Export(detail) | ExamcutError::Archive(detail) => HumanError::new(
            "Some question images could not be saved.",
            format!("Check there is free space in the export folder. ({detail})"),
            Severity::ActionRequired,
        ),

        ExamcutError::Database(_) => HumanError::new(
            "The question library could not be updated.",
            "Close other copies of the program and try again.",
            Severity::ActionRequired,
        ),

        ExamcutError::NotFound { entity, id } => HumanError::new(
            format!("No {entity} with id {id}."),
            "Check the id with the `list` command.",
            Severity::Permanent,
        ),

        ExamcutError::Io(io_err) => match io_err.kind() {
            std::io::ErrorKind::NotFound => HumanError::new(
                "A file or folder could not be found.",
                "Check the path and try again.",
                Severity::ActionRequired,
            ),
            std::io::ErrorKind::PermissionDenied => HumanError::new(
                "Permission was denied.",
                "Choose a folder you are allowed to write to.",
                Severity::ActionRequired,
            ),
            _ => HumanError::new(
                "Reading or writing a file failed.",
                format!("Try again. (Detail: {io_err})"),
                Severity::ActionRequired,
            ),
        },

        ExamcutError::Serialization(_) => HumanError::new(
            "Stored data could not be read.",
            "The settings or library file may be damaged.",
            Severity::Permanent,
        ),
    }
}
