// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Examcut.

use thiserror::Error;

/// Top-level error type for all Examcut operations.
#[derive(Debug, Error)]
pub enum ExamcutError {
    // -- Configuration errors (fatal, raised before any page is processed) --
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("missing credential for {provider}; set {env_var}")]
    MissingCredential { provider: String, env_var: String },

    // -- Per-page errors (logged, page or question skipped) --
    #[error("page {page} could not be rendered: {reason}")]
    Render { page: u32, reason: String },

    #[error("text recognition failed: {0}")]
    Recognition(String),

    #[error("crop region is degenerate after clamping: {width}x{height}")]
    DegenerateRegion { width: i64, height: i64 },

    #[error("invalid bounding box: {0}")]
    InvalidBox(String),

    // -- Document errors --
    #[error("unsupported document type: {0}")]
    UnsupportedDocument(String),

    #[error("PDF operation failed: {0}")]
    PdfError(String),

    #[error("image processing failed: {0}")]
    ImageError(String),

    // -- Export errors (reported per item) --
    #[error("export failed: {0}")]
    Export(String),

    #[error("archive error: {0}")]
    Archive(String),

    // -- Storage / persistence --
    #[error("database error: {0}")]
    Database(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ExamcutError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// How the pipeline reacts to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad settings or missing credentials. Stops the run before it starts.
    Configuration,
    /// Affects one page or one question. Logged and skipped.
    PerPage,
    /// Affects one exported item. Reported, remaining items continue.
    Export,
    /// Persistence or environment failure the run cannot continue past.
    Fatal,
}

/// Classify an `ExamcutError` for the orchestrator's skip-or-abort decision.
pub fn classify_error(err: &ExamcutError) -> ErrorClass {
    match err {
        ExamcutError::Config(_) | ExamcutError::MissingCredential { .. } => {
            ErrorClass::Configuration
        }

        ExamcutError::Render { .. }
        | ExamcutError::Recognition(_)
        | ExamcutError::DegenerateRegion { .. }
        | ExamcutError::InvalidBox(_)
        | ExamcutError::ImageError(_) => ErrorClass::PerPage,

        ExamcutError::Export(_) | ExamcutError::Archive(_) => ErrorClass::Export,

        ExamcutError::UnsupportedDocument(_)
        | ExamcutError::PdfError(_)
        | ExamcutError::Database(_)
        | ExamcutError::NotFound { .. }
        | ExamcutError::Io(_)
        | ExamcutError::Serialization(_) => ErrorClass::Fatal,
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ExamcutError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credential_is_configuration() {
        let err = ExamcutError::MissingCredential {
            provider: "openai".into(),
            env_var: "OPENAI_API_KEY".into(),
        };
        assert_eq!(classify_error(&err), ErrorClass::Configuration);
    }

    #[test]
    fn render_failure_is_per_page() {
        let err = ExamcutError::Render {
            page: 3,
            reason: "corrupt stream".into(),
        };
        assert_eq!(classify_error(&err), ErrorClass::PerPage);
    }

    #[test]
    fn database_failure_is_fatal() {
        let err = ExamcutError::Database("disk full".into());
        assert_eq!(classify_error(&err), ErrorClass::Fatal);
    }

    #[test]
    fn not_found_message_names_entity() {
        let err = ExamcutError::not_found("question", "abc");
        assert_eq!(err.to_string(), "question abc not found");
    }
}
