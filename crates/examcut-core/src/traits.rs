// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Collaborator interfaces. The extraction core owns no rasterizer, database
// or secret store; hosts hand in implementations of these traits.

use image::DynamicImage;

use crate::config::RemoteProvider;
use crate::error::Result;
use crate::geometry::BoundingBox;
use crate::types::{
    Document, DocumentHints, DocumentId, Question, QuestionId, UserCorrection,
};

/// Rasterizes document pages.
pub trait PageRenderer: Send + Sync {
    /// Render `page_number` (0-indexed) of `document` at `dpi`.
    fn render(&self, document: &Document, page_number: u32, dpi: u32) -> Result<DynamicImage>;
}

/// Persistent store for documents, questions and corrections.
///
/// Implementations must serialize writes for a given document id.
pub trait QuestionRepository: Send + Sync {
    // -- Documents --

    /// Insert or replace by id.
    fn upsert_document(&self, document: &Document) -> Result<()>;

    fn get_document(&self, id: &DocumentId) -> Result<Option<Document>>;

    fn list_documents(&self) -> Result<Vec<Document>>;

    fn update_document_hints(&self, id: &DocumentId, hints: &DocumentHints) -> Result<()>;

    /// Delete a document together with its questions and corrections.
    fn delete_document(&self, id: &DocumentId) -> Result<()>;

    // -- Questions --

    /// Insert or replace by id.
    fn upsert_question(&self, question: &Question) -> Result<()>;

    /// Insert a batch atomically.
    fn insert_questions(&self, questions: &[Question]) -> Result<()>;

    fn get_question(&self, id: &QuestionId) -> Result<Option<Question>>;

    /// Visit a document's questions ordered by `(page_number, question_number)`.
    fn for_each_question(
        &self,
        document_id: &DocumentId,
        visit: &mut dyn FnMut(Question) -> Result<()>,
    ) -> Result<()>;

    /// Collect a document's questions in storage order.
    fn questions_for_document(&self, document_id: &DocumentId) -> Result<Vec<Question>> {
        let mut out = Vec::new();
        self.for_each_question(document_id, &mut |q| {
            out.push(q);
            Ok(())
        })?;
        Ok(out)
    }

    fn set_verified(&self, id: &QuestionId, verified: bool) -> Result<()>;

    fn set_crop_path(&self, id: &QuestionId, path: Option<&std::path::Path>) -> Result<()>;

    // -- Corrections --

    /// Append `correction` and move the question's box to the corrected one,
    /// as one atomic step.
    fn record_correction(&self, correction: &UserCorrection) -> Result<()>;

    fn corrections_for_document(&self, document_id: &DocumentId) -> Result<Vec<UserCorrection>>;

    fn all_corrections(&self) -> Result<Vec<UserCorrection>>;

    // -- Counts (all documents when `document_id` is `None`) --

    fn count_questions(&self, document_id: Option<&DocumentId>) -> Result<u64>;

    fn count_verified(&self, document_id: Option<&DocumentId>) -> Result<u64>;

    /// Distinct questions with at least one correction.
    fn count_corrected(&self, document_id: Option<&DocumentId>) -> Result<u64>;
}

/// Resolves credentials for remote recognition providers.
pub trait CredentialProvider: Send + Sync {
    /// Secret for `provider`, or `None` if not configured.
    fn credential(&self, provider: RemoteProvider) -> Option<String>;
}

/// Reads credentials from environment variables.
#[derive(Debug, Default, Clone)]
pub struct EnvCredentialProvider;

impl CredentialProvider for EnvCredentialProvider {
    fn credential(&self, provider: RemoteProvider) -> Option<String> {
        std::env::var(provider.credential_env_var())
            .ok()
            .filter(|v| !v.trim().is_empty())
    }
}

/// Fixed credentials, for hosts that resolve secrets themselves.
#[derive(Debug, Default, Clone)]
pub struct StaticCredentialProvider {
    entries: Vec<(RemoteProvider, String)>,
}

impl StaticCredentialProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: RemoteProvider, secret: impl Into<String>) -> Self {
        self.entries.push((provider, secret.into()));
        self
    }
}

impl CredentialProvider for StaticCredentialProvider {
    fn credential(&self, provider: RemoteProvider) -> Option<String> {
        self.entries
            .iter()
            .find(|(name, _)| *name == provider)
            .map(|(_, secret)| secret.clone())
    }
}

/// Convenience: build a correction record for `question` moved to `corrected`.
pub fn correction_for(question: &Question, corrected: BoundingBox) -> UserCorrection {
    UserCorrection {
        question_id: question.id,
        document_id: question.document_id,
        original_box: question.bounding_box,
        corrected_box: corrected,
        timestamp: chrono::Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_credentials_lookup() {
        let creds = StaticCredentialProvider::new().with(RemoteProvider::Gemini, "k-123");
        assert_eq!(creds.credential(RemoteProvider::Gemini).as_deref(), Some("k-123"));
        assert!(creds.credential(RemoteProvider::OpenAi).is_none());
    }
}
