// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Examcut — Core types, geometry and error definitions shared across all crates.

pub mod config;
pub mod error;
pub mod geometry;
pub mod human_errors;
pub mod pattern;
pub mod traits;
pub mod types;

pub use config::{DetectionConfig, OcrEngineKind, RemoteProvider};
pub use error::{ExamcutError, Result};
pub use geometry::{BoundingBox, PixelRect};
pub use pattern::{PatternSet, QuestionPattern};
pub use traits::{CredentialProvider, PageRenderer, QuestionRepository};
pub use types::*;
