// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// examcut-pipeline — Extraction runs for Examcut.
//
// Imports source documents, sequences render → layout → recognition →
// detection → crop → save per page with progress events and cancellation,
// learns edge biases from user corrections, and computes accuracy metrics.

pub mod import;
pub mod learning;
pub mod metrics;
pub mod orchestrator;
pub mod progress;
pub mod render;

pub use import::DocumentImporter;
pub use learning::AdaptiveLearner;
pub use metrics::accuracy_metrics;
pub use orchestrator::{Orchestrator, Outcome, RunHandle};
pub use progress::{CancelToken, Phase, ProgressEvent};
pub use render::ImageDirRenderer;
