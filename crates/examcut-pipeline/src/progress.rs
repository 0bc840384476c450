// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Progress events and run cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Where a run is in its per-page cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Rendering,
    AnalyzingLayout,
    RunningOcr,
    DetectingQuestions,
    Cropping,
    Saving,
    Complete,
    Error,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Complete | Phase::Error)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Phase::Rendering => "rendering",
            Phase::AnalyzingLayout => "analyzing layout",
            Phase::RunningOcr => "recognizing text",
            Phase::DetectingQuestions => "detecting questions",
            Phase::Cropping => "cropping",
            Phase::Saving => "saving",
            Phase::Complete => "complete",
            Phase::Error => "error",
        };
        f.write_str(label)
    }
}

/// One progress report. `current_page` is one-based; 0 before the first page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub current_page: u32,
    pub total_pages: u32,
    pub phase: Phase,
    /// Questions saved so far in this run.
    pub questions_found: u32,
    pub message: String,
}

pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;
pub type ProgressReceiver = mpsc::UnboundedReceiver<ProgressEvent>;

/// FIFO progress channel.
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Shared flag a host sets to stop a run at its next phase boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
