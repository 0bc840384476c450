// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Terminal progress for extraction runs.

use examcut_pipeline::{Phase, ProgressEvent};
use indicatif::{ProgressBar, ProgressStyle};

/// Page bar fed from orchestrator events.
pub struct PageProgress {
    bar: ProgressBar,
}

impl PageProgress {
    pub fn new(total_pages: u32) -> Self {
        let bar = ProgressBar::new(u64::from(total_pages));
        // The template is a constant; a bad one falls back to the default style.
        if let Ok(style) = ProgressStyle::with_template(
            "{prefix:<8} {bar:40.cyan/blue} {pos}/{len} pages [{elapsed_precise}] {msg}",
        ) {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.set_prefix("extract");
        Self { bar }
    }

    pub fn update(&self, event: &ProgressEvent) {
        match event.phase {
            Phase::Complete => {
                self.bar.set_position(u64::from(event.total_pages));
                self.bar.finish_with_message(event.message.clone());
            }
            Phase::Error => self.bar.abandon_with_message(event.message.clone()),
            phase => {
                self.bar
                    .set_position(u64::from(event.current_page.saturating_sub(1)));
                self.bar.set_message(format!(
                    "page {} {phase} · {} questions",
                    event.current_page, event.questions_found
                ));
            }
        }
    }

    /// Stop drawing without a final event (cancellation).
    pub fn abandon(&self, message: impl Into<String>) {
        self.bar.abandon_with_message(message.into());
    }
}
