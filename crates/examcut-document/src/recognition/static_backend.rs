// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Backend that replays prepared lines. Used for dry runs and tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use examcut_core::error::{ExamcutError, Result};
use image::DynamicImage;

use super::backend::{RawLine, RecognitionBackend};

enum Script {
    /// Every call returns the same lines.
    Fixed(Vec<RawLine>),
    /// Each call pops the next response; empty once exhausted.
    Sequence(Mutex<VecDeque<Vec<RawLine>>>),
}

/// Replays prepared recognition output.
pub struct StaticBackend {
    name: String,
    script: Script,
}

impl StaticBackend {
    /// Return `lines` for every region.
    pub fn fixed(lines: Vec<RawLine>) -> Self {
        Self {
            name: "static".into(),
            script: Script::Fixed(lines),
        }
    }

    /// Return one prepared response per call, in order.
    pub fn sequence(responses: Vec<Vec<RawLine>>) -> Self {
        Self {
            name: "static".into(),
            script: Script::Sequence(Mutex::new(responses.into())),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Responses not yet consumed (always 0 for fixed backends).
    pub fn remaining(&self) -> usize {
        match &self.script {
            Script::Fixed(_) => 0,
            Script::Sequence(queue) => queue.lock().map(|q| q.len()).unwrap_or(0),
        }
    }
}

#[async_trait]
impl RecognitionBackend for StaticBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn recognize(&self, _region: &DynamicImage, _column_index: u32) -> Result<Vec<RawLine>> {
        match &self.script {
            Script::Fixed(lines) => Ok(lines.clone()),
            Script::Sequence(queue) => {
                let mut queue = queue
                    .lock()
                    .map_err(|_| ExamcutError::Recognition("static script poisoned".into()))?;
                Ok(queue.pop_front().unwrap_or_default())
            }
        }
    }
}
