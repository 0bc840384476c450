// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Question detection — boundaries from pattern matches, answer options and
// content flags.

pub mod classify;
pub mod detector;
pub mod options;

pub use classify::content_flags;
pub use detector::QuestionDetector;
pub use options::{ExtractedOptions, OptionExtractor};
