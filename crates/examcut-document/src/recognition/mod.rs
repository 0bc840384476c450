// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Text recognition — backend trait, engine with hybrid fallback, and the
// shipped backends (local `ocrs`, remote vision models, static replay).

pub mod backend;
pub mod engine;
pub mod remote;
pub mod static_backend;

#[cfg(feature = "ocr")]
pub mod ocrs_backend;

pub use backend::{RawLine, RecognitionBackend};
pub use engine::{LocalBackends, RecognitionEngine};
pub use remote::RemoteVisionBackend;
pub use static_backend::StaticBackend;

#[cfg(feature = "ocr")]
pub use ocrs_backend::{OcrModelPaths, OcrsBackend, OcrsMode};
