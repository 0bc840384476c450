// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanning pipeline — ink masks and recognition preparation.

pub mod enhance;

pub use enhance::{InkMask, ScanEnhancer, otsu_threshold};
