// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// examcut-store — Persistence for Examcut.
//
// Provides the SQLite-backed `QuestionRepository` and SHA-256 content
// fingerprinting for imported documents.

pub mod integrity;
pub mod sqlite;

pub use integrity::{hash_bytes, hash_file, hash_files};
pub use sqlite::SqliteRepository;
