// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Content fingerprinting — SHA-256 digests of imported sources.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use examcut_core::error::Result;
use sha2::{Digest, Sha256};

const CHUNK: usize = 64 * 1024;

/// SHA-256 of `data` as a lowercase hex string.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// SHA-256 of a file's contents, read in chunks.
pub fn hash_file(path: impl AsRef<Path>) -> Result<String> {
    hash_files(std::iter::once(path))
}

/// One digest over several files, concatenated in the given order.
///
/// Used for documents that arrive as a directory of page images.
pub fn hash_files<P: AsRef<Path>>(paths: impl IntoIterator<Item = P>) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK];
    for path in paths {
        let mut file = File::open(path.as_ref())?;
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
    }
    Ok(hex::encode(hasher.finalize()))
}
