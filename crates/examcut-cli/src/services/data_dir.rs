// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Data directory resolution and detection-settings persistence.

use std::path::{Path, PathBuf};

use examcut_core::config::DetectionConfig;
use examcut_core::error::{ExamcutError, Result};
use tracing::{debug, warn};

/// Settings file inside the data directory.
pub const CONFIG_FILE: &str = "config.json";

/// Return the application data directory, creating it if needed.
///
/// `$XDG_DATA_HOME/examcut`, else `~/.local/share/examcut`.
pub fn data_dir() -> Result<PathBuf> {
    let dir = base_dir().join("examcut");
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Return a subdirectory inside `root` (e.g. "crops"), creating it if needed.
pub fn data_subdir(root: &Path, name: &str) -> Result<PathBuf> {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

fn base_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        if !xdg.is_empty() {
            return PathBuf::from(xdg);
        }
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    PathBuf::from("/tmp")
}

// -- Config file persistence -------------------------------------------------

/// Load settings from `path`. A missing file gives the defaults; an unreadable
/// or malformed one is an error so a typo never silently reverts settings.
pub fn load_config(path: &Path) -> Result<DetectionConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "No settings file; using defaults");
        return Ok(DetectionConfig::default());
    }
    let data = std::fs::read_to_string(path)?;
    serde_json::from_str(&data).map_err(|e| {
        warn!(path = %path.display(), error = %e, "Settings file is malformed");
        ExamcutError::Config(format!("{}: {e}", path.display()))
    })
}

pub fn persist_config(path: &Path, config: &DetectionConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(path, json)?;
    debug!(path = %path.display(), "Settings saved");
    Ok(())
}
