//! Scan metadata for one market's log directory.
//!
//! Walking years of day files just to learn the cached range is wasteful, so
//! the facade keeps a small `repository.json` next to the logs recording the
//! first and last locally cached day and when the directory was last walked.

use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::LogError;

pub const META_FILE: &str = "repository.json";

/// Persistent summary of what the log directory holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryMeta {
    /// Earliest locally cached day.
    pub first_cached: Option<NaiveDate>,
    /// Latest locally cached day.
    pub last_cached: Option<NaiveDate>,
    /// Day the directory tree was last walked.
    pub last_scan: Option<NaiveDate>,
}

impl RepositoryMeta {
    /// Load from disk; a missing or unreadable file yields the empty default
    /// and triggers a rescan.
    pub fn load(path: &Path) -> RepositoryMeta {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default()
    }

    pub fn store(&self, path: &Path) -> Result<(), LogError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LogError::io(path, e))?;
        }
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| LogError::io(path, std::io::Error::other(e)))?;
        std::fs::write(path, text).map_err(|e| LogError::io(path, e))
    }

    /// Widen the cached range to include `date`. Returns whether anything
    /// changed.
    pub fn update_local(&mut self, date: NaiveDate) -> bool {
        let mut changed = false;
        if self.first_cached.map_or(true, |first| date < first) {
            self.first_cached = Some(date);
            changed = true;
        }
        if self.last_cached.map_or(true, |last| date > last) {
            self.last_cached = Some(date);
            changed = true;
        }
        changed
    }

    /// Whether the last directory walk happened on `today`.
    pub fn is_fresh(&self, today: NaiveDate) -> bool {
        self.last_scan == Some(today)
    }
}
