//! Persisted state of a resumable copy job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// A long copy job that can be resumed after interruption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumableJob {
    /// Tag naming what kind of job this is, e.g. `batch_export`.
    pub operation_type: String,
    /// Every source file the job intends to copy.
    pub source_files: Vec<PathBuf>,
    /// Folder receiving the copies.
    pub output_folder: PathBuf,
    /// Sources that have already been copied.
    #[serde(default)]
    pub copied_files: BTreeSet<PathBuf>,
    /// When the job started.
    pub started_at: DateTime<Utc>,
    /// Whether the job finished.
    #[serde(default)]
    pub completed: bool,
}

impl ResumableJob {
    /// Creates a job that has copied nothing yet.
    #[must_use]
    pub fn new(
        operation_type: impl Into<String>,
        source_files: Vec<PathBuf>,
        output_folder: impl Into<PathBuf>,
    ) -> Self {
        Self {
            operation_type: operation_type.into(),
            source_files,
            output_folder: output_folder.into(),
            copied_files: BTreeSet::new(),
            started_at: Utc::now(),
            completed: false,
        }
    }

    /// Returns true if `source` was already copied.
    #[must_use]
    pub fn is_copied(&self, source: &Path) -> bool {
        self.copied_files.contains(source)
    }

    /// Sources not yet copied that still exist on disk, in original order.
    #[must_use]
    pub fn remaining(&self) -> Vec<PathBuf> {
        self.source_files
            .iter()
            .filter(|source| !self.is_copied(source))
            .filter(|source| source.exists())
            .cloned()
            .collect()
    }

    /// Returns `(copied, total)`.
    #[must_use]
    pub fn progress(&self) -> (usize, usize) {
        (self.copied_files.len(), self.source_files.len())
    }
}
