//! Batch export of query results.
//!
//! Each export lands in a fresh `batch_{timestamp}_{name}` folder next to a
//! `manifest.json` describing what was exported. Copy exports register a
//! resumable job so an interrupted export can be finished later.

use super::control::{FileOutcome, JobControl};
use super::router::{FileRouter, OutcomeStatus, resolve_bundle_collision, with_suffix};
use super::tracker::JobTracker;
use crate::models::{MovementKind, sanitize_folder_name};
use crate::storage::{read_json, write_json_atomic};
use crate::{Error, Result};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Manifest file written into every batch folder.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Longest batch name derived from a query.
const MAX_DERIVED_NAME: usize = 50;

/// Job type tag for resumable exports.
pub const EXPORT_JOB_TYPE: &str = "batch_export";

/// How files are placed in the batch folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportMode {
    /// Copy files and companions.
    #[default]
    Copy,
    /// Link to the originals, copying when linking fails.
    Symlink,
}

impl ExportMode {
    /// Returns the mode as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Copy => "copy",
            Self::Symlink => "symlink",
        }
    }

    /// Parses a mode from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "copy" => Some(Self::Copy),
            "symlink" | "link" => Some(Self::Symlink),
            _ => None,
        }
    }
}

impl fmt::Display for ExportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What to export and how.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportRequest {
    /// The query the files came from, recorded in the manifest.
    pub query: String,
    /// Batch name; derived from the query when absent.
    pub name: Option<String>,
    /// Copy or symlink.
    pub mode: ExportMode,
}

impl ExportRequest {
    /// Creates a copy-mode request for `query`.
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    /// Sets the batch name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the mode.
    #[must_use]
    pub const fn with_mode(mut self, mode: ExportMode) -> Self {
        self.mode = mode;
        self
    }
}

/// One exported file in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Where the file came from.
    pub original_path: PathBuf,
    /// Its file name.
    pub filename: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time of the original.
    pub modified: Option<DateTime<Utc>>,
}

/// Contents of `manifest.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchManifest {
    /// Batch folder name.
    pub batch_name: String,
    /// When the batch was created.
    pub created: DateTime<Utc>,
    /// The query the files came from.
    pub query: String,
    /// Number of files requested.
    pub total_images: usize,
    /// Files that existed at export time.
    pub images: Vec<ManifestEntry>,
}

/// A file that could not be exported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportFailure {
    /// The source file.
    pub file: PathBuf,
    /// What went wrong.
    pub error: String,
}

/// Result of an export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportReport {
    /// The batch folder.
    pub batch_path: PathBuf,
    /// The manifest file.
    pub manifest_path: PathBuf,
    /// Files requested.
    pub total: usize,
    /// Files placed in the batch.
    pub exported: usize,
    /// Files that no longer exist.
    pub skipped: usize,
    /// Links that fell back to a copy.
    pub link_fallbacks: usize,
    /// Files that failed.
    pub failures: Vec<ExportFailure>,
    /// Bytes of primary files exported.
    pub total_size: u64,
    /// Whether the export stopped on cancellation.
    pub cancelled: bool,
}

impl ExportReport {
    /// Returns the overall status.
    #[must_use]
    pub fn status(&self) -> OutcomeStatus {
        OutcomeStatus::from_counts(self.exported, self.failures.len())
    }
}

/// Summary of an existing batch, read back from its manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchStatistics {
    /// Batch folder name.
    pub batch_name: String,
    /// When the batch was created.
    pub created: DateTime<Utc>,
    /// The query.
    pub query: String,
    /// Files requested.
    pub total_images: usize,
    /// Files listed in the manifest.
    pub actual_files: usize,
    /// Their combined size.
    pub total_size: u64,
}

/// Exports file lists into timestamped batch folders.
#[derive(Debug, Clone)]
pub struct BatchExporter {
    output_dir: PathBuf,
    router: FileRouter,
}

impl BatchExporter {
    /// Creates an exporter writing under `output_dir`.
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>, router: FileRouter) -> Self {
        Self {
            output_dir: output_dir.into(),
            router,
        }
    }

    /// Directory batch folders are created in.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Exports `files` into a new batch folder.
    ///
    /// In copy mode a tracker, when given, records the job so it can be
    /// resumed if interrupted.
    #[instrument(skip_all, fields(files = files.len(), mode = %request.mode))]
    pub fn export(
        &self,
        files: &[PathBuf],
        request: &ExportRequest,
        control: &JobControl,
        mut tracker: Option<&mut JobTracker>,
    ) -> Result<ExportReport> {
        if files.is_empty() {
            return Err(Error::InvalidInput("no files to export".to_string()));
        }

        if request.mode == ExportMode::Copy {
            let total = files
                .iter()
                .filter(|f| f.is_file())
                .filter_map(|f| self.router.bundle_size(f).ok())
                .fold(0u64, u64::saturating_add);
            self.router.ensure_space(total, &self.output_dir)?;
        }

        let name = request
            .name
            .as_deref()
            .map_or_else(|| default_batch_name(&request.query), sanitize_folder_name);
        let batch_name = format!("batch_{}_{name}", Local::now().format("%Y%m%d_%H%M%S"));
        let batch_path = self.output_dir.join(&batch_name);
        fs::create_dir_all(&batch_path).map_err(|e| {
            Error::operation("create_batch_folder", format!("{}: {e}", batch_path.display()))
        })?;
        tracing::info!(batch = %batch_path.display(), "Created batch folder");

        if request.mode == ExportMode::Copy
            && let Some(tracker) = tracker.as_deref_mut()
        {
            let sources = files.iter().filter(|f| f.is_file()).cloned().collect();
            tracker.start(sources, &batch_path, EXPORT_JOB_TYPE)?;
        }

        let mut report = ExportReport {
            manifest_path: batch_path.join(MANIFEST_FILE),
            batch_path,
            total: files.len(),
            exported: 0,
            skipped: 0,
            link_fallbacks: 0,
            failures: Vec::new(),
            total_size: 0,
            cancelled: false,
        };
        control.add_total(files.len());

        for file in files {
            if !control.checkpoint() {
                report.cancelled = true;
                break;
            }
            if !file.is_file() {
                tracing::warn!(file = %file.display(), "Export source not found");
                report.skipped += 1;
                control.report(file, FileOutcome::Skipped);
                continue;
            }

            let placed = match request.mode {
                ExportMode::Copy => self
                    .router
                    .transfer_into(file, &report.batch_path, MovementKind::Copy)
                    .map(|_| ()),
                ExportMode::Symlink => match link_into(&self.router, file, &report.batch_path) {
                    Ok(()) => Ok(()),
                    Err(e) => {
                        tracing::warn!(file = %file.display(), error = %e, "Symlink failed, copying instead");
                        report.link_fallbacks += 1;
                        self.router
                            .transfer_into(file, &report.batch_path, MovementKind::Copy)
                            .map(|_| ())
                    },
                },
            };

            match placed {
                Ok(()) => {
                    if request.mode == ExportMode::Copy
                        && let Some(tracker) = tracker.as_deref_mut()
                    {
                        tracker.mark_copied(file)?;
                    }
                    report.exported += 1;
                    report.total_size += fs::metadata(file).map(|m| m.len()).unwrap_or(0);
                    metrics::counter!("tagsort_export_files_total").increment(1);
                    control.report(file, FileOutcome::Succeeded);
                },
                Err(e) => {
                    tracing::warn!(file = %file.display(), error = %e, "Export failed");
                    report.failures.push(ExportFailure {
                        file: file.clone(),
                        error: e.to_string(),
                    });
                    control.report(file, FileOutcome::Failed);
                },
            }
        }

        if let Some(tracker) = tracker.filter(|_| request.mode == ExportMode::Copy) {
            if report.cancelled || !report.failures.is_empty() {
                tracker.checkpoint()?;
            } else {
                tracker.complete()?;
            }
        }

        let manifest = build_manifest(&report.batch_path, files, &request.query);
        write_json_atomic(&report.manifest_path, &manifest)?;

        tracing::info!(
            exported = report.exported,
            skipped = report.skipped,
            failed = report.failures.len(),
            "Batch export finished"
        );
        Ok(report)
    }

    /// Reads back the manifest of an existing batch.
    pub fn statistics(batch_path: &Path) -> Result<BatchStatistics> {
        let manifest_path = batch_path.join(MANIFEST_FILE);
        let manifest: BatchManifest = read_json(&manifest_path)?.ok_or_else(|| {
            Error::InvalidInput(format!("manifest not found: {}", manifest_path.display()))
        })?;
        Ok(BatchStatistics {
            actual_files: manifest.images.len(),
            total_size: manifest.images.iter().map(|i| i.size).sum(),
            batch_name: manifest.batch_name,
            created: manifest.created,
            query: manifest.query,
            total_images: manifest.total_images,
        })
    }
}

fn build_manifest(batch_path: &Path, files: &[PathBuf], query: &str) -> BatchManifest {
    let images = files
        .iter()
        .filter_map(|file| {
            let metadata = fs::metadata(file).ok()?;
            Some(ManifestEntry {
                original_path: file.clone(),
                filename: file.file_name()?.to_string_lossy().into_owned(),
                size: metadata.len(),
                modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            })
        })
        .collect();

    BatchManifest {
        batch_name: batch_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        created: Utc::now(),
        query: query.to_string(),
        total_images: files.len(),
        images,
    }
}

fn link_into(router: &FileRouter, file: &Path, dir: &Path) -> io::Result<()> {
    let file_name = file
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "source has no file name"))?;
    let source = std::path::absolute(file)?;
    let companions = router.companions(&source);
    let extensions: Vec<&str> = companions.iter().map(|(ext, _)| ext.as_str()).collect();
    let target = resolve_bundle_collision(&dir.join(file_name), &extensions);
    symlink(&source, &target)?;

    for (ext, companion) in companions {
        let companion_target = with_suffix(&target, &ext);
        if let Err(e) = symlink(&companion, &companion_target) {
            tracing::warn!(companion = %companion.display(), error = %e, "Companion link failed");
        }
    }
    Ok(())
}

#[cfg(unix)]
fn symlink(source: &Path, target: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(source, target)
}

#[cfg(windows)]
fn symlink(source: &Path, target: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(source, target)
}

#[cfg(not(any(unix, windows)))]
fn symlink(_source: &Path, _target: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "symlinks are not supported on this platform",
    ))
}

/// Derives a folder-safe batch name from a query.
///
/// # Examples
///
/// ```
/// use tagsort::services::default_batch_name;
///
/// assert_eq!(default_batch_name("elf, succubus"), "elf_succubus");
/// assert_eq!(default_batch_name("elf|succubus,!armor"), "elf_succubusnot_armor");
/// ```
#[must_use]
pub fn default_batch_name(query: &str) -> String {
    let derived: String = query
        .replace(' ', "_")
        .replace(',', "")
        .replace('|', "_")
        .replace('!', "not_")
        .chars()
        .take(MAX_DERIVED_NAME)
        .collect();
    sanitize_folder_name(&derived)
}

/// Formats a byte count for display.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    for unit in UNITS {
        if size < 1024.0 {
            return format!("{size:.1} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1} PB")
}
