//! Metadata-driven sort passes.
//!
//! [`AutoSorter`] runs a whole batch through the matcher, the resolver and
//! the router, tallies where files went, and records every movement of the
//! pass as a single ledger operation.

use super::control::{FileOutcome, JobControl};
use super::ledger::OperationLedger;
use super::matcher::TermMatcher;
use super::resolver::DestinationResolver;
use super::router::{FileRouter, OutcomeStatus, with_suffix};
use crate::models::{DestinationKind, FileMetadata, RoutingMode, RuleSet, TAGS, TransferMode};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Extension of the side-car file holding plain tag text.
const TAG_TEXT_SUFFIX: &str = ".txt";

/// Why a file could not be sorted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// No metadata and no tag text.
    NoMetadata,
    /// The file could not be read.
    FileAccess,
    /// A destination could not be written.
    DestinationError,
    /// Anything else.
    Unknown,
}

impl ErrorCategory {
    /// Returns the category as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NoMetadata => "no_metadata",
            Self::FileAccess => "file_access",
            Self::DestinationError => "destination_error",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A per-file failure during a sort pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SortError {
    /// The file.
    pub file: PathBuf,
    /// Failure class.
    pub category: ErrorCategory,
    /// What went wrong.
    pub message: String,
}

/// One file to sort.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SortInput {
    /// Path of the primary file.
    pub path: PathBuf,
    /// Extracted metadata, if any.
    pub metadata: Option<FileMetadata>,
}

impl SortInput {
    /// Creates an input.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, metadata: Option<FileMetadata>) -> Self {
        Self {
            path: path.into(),
            metadata,
        }
    }
}

/// Tallies for one sort pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SortReport {
    /// Files looked at.
    pub processed: usize,
    /// Files routed to at least one rule folder.
    pub sorted: usize,
    /// Files routed to the unmatched folder.
    pub unmatched: usize,
    /// Files with no destination.
    pub left_in_place: usize,
    /// Movements recorded.
    pub movements: usize,
    /// Files per destination folder name.
    pub term_counts: BTreeMap<String, usize>,
    /// Per-file failures.
    pub errors: Vec<SortError>,
    /// Whether the pass stopped on cancellation.
    pub cancelled: bool,
    /// Identifier of the recorded ledger operation.
    pub operation_id: Option<String>,
}

impl SortReport {
    /// Returns the overall status.
    #[must_use]
    pub fn status(&self) -> OutcomeStatus {
        let failed: BTreeSet<&Path> = self.errors.iter().map(|e| e.file.as_path()).collect();
        OutcomeStatus::from_counts(self.processed.saturating_sub(failed.len()), failed.len())
    }

    /// Failure counts per category.
    #[must_use]
    pub fn error_counts(&self) -> BTreeMap<ErrorCategory, usize> {
        let mut counts = BTreeMap::new();
        for error in &self.errors {
            *counts.entry(error.category).or_default() += 1;
        }
        counts
    }

    fn fail(&mut self, file: &Path, category: ErrorCategory, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(file = %file.display(), category = %category, %message, "Sort error");
        self.errors.push(SortError {
            file: file.to_path_buf(),
            category,
            message,
        });
    }
}

/// Sorts batches of files by their metadata.
#[derive(Debug)]
pub struct AutoSorter {
    rules: RuleSet,
    matcher: TermMatcher,
    resolver: DestinationResolver,
    router: FileRouter,
    mode: RoutingMode,
    transfer: TransferMode,
}

impl AutoSorter {
    /// Creates a sorter in all-combinations move mode.
    #[must_use]
    pub fn new(rules: RuleSet, resolver: DestinationResolver, router: FileRouter) -> Self {
        Self {
            rules,
            matcher: TermMatcher::new(),
            resolver,
            router,
            mode: RoutingMode::default(),
            transfer: TransferMode::default(),
        }
    }

    /// Sets the routing mode.
    #[must_use]
    pub const fn with_mode(mut self, mode: RoutingMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets move or copy.
    #[must_use]
    pub const fn with_transfer(mut self, transfer: TransferMode) -> Self {
        self.transfer = transfer;
        self
    }

    /// The active rules.
    #[must_use]
    pub const fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Sorts `inputs` and records the pass in `ledger`.
    ///
    /// Fails before touching anything if there are no rules or not enough
    /// free space for the whole batch. Everything after that is reported per
    /// file in the returned [`SortReport`].
    #[instrument(skip_all, fields(files = inputs.len(), mode = %self.mode, transfer = %self.transfer))]
    pub fn sort(
        &mut self,
        inputs: &[SortInput],
        control: &JobControl,
        ledger: &mut OperationLedger,
    ) -> Result<SortReport> {
        if self.rules.is_empty() {
            return Err(Error::InvalidInput("no sort rules configured".to_string()));
        }
        self.check_batch_space(inputs)?;

        let mut report = SortReport::default();
        let mut movements = Vec::new();
        control.add_total(inputs.len());

        for input in inputs {
            if !control.checkpoint() {
                report.cancelled = true;
                tracing::info!(processed = report.processed, "Sort cancelled");
                break;
            }
            report.processed += 1;
            let file = input.path.as_path();

            let Some(metadata) = effective_metadata(input) else {
                report.fail(file, ErrorCategory::NoMetadata, "no metadata found");
                control.report(file, FileOutcome::Failed);
                continue;
            };
            if !file.is_file() {
                report.fail(file, ErrorCategory::FileAccess, "file not found");
                control.report(file, FileOutcome::Failed);
                continue;
            }

            let matches = self.matcher.match_rules(&metadata, self.rules.rules());
            let destinations = self.resolver.resolve(&matches, self.mode);
            if destinations.is_empty() {
                report.left_in_place += 1;
                control.report(file, FileOutcome::Skipped);
                continue;
            }

            match self.router.route(file, &destinations, self.transfer) {
                Ok(outcome) => {
                    let reached: BTreeSet<&Path> = outcome
                        .movements
                        .iter()
                        .filter_map(|m| m.destination.parent())
                        .collect();
                    let mut reached_folder = false;
                    for destination in &destinations {
                        if !reached.contains(destination.path.as_path()) {
                            continue;
                        }
                        if destination.kind == DestinationKind::Unmatched {
                            report.unmatched += 1;
                        } else {
                            reached_folder = true;
                            *report
                                .term_counts
                                .entry(destination.folder_name.clone())
                                .or_default() += 1;
                        }
                    }
                    if reached_folder {
                        report.sorted += 1;
                    }
                    for failure in &outcome.failures {
                        report.fail(
                            file,
                            ErrorCategory::DestinationError,
                            format!("{}: {}", failure.folder_name, failure.error),
                        );
                    }
                    let result = if outcome.failures.is_empty() {
                        FileOutcome::Succeeded
                    } else {
                        FileOutcome::Failed
                    };
                    report.movements += outcome.movements.len();
                    movements.extend(outcome.movements);
                    control.report(file, result);
                },
                Err(e) => {
                    let category = match e {
                        Error::OperationFailed { .. } if !file.exists() => ErrorCategory::FileAccess,
                        Error::OperationFailed { .. } | Error::InsufficientSpace { .. } => {
                            ErrorCategory::DestinationError
                        },
                        _ => ErrorCategory::Unknown,
                    };
                    report.fail(file, category, e.to_string());
                    control.report(file, FileOutcome::Failed);
                },
            }
        }

        let routed = report.sorted + report.unmatched;
        let mut metadata = BTreeMap::new();
        metadata.insert("mode".to_string(), self.mode.to_string());
        metadata.insert("transfer".to_string(), self.transfer.to_string());
        metadata.insert("processed".to_string(), report.processed.to_string());
        if let Ok(counts) = serde_json::to_string(&report.term_counts) {
            metadata.insert("term_counts".to_string(), counts);
        }
        report.operation_id = ledger
            .record(movements, &format!("Sort {routed} files"), metadata)?
            .map(|op| op.id.clone());

        tracing::info!(
            processed = report.processed,
            sorted = report.sorted,
            unmatched = report.unmatched,
            errors = report.errors.len(),
            "Sort pass finished"
        );
        Ok(report)
    }

    fn check_batch_space(&self, inputs: &[SortInput]) -> Result<()> {
        let total = inputs
            .iter()
            .filter(|input| input.path.is_file())
            .filter_map(|input| self.router.bundle_size(&input.path).ok())
            .fold(0u64, u64::saturating_add);
        self.router.ensure_space(total, &self.resolver.limits().output_root)
    }
}

/// Metadata for an input, falling back to `<file>.txt` for tags.
///
/// Returns `None` when there is neither metadata nor tag text.
fn effective_metadata(input: &SortInput) -> Option<FileMetadata> {
    let metadata = input.metadata.clone().filter(|m| !m.is_empty());
    let has_tags = metadata.as_ref().is_some_and(|m| m.contains(TAGS));
    if has_tags {
        return metadata;
    }

    match read_tag_text(&input.path) {
        Some(text) => {
            let mut metadata = metadata.unwrap_or_default();
            metadata.insert(TAGS, text);
            Some(metadata)
        },
        None => metadata,
    }
}

fn read_tag_text(file: &Path) -> Option<String> {
    let companion = with_suffix(file, TAG_TEXT_SUFFIX);
    match fs::read_to_string(&companion) {
        Ok(text) => {
            let text = text.trim();
            (!text.is_empty()).then(|| text.to_string())
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            tracing::debug!(companion = %companion.display(), error = %e, "Tag text unreadable");
            None
        },
    }
}
