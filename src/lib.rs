//! # Tagsort
//!
//! Rule-driven sorting and tag queries for large image collections.
//!
//! Tagsort routes primary files (and their side-car companion files) into
//! destination folders according to operator-defined term rules, records every
//! movement so a whole pass can be undone and redone, and answers boolean tag
//! queries against a pre-built inverted index.
//!
//! ## Features
//!
//! - Four match kinds and four search scopes per rule, with mutual exclusions
//! - Single-folder, multi-folder, smart-combination and all-combinations routing
//! - Move/copy routing with collision-safe naming and an up-front free-space check
//! - Persistent undo/redo history and crash-resumable copy jobs
//! - `a|b, c, !d` tag queries with spelling suggestions for unknown tags
//!
//! ## Example
//!
//! ```rust,ignore
//! use tagsort::services::{DestinationResolver, FileRouter, TermMatcher};
//!
//! let mut matcher = TermMatcher::new();
//! let matches = matcher.match_rules(&metadata, rules.rules());
//! let destinations = resolver.resolve(&matches, RoutingMode::AllCombinations);
//! let outcome = router.route(&path, &destinations, TransferMode::Move)?;
//! ledger.record(outcome.movements, "Sort 1 files", BTreeMap::new())?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod cli;
pub mod config;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;

// Re-exports for convenience
pub use config::{RoutingSettings, TagsortConfig};
pub use models::{
    Destination, DestinationKind, FileMetadata, MatchKind, Movement, MovementKind, Operation,
    ResumableJob, Rule, RuleSet, SearchScope,
};
pub use services::{
    AutoSorter, BatchExporter, DestinationResolver, FileRouter, JobControl, JobTracker,
    OperationLedger, TagIndex, TermMatcher,
};

/// Error type for tagsort operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Missing rule fields, priority below 1, malformed enum values, empty file lists |
/// | `InvalidQuery` | Empty query, query without a positive clause |
/// | `UnknownTags` | Query names tags absent from the index |
/// | `InsufficientSpace` | Projected copy size (with margin) exceeds free space |
/// | `OperationFailed` | I/O errors, JSON/TOML decode failures, missing source files |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - A rule has an empty term or a priority below 1
    /// - Two rules share the same term
    /// - A routing mode, match kind or scope string is not recognised
    /// - An export or sort is requested with no files or no rules
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A tag query could not be parsed.
    ///
    /// Raised when:
    /// - The query string is empty or only separators
    /// - The query contains only negative clauses
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// A tag query referenced tags that are not in the index.
    #[error("unknown tags: {}{}", .tags.join(", "), suggestion_hint(.suggestions))]
    UnknownTags {
        /// The offending tags, in query order.
        tags: Vec<String>,
        /// Similarly spelled known tags (only for a single unknown tag).
        suggestions: Vec<String>,
    },

    /// Not enough free space for the projected transfer.
    ///
    /// Checked once before any file is touched.
    #[error(
        "insufficient disk space at {}: need {required} bytes, {available} available",
        .path.display()
    )]
    InsufficientSpace {
        /// Bytes required, including the safety margin.
        required: u64,
        /// Bytes available on the target volume.
        available: u64,
        /// The directory that was probed.
        path: std::path::PathBuf,
    },

    /// An operation failed.
    ///
    /// Raised when:
    /// - Filesystem I/O errors occur
    /// - Ledger history or job state cannot be read or written
    /// - Configuration or index files fail to parse
    /// - A source file disappeared before routing
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

fn suggestion_hint(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!(" (did you mean: {}?)", suggestions.join(", "))
    }
}

impl Error {
    /// Builds an `OperationFailed` from an operation name and any displayable cause.
    pub fn operation(operation: &str, cause: impl std::fmt::Display) -> Self {
        Self::OperationFailed {
            operation: operation.to_string(),
            cause: cause.to_string(),
        }
    }
}

/// Result type alias for tagsort operations.
pub type Result<T> = std::result::Result<T, Error>;
