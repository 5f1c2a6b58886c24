//! Data models for tagsort.
//!
//! This module contains the core data structures shared by the matcher,
//! resolver, router and ledger.

mod destination;
mod job;
mod metadata;
mod movement;
mod routing;
mod rule;

pub use destination::{Destination, DestinationKind, FALLBACK_FOLDER_NAME, sanitize_folder_name};
pub use job::ResumableJob;
pub use metadata::{
    FileMetadata, MetadataValue, NEGATIVE_PROMPT, PARAMETERS, POSITIVE_PROMPT, TAGS,
};
pub use movement::{CompanionTransfer, Movement, MovementKind, Operation, OperationStatus};
pub use routing::{ConflictStrategy, NoMatchPolicy, RoutingMode, TransferMode};
pub use rule::{MatchKind, Rule, RuleSet, RuleSpec, SearchScope, fold_term};
