//! Business logic services.
//!
//! Services turn rules and metadata into destinations, move files, keep the
//! undo history and answer tag queries. Each is constructed explicitly and
//! owns its state; nothing here is global.

mod control;
mod exporter;
mod ledger;
mod matcher;
mod query;
mod resolver;
mod router;
mod sorter;
mod tracker;
pub mod visual;

pub use control::{FileOutcome, JobControl, Progress, ProgressEvent};
pub use exporter::{
    BatchExporter, BatchManifest, BatchStatistics, EXPORT_JOB_TYPE, ExportFailure, ExportMode,
    ExportReport, ExportRequest, MANIFEST_FILE, ManifestEntry, default_batch_name, format_size,
};
pub use ledger::{DEFAULT_MAX_HISTORY, MovementFailure, OperationLedger, ReplayReport};
pub use matcher::{MatchSet, PatternKey, TermMatcher, filter_exclusions};
pub use query::{Clause, QueryAst, TagIndex, TagSort, edit_distance, resolve_image_path};
pub use resolver::{DestinationResolver, RoutingLimits, combination_name};
pub use router::{
    DEFAULT_COMPANION_EXTENSIONS, DestinationFailure, FileRouter, FsSpaceProbe, OutcomeStatus,
    RouteOutcome, SpaceProbe, Transfer, copy_file, move_file, resolve_bundle_collision,
    resolve_collision, with_suffix,
};
pub use sorter::{AutoSorter, ErrorCategory, SortError, SortInput, SortReport};
pub use tracker::{CopyFailure, DEFAULT_CHECKPOINT_INTERVAL, JobTracker, ResumeReport};
pub use visual::{
    DEFAULT_CONFIDENCE_THRESHOLD, PersonCount, Rating, ShotType, SortingProfile,
    VisualClassification, VisualRouter, VisualSortKey, VisualSortReport,
};
