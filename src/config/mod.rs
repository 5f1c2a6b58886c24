//! Configuration management.
//!
//! Configuration is read from TOML. Every field in the file is optional and
//! overlays the defaults; rule specs and enum strings are validated once
//! here, so the services only ever see typed values.

use crate::models::{
    ConflictStrategy, NoMatchPolicy, RoutingMode, RuleSet, RuleSpec, TransferMode,
};
use crate::services::{
    AutoSorter, BatchExporter, DEFAULT_CHECKPOINT_INTERVAL, DEFAULT_COMPANION_EXTENSIONS,
    DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_MAX_HISTORY, DestinationResolver, FileRouter, JobTracker,
    OperationLedger, RoutingLimits, VisualClassification, VisualRouter,
};
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "TAGSORT_CONFIG_PATH";

/// File name of the persisted undo history inside the state directory.
pub const HISTORY_FILE: &str = "history.json";

/// File name of the persisted resumable job inside the state directory.
pub const PENDING_JOB_FILE: &str = "pending_job.json";

/// Main configuration for tagsort.
#[derive(Debug, Clone)]
pub struct TagsortConfig {
    /// Root directory sorted folders are created under.
    pub output_root: PathBuf,
    /// Unmatched bucket, relative to `output_root`.
    pub unmatched_dir: String,
    /// Directory holding undo history and job state.
    pub state_dir: PathBuf,
    /// Tag index JSON file.
    pub tag_index: PathBuf,
    /// Directory relative index identifiers resolve against.
    pub image_root: Option<PathBuf>,
    /// Directory batch exports are written to.
    pub batch_output: PathBuf,
    /// Routing settings.
    pub routing: RoutingSettings,
    /// History settings.
    pub ledger: LedgerSettings,
    /// Logging settings.
    pub logging: LoggingSettings,
    /// Visual classification settings.
    pub visual: VisualSettings,
    /// Sort rules.
    pub rules: RuleSet,
}

/// Routing settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingSettings {
    /// Routing mode.
    pub mode: RoutingMode,
    /// Single-folder tie-break.
    pub on_multiple: ConflictStrategy,
    /// What to do with unmatched files.
    pub on_no_match: NoMatchPolicy,
    /// Move or copy.
    pub transfer: TransferMode,
    /// Cap on individual destinations.
    pub max_folders: usize,
    /// Joins names in combination folders.
    pub combination_separator: String,
    /// Smallest match count for a combination folder.
    pub min_tags_for_combination: usize,
    /// Largest match count for a combination folder.
    pub max_tags_for_combination: usize,
    /// Whether combination folders are produced.
    pub create_combination_folders: bool,
    /// Side-car extensions moved with each file.
    pub companion_extensions: Vec<String>,
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            mode: RoutingMode::AllCombinations,
            on_multiple: ConflictStrategy::FirstMatch,
            on_no_match: NoMatchPolicy::MoveToUnmatched,
            transfer: TransferMode::Move,
            max_folders: 5,
            combination_separator: "_".to_string(),
            min_tags_for_combination: 2,
            max_tags_for_combination: 3,
            create_combination_folders: true,
            companion_extensions: DEFAULT_COMPANION_EXTENSIONS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

/// Undo history and job checkpoint settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerSettings {
    /// Operations kept on the undo stack.
    pub max_history: usize,
    /// Copies between job checkpoints.
    pub checkpoint_interval: usize,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            max_history: DEFAULT_MAX_HISTORY,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
        }
    }
}

/// Logging section, passed through to observability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LoggingSettings {
    /// `json` or `pretty`.
    pub format: Option<String>,
    /// Default filter directive, e.g. `info` or `tagsort=debug`.
    pub level: Option<String>,
    /// Log file; stderr when absent.
    pub file: Option<PathBuf>,
}

/// Visual classification settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisualSettings {
    /// Minimum tagger confidence.
    pub confidence_threshold: f32,
}

impl Default for VisualSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Output root.
    pub output_root: Option<String>,
    /// Unmatched folder name.
    pub unmatched_dir: Option<String>,
    /// State directory.
    pub state_dir: Option<String>,
    /// Tag index path.
    pub tag_index: Option<String>,
    /// Image root.
    pub image_root: Option<String>,
    /// Batch export directory.
    pub batch_output: Option<String>,
    /// Routing section.
    pub routing: Option<ConfigFileRouting>,
    /// Ledger section.
    pub ledger: Option<ConfigFileLedger>,
    /// Logging section.
    pub logging: Option<LoggingSettings>,
    /// Visual section.
    pub visual: Option<ConfigFileVisual>,
    /// Rule specs.
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
}

/// Routing section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileRouting {
    /// Routing mode.
    pub mode: Option<String>,
    /// Conflict strategy.
    pub on_multiple: Option<String>,
    /// No-match policy.
    pub on_no_match: Option<String>,
    /// Transfer mode.
    pub transfer: Option<String>,
    /// Multi-folder cap.
    pub max_folders: Option<usize>,
    /// Combination separator.
    pub combination_separator: Option<String>,
    /// Combination window minimum.
    pub min_tags_for_combination: Option<usize>,
    /// Combination window maximum.
    pub max_tags_for_combination: Option<usize>,
    /// Combination toggle.
    pub create_combination_folders: Option<bool>,
    /// Companion extensions.
    pub companion_extensions: Option<Vec<String>>,
}

/// Ledger section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileLedger {
    /// Undo stack cap.
    pub max_history: Option<usize>,
    /// Checkpoint interval.
    pub checkpoint_interval: Option<usize>,
}

/// Visual section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileVisual {
    /// Confidence threshold.
    pub confidence_threshold: Option<f32>,
}

impl Default for TagsortConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("sorted"),
            unmatched_dir: "_unmatched".to_string(),
            state_dir: PathBuf::from(".tagsort"),
            tag_index: PathBuf::from("tag_frequency.json"),
            image_root: None,
            batch_output: PathBuf::from("batch_exports"),
            routing: RoutingSettings::default(),
            ledger: LedgerSettings::default(),
            logging: LoggingSettings::default(),
            visual: VisualSettings::default(),
            rules: RuleSet::default(),
        }
    }
}

impl TagsortConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration, honouring an explicit path first.
    ///
    /// Lookup order: `explicit`, then [`CONFIG_PATH_ENV`], then the default
    /// locations of [`Self::load_default`].
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly named file cannot be read or parsed.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_file(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_PATH_ENV).filter(|p| !p.is_empty()) {
            return Self::load_from_file(Path::new(&path));
        }
        Ok(Self::load_default())
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if a rule
    /// or enum value is invalid.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or any value is invalid.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;
        Self::from_config_file(file)
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the following paths in order:
    /// 1. Platform-specific config dir (`~/Library/Application Support/tagsort/` on macOS)
    /// 2. XDG config dir (`~/.config/tagsort/` for Unix compatibility)
    ///
    /// A file that fails to load is skipped with a warning. Returns default
    /// configuration if no usable file is found.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };

        let candidates = [
            base_dirs.config_dir().join("tagsort").join("config.toml"),
            base_dirs
                .home_dir()
                .join(".config")
                .join("tagsort")
                .join("config.toml"),
        ];
        for candidate in candidates.iter().filter(|p| p.exists()) {
            match Self::load_from_file(candidate) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!(path = %candidate.display(), error = %e, "Ignoring config file");
                },
            }
        }

        Self::default()
    }

    /// Converts a `ConfigFile` to `TagsortConfig`.
    fn from_config_file(file: ConfigFile) -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = file.output_root {
            config.output_root = PathBuf::from(v);
        }
        if let Some(v) = file.unmatched_dir {
            config.unmatched_dir = v;
        }
        if let Some(v) = file.state_dir {
            config.state_dir = PathBuf::from(v);
        }
        if let Some(v) = file.tag_index {
            config.tag_index = PathBuf::from(v);
        }
        if let Some(v) = file.image_root {
            config.image_root = Some(PathBuf::from(v));
        }
        if let Some(v) = file.batch_output {
            config.batch_output = PathBuf::from(v);
        }
        if let Some(routing) = file.routing {
            apply_routing(&mut config.routing, routing)?;
        }
        if let Some(ledger) = file.ledger {
            if let Some(v) = ledger.max_history {
                config.ledger.max_history = v.max(1);
            }
            if let Some(v) = ledger.checkpoint_interval {
                config.ledger.checkpoint_interval = v.max(1);
            }
        }
        if let Some(logging) = file.logging {
            config.logging = logging;
        }
        if let Some(visual) = file.visual
            && let Some(threshold) = visual.confidence_threshold
        {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(Error::InvalidInput(format!(
                    "visual.confidence_threshold must be between 0 and 1, got {threshold}"
                )));
            }
            config.visual.confidence_threshold = threshold;
        }
        config.rules = RuleSet::from_specs(file.rules)?;

        Ok(config)
    }

    /// Sets the output root.
    #[must_use]
    pub fn with_output_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_root = path.into();
        self
    }

    /// Sets the state directory.
    #[must_use]
    pub fn with_state_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_dir = path.into();
        self
    }

    /// Sets the rules.
    #[must_use]
    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    /// Path of the persisted undo history.
    #[must_use]
    pub fn history_path(&self) -> PathBuf {
        self.state_dir.join(HISTORY_FILE)
    }

    /// Path of the persisted resumable job.
    #[must_use]
    pub fn job_state_path(&self) -> PathBuf {
        self.state_dir.join(PENDING_JOB_FILE)
    }

    /// Resolver limits derived from the routing settings.
    #[must_use]
    pub fn resolver_limits(&self) -> RoutingLimits {
        let routing = &self.routing;
        RoutingLimits {
            output_root: self.output_root.clone(),
            unmatched_dir: PathBuf::from(&self.unmatched_dir),
            conflict: routing.on_multiple,
            no_match: routing.on_no_match,
            max_folders: routing.max_folders,
            min_combination: routing.min_tags_for_combination,
            max_combination: routing.max_tags_for_combination,
            create_combination_folders: routing.create_combination_folders,
            separator: routing.combination_separator.clone(),
        }
    }

    /// A file router using the configured companion extensions.
    #[must_use]
    pub fn router(&self) -> FileRouter {
        FileRouter::new().with_companion_extensions(&self.routing.companion_extensions)
    }

    /// A sorter using the configured rules and routing.
    #[must_use]
    pub fn auto_sorter(&self) -> AutoSorter {
        AutoSorter::new(
            self.rules.clone(),
            DestinationResolver::new(self.resolver_limits()),
            self.router(),
        )
        .with_mode(self.routing.mode)
        .with_transfer(self.routing.transfer)
    }

    /// Opens the persisted undo history.
    ///
    /// # Errors
    ///
    /// Returns an error if the history file exists but cannot be read.
    pub fn open_ledger(&self) -> Result<OperationLedger> {
        OperationLedger::open(self.history_path(), self.ledger.max_history)
    }

    /// A job tracker at the configured state path.
    #[must_use]
    pub fn tracker(&self) -> JobTracker {
        JobTracker::new(self.job_state_path(), self.ledger.checkpoint_interval)
    }

    /// A batch exporter writing to `output`, or the configured directory.
    #[must_use]
    pub fn exporter(&self, output: Option<&Path>) -> BatchExporter {
        let dir = output.map_or_else(|| self.batch_output.clone(), Path::to_path_buf);
        BatchExporter::new(dir, self.router())
    }

    /// Classifies tagger output with the configured confidence threshold.
    #[must_use]
    pub fn classify<I, S>(&self, file: impl Into<PathBuf>, scores: I) -> VisualClassification
    where
        I: IntoIterator<Item = (S, f32)>,
        S: AsRef<str>,
    {
        VisualClassification::from_scores(file, scores, self.visual.confidence_threshold)
    }

    /// A visual router placing attribute folders under the output root.
    #[must_use]
    pub fn visual_router(&self) -> VisualRouter {
        VisualRouter::new(&self.output_root)
    }
}

fn apply_routing(settings: &mut RoutingSettings, file: ConfigFileRouting) -> Result<()> {
    if let Some(v) = file.mode {
        settings.mode = parse_setting("routing.mode", &v, RoutingMode::parse)?;
    }
    if let Some(v) = file.on_multiple {
        settings.on_multiple = parse_setting("routing.on_multiple", &v, ConflictStrategy::parse)?;
    }
    if let Some(v) = file.on_no_match {
        settings.on_no_match = parse_setting("routing.on_no_match", &v, NoMatchPolicy::parse)?;
    }
    if let Some(v) = file.transfer {
        settings.transfer = parse_setting("routing.transfer", &v, TransferMode::parse)?;
    }
    if let Some(v) = file.max_folders {
        settings.max_folders = v;
    }
    if let Some(v) = file.combination_separator {
        settings.combination_separator = v;
    }
    if let Some(v) = file.min_tags_for_combination {
        settings.min_tags_for_combination = v;
    }
    if let Some(v) = file.max_tags_for_combination {
        settings.max_tags_for_combination = v;
    }
    if settings.min_tags_for_combination > settings.max_tags_for_combination {
        return Err(Error::InvalidInput(format!(
            "routing.min_tags_for_combination ({}) exceeds max_tags_for_combination ({})",
            settings.min_tags_for_combination, settings.max_tags_for_combination
        )));
    }
    if let Some(v) = file.create_combination_folders {
        settings.create_combination_folders = v;
    }
    if let Some(v) = file.companion_extensions {
        settings.companion_extensions = v;
    }
    Ok(())
}

fn parse_setting<T>(key: &str, raw: &str, parse: impl Fn(&str) -> Option<T>) -> Result<T> {
    parse(raw).ok_or_else(|| Error::InvalidInput(format!("{key} has unknown value '{raw}'")))
}
