//! Multi-destination resolution.
//!
//! Turns a [`MatchSet`] into an ordered list of [`Destination`]s. The routing
//! mode is chosen per call; everything else (caps, combination window,
//! separator, unmatched bucket) is fixed by [`RoutingLimits`].
//!
//! | Mode | Output |
//! |------|--------|
//! | `single_folder` | At most one destination, chosen by the conflict strategy |
//! | `multi_folder` | One per rule allowing multi-destination, capped at `max_folders` |
//! | `smart_combination` | One combination folder inside the window, else `multi_folder` |
//! | `all_combinations` | `multi_folder` plus the combination folder inside the window |

use super::matcher::MatchSet;
use crate::models::{
    ConflictStrategy, Destination, NoMatchPolicy, Rule, RoutingMode, sanitize_folder_name,
};
use std::path::PathBuf;

/// Fixed limits and naming settings for resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingLimits {
    /// Root directory destinations are created under.
    pub output_root: PathBuf,
    /// Unmatched bucket, relative to `output_root` unless absolute.
    pub unmatched_dir: PathBuf,
    /// Tie-break for single-folder routing.
    pub conflict: ConflictStrategy,
    /// What to do when nothing matched.
    pub no_match: NoMatchPolicy,
    /// Cap on individual destinations in multi-folder routing.
    pub max_folders: usize,
    /// Smallest match count that earns a combination folder.
    pub min_combination: usize,
    /// Largest match count that earns a combination folder.
    pub max_combination: usize,
    /// Whether combination folders are produced at all.
    pub create_combination_folders: bool,
    /// Joins folder names in combination names.
    pub separator: String,
}

impl Default for RoutingLimits {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("sorted"),
            unmatched_dir: PathBuf::from("_unmatched"),
            conflict: ConflictStrategy::default(),
            no_match: NoMatchPolicy::default(),
            max_folders: 5,
            min_combination: 2,
            max_combination: 3,
            create_combination_folders: true,
            separator: "_".to_string(),
        }
    }
}

impl RoutingLimits {
    /// Sets the output root.
    #[must_use]
    pub fn with_output_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.output_root = root.into();
        self
    }

    /// Sets the conflict strategy.
    #[must_use]
    pub const fn with_conflict(mut self, conflict: ConflictStrategy) -> Self {
        self.conflict = conflict;
        self
    }

    /// Sets the no-match policy.
    #[must_use]
    pub const fn with_no_match(mut self, policy: NoMatchPolicy) -> Self {
        self.no_match = policy;
        self
    }

    /// Sets the combination window.
    #[must_use]
    pub const fn with_combination_window(mut self, min: usize, max: usize) -> Self {
        self.min_combination = min;
        self.max_combination = max;
        self
    }

    /// Sets the multi-folder cap.
    #[must_use]
    pub const fn with_max_folders(mut self, max: usize) -> Self {
        self.max_folders = max;
        self
    }

    /// Returns the resolved unmatched bucket path.
    #[must_use]
    pub fn unmatched_path(&self) -> PathBuf {
        self.output_root.join(&self.unmatched_dir)
    }
}

/// Resolves match sets into destinations.
#[derive(Debug, Clone, Default)]
pub struct DestinationResolver {
    limits: RoutingLimits,
}

impl DestinationResolver {
    /// Creates a resolver with the given limits.
    #[must_use]
    pub const fn new(limits: RoutingLimits) -> Self {
        Self { limits }
    }

    /// Returns the limits in use.
    #[must_use]
    pub const fn limits(&self) -> &RoutingLimits {
        &self.limits
    }

    /// Resolves destinations for one file.
    ///
    /// An empty result means the file should be left in place.
    #[must_use]
    pub fn resolve(&self, matches: &MatchSet<'_>, mode: RoutingMode) -> Vec<Destination> {
        let rules = matches.rules();
        if rules.is_empty() {
            return match self.limits.no_match {
                NoMatchPolicy::MoveToUnmatched => {
                    vec![Destination::unmatched(self.limits.unmatched_path())]
                },
                NoMatchPolicy::LeaveInPlace => Vec::new(),
            };
        }

        let destinations: Vec<Destination> = match mode {
            RoutingMode::SingleFolder => self.single_folder(rules).into_iter().collect(),
            RoutingMode::MultiFolder => self.multi_folder(rules),
            RoutingMode::SmartCombination => self
                .combination(rules)
                .map_or_else(|| self.multi_folder(rules), |combo| vec![combo]),
            RoutingMode::AllCombinations => {
                let mut all = self.multi_folder(rules);
                all.extend(self.combination(rules));
                all
            },
        };

        tracing::debug!(
            mode = %mode,
            matched = rules.len(),
            destinations = destinations.len(),
            "Resolved destinations"
        );
        destinations
    }

    fn single_folder(&self, rules: &[&Rule]) -> Option<Destination> {
        let winner = match self.limits.conflict {
            ConflictStrategy::FirstMatch => rules.first().copied(),
            ConflictStrategy::MostSpecific => rules.iter().copied().reduce(|best, rule| {
                if rule.term.chars().count() > best.term.chars().count() {
                    rule
                } else {
                    best
                }
            }),
            ConflictStrategy::Skip if rules.len() > 1 => None,
            ConflictStrategy::Skip => rules.first().copied(),
        }?;
        Some(self.single(winner))
    }

    fn multi_folder(&self, rules: &[&Rule]) -> Vec<Destination> {
        rules
            .iter()
            .filter(|rule| rule.allow_multi_destination)
            .take(self.limits.max_folders)
            .map(|rule| self.single(rule))
            .collect()
    }

    fn combination(&self, rules: &[&Rule]) -> Option<Destination> {
        if !self.limits.create_combination_folders || !self.window_holds(rules.len()) {
            return None;
        }

        let mut ordered: Vec<&Rule> = rules.to_vec();
        ordered.sort_by(|a, b| {
            b.combination_priority
                .cmp(&a.combination_priority)
                .then_with(|| a.priority.cmp(&b.priority))
                .then_with(|| a.term.cmp(&b.term))
        });

        let name = combination_name(&ordered, &self.limits.separator);
        let terms = ordered.iter().map(|r| r.term.clone()).collect();
        Some(Destination::combination(terms, &name, &self.limits.output_root))
    }

    fn single(&self, rule: &Rule) -> Destination {
        Destination::single(rule.term.clone(), &rule.folder_name, &self.limits.output_root)
    }

    const fn window_holds(&self, count: usize) -> bool {
        count >= self.limits.min_combination && count <= self.limits.max_combination
    }
}

/// Joins folder names of already ordered rules and sanitizes the result.
#[must_use]
pub fn combination_name(ordered: &[&Rule], separator: &str) -> String {
    let joined = ordered
        .iter()
        .map(|rule| rule.folder_name.as_str())
        .collect::<Vec<_>>()
        .join(separator);
    sanitize_folder_name(&joined)
}
