//! Routing by visual classification.
//!
//! An image tagger reports `(tag, confidence)` pairs per image. Those pairs
//! are reduced to a shot type, a person count and a content rating, and an
//! image is routed into a folder named after one of them. Sorting profiles
//! narrow a batch to the compositions a downstream consumer expects.

use super::control::{FileOutcome, JobControl};
use super::ledger::OperationLedger;
use super::router::{DestinationFailure, FileRouter};
use crate::models::{Destination, TransferMode};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Tags below this confidence are ignored by default.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.35;

const SHOT_TAGS: &[(&str, ShotType)] = &[
    ("close-up", ShotType::ExtremeCloseup),
    ("portrait", ShotType::Portrait),
    ("upper_body", ShotType::UpperBody),
    ("cowboy_shot", ShotType::CowboyShot),
    ("full_body", ShotType::FullBody),
    ("wide_shot", ShotType::WideShot),
    ("very_wide_shot", ShotType::WideShot),
];

const GROUP_TAGS: &[&str] = &[
    "multiple_girls",
    "multiple_boys",
    "3girls",
    "4girls",
    "5girls",
    "6+girls",
    "crowd",
];
const DUO_TAGS: &[&str] = &["2girls", "2boys"];
const SOLO_TAGS: &[&str] = &["solo", "solo_focus", "1girl", "1boy"];

const RATING_TAGS: &[(&str, Rating)] = &[
    ("general", Rating::General),
    ("sensitive", Rating::Sensitive),
    ("questionable", Rating::Questionable),
    ("explicit", Rating::Explicit),
];

/// Framing of the subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShotType {
    /// Face fills the frame.
    ExtremeCloseup,
    /// Head and shoulders.
    Portrait,
    /// Waist up.
    UpperBody,
    /// Thighs up.
    CowboyShot,
    /// Whole body visible.
    FullBody,
    /// Subject small in frame.
    WideShot,
    /// No shot tag above threshold.
    #[default]
    Unknown,
}

impl ShotType {
    /// Returns the shot type as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ExtremeCloseup => "extreme_closeup",
            Self::Portrait => "portrait",
            Self::UpperBody => "upper_body",
            Self::CowboyShot => "cowboy_shot",
            Self::FullBody => "full_body",
            Self::WideShot => "wide_shot",
            Self::Unknown => "unknown",
        }
    }

    /// Parses a shot type from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "extreme_closeup" | "close-up" | "closeup" => Some(Self::ExtremeCloseup),
            "portrait" => Some(Self::Portrait),
            "upper_body" => Some(Self::UpperBody),
            "cowboy_shot" | "cowboy" => Some(Self::CowboyShot),
            "full_body" => Some(Self::FullBody),
            "wide_shot" | "wide" => Some(Self::WideShot),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for ShotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How many people are in frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonCount {
    /// One person.
    Solo,
    /// Two people.
    Duo,
    /// Three or more.
    Group,
    /// No count tag above threshold.
    #[default]
    Unknown,
}

impl PersonCount {
    /// Returns the count as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Solo => "solo",
            Self::Duo => "duo",
            Self::Group => "group",
            Self::Unknown => "unknown",
        }
    }

    /// Parses a count from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "solo" => Some(Self::Solo),
            "duo" => Some(Self::Duo),
            "group" => Some(Self::Group),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for PersonCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Content rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    /// Safe for work.
    General,
    /// Mild.
    Sensitive,
    /// Suggestive.
    Questionable,
    /// Adult.
    Explicit,
    /// No rating tag above threshold.
    #[default]
    Unknown,
}

impl Rating {
    /// Returns the rating as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Sensitive => "sensitive",
            Self::Questionable => "questionable",
            Self::Explicit => "explicit",
            Self::Unknown => "unknown",
        }
    }

    /// Parses a rating from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "general" | "safe" => Some(Self::General),
            "sensitive" => Some(Self::Sensitive),
            "questionable" => Some(Self::Questionable),
            "explicit" => Some(Self::Explicit),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Visual attributes derived for one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualClassification {
    /// The classified image.
    pub file: PathBuf,
    /// Framing.
    pub shot_type: ShotType,
    /// People in frame.
    pub person_count: PersonCount,
    /// Content rating.
    pub rating: Rating,
    /// Tags that passed the threshold, lowercased, with their confidence.
    pub tags: BTreeMap<String, f32>,
}

impl VisualClassification {
    /// Classifies an image from tagger output.
    ///
    /// Pairs below `threshold` are dropped before any attribute is derived.
    #[must_use]
    pub fn from_scores<I, S>(file: impl Into<PathBuf>, scores: I, threshold: f32) -> Self
    where
        I: IntoIterator<Item = (S, f32)>,
        S: AsRef<str>,
    {
        let tags: BTreeMap<String, f32> = scores
            .into_iter()
            .filter(|(_, confidence)| *confidence >= threshold)
            .map(|(tag, confidence)| (tag.as_ref().trim().to_lowercase(), confidence))
            .collect();

        Self {
            file: file.into(),
            shot_type: strongest(&tags, SHOT_TAGS).unwrap_or_default(),
            person_count: person_count(&tags),
            rating: strongest(&tags, RATING_TAGS).unwrap_or_default(),
            tags,
        }
    }

    /// Returns true if `tag` passed the threshold.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains_key(&tag.to_lowercase())
    }

    /// The attribute value used as a folder name for `key`.
    #[must_use]
    pub const fn value_for(&self, key: VisualSortKey) -> &'static str {
        match key {
            VisualSortKey::ShotType => self.shot_type.as_str(),
            VisualSortKey::PersonCount => self.person_count.as_str(),
            VisualSortKey::Rating => self.rating.as_str(),
        }
    }
}

fn strongest<T: Copy>(tags: &BTreeMap<String, f32>, table: &[(&str, T)]) -> Option<T> {
    let mut best: Option<(f32, T)> = None;
    for (tag, value) in table {
        if let Some(&confidence) = tags.get(*tag)
            && best.is_none_or(|(score, _)| confidence > score)
        {
            best = Some((confidence, *value));
        }
    }
    best.map(|(_, value)| value)
}

fn person_count(tags: &BTreeMap<String, f32>) -> PersonCount {
    let any = |candidates: &[&str]| candidates.iter().any(|tag| tags.contains_key(*tag));
    if any(GROUP_TAGS) {
        PersonCount::Group
    } else if any(DUO_TAGS) {
        PersonCount::Duo
    } else if any(SOLO_TAGS) {
        PersonCount::Solo
    } else {
        PersonCount::Unknown
    }
}

/// Which attribute names the destination folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualSortKey {
    /// Route by [`ShotType`].
    #[default]
    ShotType,
    /// Route by [`PersonCount`].
    PersonCount,
    /// Route by [`Rating`].
    Rating,
}

impl VisualSortKey {
    /// Returns the key as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ShotType => "shot_type",
            Self::PersonCount => "person_count",
            Self::Rating => "rating",
        }
    }

    /// Parses a key from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "shot_type" | "shot" => Some(Self::ShotType),
            "person_count" | "persons" | "people" => Some(Self::PersonCount),
            "rating" | "nsfw_rating" => Some(Self::Rating),
            _ => None,
        }
    }
}

impl fmt::Display for VisualSortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Acceptance criteria for one training set or consumer.
///
/// An empty allowed set accepts anything, and an `unknown` attribute passes
/// the allowed-set checks.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SortingProfile {
    /// Profile name.
    pub name: String,
    /// Accepted shot types.
    #[serde(default)]
    pub shot_types: Vec<ShotType>,
    /// Accepted person counts.
    #[serde(default)]
    pub person_counts: Vec<PersonCount>,
    /// Accepted ratings.
    #[serde(default)]
    pub ratings: Vec<Rating>,
    /// Tags that must all be present.
    #[serde(default)]
    pub required_tags: Vec<String>,
    /// Tags that must all be absent.
    #[serde(default)]
    pub excluded_tags: Vec<String>,
}

impl SortingProfile {
    /// Creates a profile that accepts everything.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Returns true if the classification satisfies the profile.
    #[must_use]
    pub fn matches(&self, classification: &VisualClassification) -> bool {
        allowed(&self.shot_types, classification.shot_type, ShotType::Unknown)
            && allowed(
                &self.person_counts,
                classification.person_count,
                PersonCount::Unknown,
            )
            && allowed(&self.ratings, classification.rating, Rating::Unknown)
            && self.required_tags.iter().all(|t| classification.has_tag(t))
            && !self.excluded_tags.iter().any(|t| classification.has_tag(t))
    }

    /// The stock profiles.
    #[must_use]
    pub fn builtins() -> Vec<Self> {
        vec![
            Self {
                shot_types: vec![ShotType::Portrait, ShotType::ExtremeCloseup, ShotType::UpperBody],
                person_counts: vec![PersonCount::Solo],
                ..Self::new("portrait_lora")
            },
            Self {
                shot_types: vec![ShotType::FullBody, ShotType::CowboyShot, ShotType::WideShot],
                ..Self::new("action_lora")
            },
            Self {
                person_counts: vec![PersonCount::Duo],
                ..Self::new("duo_lora")
            },
            Self {
                shot_types: vec![ShotType::Portrait, ShotType::UpperBody],
                person_counts: vec![PersonCount::Solo],
                ratings: vec![Rating::General, Rating::Sensitive],
                ..Self::new("sfw_portrait")
            },
        ]
    }

    /// Looks up a stock profile by name.
    #[must_use]
    pub fn builtin(name: &str) -> Option<Self> {
        Self::builtins().into_iter().find(|p| p.name == name)
    }
}

fn allowed<T: PartialEq>(set: &[T], value: T, unknown: T) -> bool {
    set.is_empty() || value == unknown || set.contains(&value)
}

/// Result of routing a classified batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VisualSortReport {
    /// Files routed.
    pub routed: usize,
    /// Files rejected by the profile.
    pub skipped: usize,
    /// Files per destination folder.
    pub folder_counts: BTreeMap<String, usize>,
    /// Failed transfers.
    pub failures: Vec<DestinationFailure>,
    /// Whether the pass stopped on cancellation.
    pub cancelled: bool,
}

/// Turns classifications into single-folder destinations.
#[derive(Debug, Clone)]
pub struct VisualRouter {
    output_root: PathBuf,
}

impl VisualRouter {
    /// Creates a router placing folders under `output_root`.
    #[must_use]
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
        }
    }

    /// Root under which attribute folders are created.
    #[must_use]
    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// The destination for one classification.
    #[must_use]
    pub fn destination(&self, classification: &VisualClassification, key: VisualSortKey) -> Destination {
        let value = classification.value_for(key);
        Destination::single(value, value, &self.output_root)
    }

    /// Routes a batch and records it as one operation.
    ///
    /// With a profile, classifications it rejects are left in place.
    #[instrument(skip_all, fields(files = classifications.len(), key = %key))]
    #[allow(clippy::too_many_arguments)]
    pub fn sort(
        &self,
        classifications: &[VisualClassification],
        key: VisualSortKey,
        profile: Option<&SortingProfile>,
        router: &FileRouter,
        mode: TransferMode,
        control: &JobControl,
        ledger: &mut OperationLedger,
    ) -> Result<VisualSortReport> {
        let mut report = VisualSortReport::default();
        let mut movements = Vec::new();
        control.add_total(classifications.len());

        for classification in classifications {
            if !control.checkpoint() {
                report.cancelled = true;
                break;
            }
            if profile.is_some_and(|p| !p.matches(classification)) {
                report.skipped += 1;
                control.report(&classification.file, FileOutcome::Skipped);
                continue;
            }

            let destination = self.destination(classification, key);
            match router.route(&classification.file, std::slice::from_ref(&destination), mode) {
                Ok(outcome) => {
                    let ok = outcome.failures.is_empty();
                    if !outcome.movements.is_empty() {
                        report.routed += 1;
                        *report
                            .folder_counts
                            .entry(destination.folder_name.clone())
                            .or_default() += 1;
                    }
                    movements.extend(outcome.movements);
                    report.failures.extend(outcome.failures);
                    let result = if ok { FileOutcome::Succeeded } else { FileOutcome::Failed };
                    control.report(&classification.file, result);
                },
                Err(e) => {
                    tracing::warn!(file = %classification.file.display(), error = %e, "Visual routing failed");
                    report.failures.push(DestinationFailure {
                        destination: destination.path.clone(),
                        folder_name: destination.folder_name.clone(),
                        error: e.to_string(),
                    });
                    control.report(&classification.file, FileOutcome::Failed);
                },
            }
        }

        let mut metadata = BTreeMap::new();
        metadata.insert("sort_key".to_string(), key.to_string());
        metadata.insert("transfer".to_string(), mode.to_string());
        if let Some(profile) = profile {
            metadata.insert("profile".to_string(), profile.name.clone());
        }
        let name = format!("Visual sort {} files", report.routed);
        ledger.record(movements, &name, metadata)?;

        tracing::info!(
            routed = report.routed,
            skipped = report.skipped,
            failures = report.failures.len(),
            "Visual sort finished"
        );
        Ok(report)
    }
}

/// Distinct attribute values seen in a batch, for summaries.
#[must_use]
pub fn distinct_values(classifications: &[VisualClassification], key: VisualSortKey) -> BTreeSet<&'static str> {
    classifications.iter().map(|c| c.value_for(key)).collect()
}
