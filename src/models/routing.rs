//! Routing strategy enums shared by configuration and services.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How matched rules are turned into destinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingMode {
    /// At most one destination, picked by a [`ConflictStrategy`].
    SingleFolder,
    /// One destination per eligible rule.
    MultiFolder,
    /// One combination folder when the tag window holds, else multi-folder.
    SmartCombination,
    /// Multi-folder plus the combination folder when the window holds.
    #[default]
    AllCombinations,
}

impl RoutingMode {
    /// Returns all routing modes.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::SingleFolder,
            Self::MultiFolder,
            Self::SmartCombination,
            Self::AllCombinations,
        ]
    }

    /// Returns the mode as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SingleFolder => "single_folder",
            Self::MultiFolder => "multi_folder",
            Self::SmartCombination => "smart_combination",
            Self::AllCombinations => "all_combinations",
        }
    }

    /// Parses a mode from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "single_folder" | "single" => Some(Self::SingleFolder),
            "multi_folder" | "multi" => Some(Self::MultiFolder),
            "smart_combination" | "smart" => Some(Self::SmartCombination),
            "all_combinations" | "all" => Some(Self::AllCombinations),
            _ => None,
        }
    }
}

impl fmt::Display for RoutingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tie-break used by single-folder routing when several rules match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// Highest priority rule wins.
    #[default]
    FirstMatch,
    /// Longest term wins.
    MostSpecific,
    /// Leave the file in place.
    Skip,
}

impl ConflictStrategy {
    /// Returns the strategy as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::FirstMatch => "first_match",
            Self::MostSpecific => "most_specific",
            Self::Skip => "skip",
        }
    }

    /// Parses a strategy from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "first_match" | "first" => Some(Self::FirstMatch),
            "most_specific" | "longest" => Some(Self::MostSpecific),
            "skip" => Some(Self::Skip),
            _ => None,
        }
    }
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What happens to files no rule matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoMatchPolicy {
    /// Route into the unmatched bucket.
    #[default]
    MoveToUnmatched,
    /// Leave the file where it is.
    LeaveInPlace,
}

impl NoMatchPolicy {
    /// Returns the policy as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MoveToUnmatched => "move_to_unmatched",
            Self::LeaveInPlace => "leave_in_place",
        }
    }

    /// Parses a policy from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "move_to_unmatched" | "unmatched" => Some(Self::MoveToUnmatched),
            "leave_in_place" | "leave" | "skip" => Some(Self::LeaveInPlace),
            _ => None,
        }
    }
}

impl fmt::Display for NoMatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether the router relocates the original or leaves it in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    /// Move to the first destination, copy to the rest.
    #[default]
    Move,
    /// Copy to every destination, original untouched.
    Copy,
}

impl TransferMode {
    /// Returns the mode as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Move => "move",
            Self::Copy => "copy",
        }
    }

    /// Parses a transfer mode from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "move" => Some(Self::Move),
            "copy" => Some(Self::Copy),
            _ => None,
        }
    }
}

impl fmt::Display for TransferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_routing_mode_round_trip() {
        for mode in RoutingMode::all() {
            assert_eq!(RoutingMode::parse(mode.as_str()), Some(*mode));
        }
    }

    #[test_case("Smart-Combination", Some(RoutingMode::SmartCombination))]
    #[test_case("single", Some(RoutingMode::SingleFolder))]
    #[test_case("everything", None)]
    fn test_routing_mode_aliases(input: &str, expected: Option<RoutingMode>) {
        assert_eq!(RoutingMode::parse(input), expected);
    }

    #[test]
    fn test_defaults() {
        assert_eq!(RoutingMode::default(), RoutingMode::AllCombinations);
        assert_eq!(ConflictStrategy::default(), ConflictStrategy::FirstMatch);
        assert_eq!(NoMatchPolicy::default(), NoMatchPolicy::MoveToUnmatched);
        assert_eq!(TransferMode::default(), TransferMode::Move);
    }
}
