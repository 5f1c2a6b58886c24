//! Resolved routing destinations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Characters that are not allowed in folder names on common filesystems.
const RESERVED_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Name used when sanitizing leaves nothing behind.
pub const FALLBACK_FOLDER_NAME: &str = "unnamed";

/// What produced a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationKind {
    /// One matched rule's own folder.
    #[default]
    SingleTerm,
    /// A folder named after several matched rules.
    Combination,
    /// The bucket for files no rule matched.
    Unmatched,
}

impl DestinationKind {
    /// Returns the kind as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SingleTerm => "single_term",
            Self::Combination => "combination",
            Self::Unmatched => "unmatched",
        }
    }
}

impl fmt::Display for DestinationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A resolved output location for one or more matched rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    /// Single-term, combination or unmatched.
    pub kind: DestinationKind,
    /// Terms of the rules that own this destination.
    pub terms: Vec<String>,
    /// Directory the file is routed into.
    pub path: PathBuf,
    /// Folder name as displayed to the operator.
    pub folder_name: String,
}

impl Destination {
    /// Creates a single-term destination under `root`.
    #[must_use]
    pub fn single(term: impl Into<String>, folder_name: &str, root: &std::path::Path) -> Self {
        let folder_name = sanitize_folder_name(folder_name);
        Self {
            kind: DestinationKind::SingleTerm,
            terms: vec![term.into()],
            path: root.join(&folder_name),
            folder_name,
        }
    }

    /// Creates a combination destination under `root`.
    #[must_use]
    pub fn combination(terms: Vec<String>, folder_name: &str, root: &std::path::Path) -> Self {
        let folder_name = sanitize_folder_name(folder_name);
        Self {
            kind: DestinationKind::Combination,
            terms,
            path: root.join(&folder_name),
            folder_name,
        }
    }

    /// Creates the synthetic destination for unmatched files.
    #[must_use]
    pub fn unmatched(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let folder_name = path
            .file_name()
            .map_or_else(|| "unmatched".to_string(), |n| n.to_string_lossy().into_owned());
        Self {
            kind: DestinationKind::Unmatched,
            terms: Vec::new(),
            path,
            folder_name,
        }
    }
}

/// Makes a folder name legal on common filesystems.
///
/// Reserved characters become `_`, leading and trailing dots and spaces are
/// stripped, and an empty result becomes [`FALLBACK_FOLDER_NAME`].
///
/// # Examples
///
/// ```
/// use tagsort::models::sanitize_folder_name;
///
/// assert_eq!(sanitize_folder_name("a/b:c"), "a_b_c");
/// assert_eq!(sanitize_folder_name(" .hidden. "), "hidden");
/// assert_eq!(sanitize_folder_name("..."), "unnamed");
/// ```
#[must_use]
pub fn sanitize_folder_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if RESERVED_CHARS.contains(&c) { '_' } else { c })
        .collect();
    let trimmed = replaced.trim_matches(|c| c == '.' || c == ' ');
    if trimmed.is_empty() {
        FALLBACK_FOLDER_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use test_case::test_case;

    #[test_case("cat", "cat")]
    #[test_case("a<b>c", "a_b_c")]
    #[test_case("what?*", "what__")]
    #[test_case("  spaced  ", "spaced")]
    #[test_case("..dots..", "dots")]
    #[test_case("", "unnamed")]
    #[test_case(" . ", "unnamed")]
    fn test_sanitize_folder_name(input: &str, expected: &str) {
        assert_eq!(sanitize_folder_name(input), expected);
    }

    #[test]
    fn test_single_destination_joins_sanitized_folder() {
        let dest = Destination::single("a|b", "a|b", Path::new("/out"));
        assert_eq!(dest.path, Path::new("/out/a_b"));
        assert_eq!(dest.folder_name, "a_b");
        assert_eq!(dest.terms, vec!["a|b".to_string()]);
    }

    #[test]
    fn test_unmatched_destination_uses_dir_name() {
        let dest = Destination::unmatched("/out/_unmatched");
        assert_eq!(dest.kind, DestinationKind::Unmatched);
        assert_eq!(dest.folder_name, "_unmatched");
        assert!(dest.terms.is_empty());
    }
}
