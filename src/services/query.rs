//! Boolean tag queries over a pre-built inverted index.
//!
//! Query syntax:
//! - `a,b` - files tagged with both `a` and `b`
//! - `a|b` - files tagged with `a` or `b`
//! - `a,!c` - files tagged with `a` but not `c`
//! - `(a|b),!c` - parentheses are accepted and ignored
//!
//! All tag comparisons are case-folded.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Maximum edit distance for a spelling suggestion.
const MAX_SUGGESTION_DISTANCE: usize = 2;

/// Suggestions offered for an unknown tag.
const MAX_SUGGESTIONS: usize = 3;

/// One AND-ed clause of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    /// Whether the clause was prefixed with `!`.
    pub negated: bool,
    /// Tags unioned within the clause, lowercased.
    pub alternatives: Vec<String>,
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            f.write_str("!")?;
        }
        f.write_str(&self.alternatives.join("|"))
    }
}

/// A parsed tag query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryAst {
    clauses: Vec<Clause>,
}

impl QueryAst {
    /// Parses a query string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidQuery`] if the query holds no tags at all.
    ///
    /// # Examples
    ///
    /// ```
    /// use tagsort::services::QueryAst;
    ///
    /// let ast = QueryAst::parse("(Elf|Succubus), !armor").unwrap();
    /// assert_eq!(ast.positives().count(), 1);
    /// assert_eq!(ast.negatives().count(), 1);
    /// assert_eq!(ast.to_string(), "elf|succubus,!armor");
    /// ```
    pub fn parse(query: &str) -> Result<Self> {
        let stripped: String = query.chars().filter(|c| !matches!(c, '(' | ')')).collect();

        let clauses: Vec<Clause> = stripped
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .filter_map(|part| {
                let (negated, body) = match part.strip_prefix('!') {
                    Some(rest) => (true, rest),
                    None => (false, part),
                };
                let alternatives: Vec<String> = body
                    .split('|')
                    .map(|tag| tag.trim().to_lowercase())
                    .filter(|tag| !tag.is_empty())
                    .collect();
                (!alternatives.is_empty()).then_some(Clause {
                    negated,
                    alternatives,
                })
            })
            .collect();

        if clauses.is_empty() {
            return Err(Error::InvalidQuery("query is empty".to_string()));
        }
        Ok(Self { clauses })
    }

    /// All clauses, in query order.
    #[must_use]
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Clauses without `!`.
    pub fn positives(&self) -> impl Iterator<Item = &Clause> {
        self.clauses.iter().filter(|c| !c.negated)
    }

    /// Clauses with `!`.
    pub fn negatives(&self) -> impl Iterator<Item = &Clause> {
        self.clauses.iter().filter(|c| c.negated)
    }

    /// Every tag named by the query, in order, without duplicates.
    #[must_use]
    pub fn tags(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        self.clauses
            .iter()
            .flat_map(|c| c.alternatives.iter())
            .filter(|tag| seen.insert(tag.as_str()))
            .map(String::as_str)
            .collect()
    }
}

impl fmt::Display for QueryAst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.clauses.iter().map(ToString::to_string).collect();
        f.write_str(&parts.join(","))
    }
}

/// Ordering for [`TagIndex::list`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagSort {
    /// Most frequent first, ties by name.
    #[default]
    Count,
    /// Alphabetical.
    Name,
}

impl TagSort {
    /// Returns the ordering as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Name => "name",
        }
    }

    /// Parses an ordering from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "count" | "frequency" => Some(Self::Count),
            "name" | "alpha" => Some(Self::Name),
            _ => None,
        }
    }
}

impl fmt::Display for TagSort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct IndexSource {
    tags: BTreeMap<String, TagEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct TagEntry {
    #[serde(default)]
    count: Option<u64>,
    #[serde(default)]
    images: Vec<String>,
}

/// Inverted index from tag to file identifiers.
#[derive(Debug, Clone, Default)]
pub struct TagIndex {
    tags: BTreeMap<String, BTreeSet<String>>,
    counts: BTreeMap<String, u64>,
    files: HashMap<String, BTreeSet<String>>,
}

impl TagIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an index from `{"tags": {name: {count, images}}}` JSON.
    ///
    /// Tags that differ only by case are merged.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let source: IndexSource = serde_json::from_str(json).map_err(|e| Error::OperationFailed {
            operation: "parse_tag_index".to_string(),
            cause: e.to_string(),
        })?;

        let mut index = Self::new();
        for (tag, entry) in source.tags {
            index.insert(&tag, entry.count, entry.images);
        }
        tracing::info!(
            tags = index.tag_count(),
            files = index.file_count(),
            "Loaded tag index"
        );
        Ok(index)
    }

    /// Reads and builds an index from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_tag_index".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;
        Self::from_json_str(&raw)
    }

    /// Adds files under `tag`. A missing count defaults to the file count.
    pub fn insert<I, S>(&mut self, tag: &str, count: Option<u64>, images: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tag = tag.trim().to_lowercase();
        if tag.is_empty() {
            return;
        }
        let files = self.tags.entry(tag.clone()).or_default();
        let before = files.len();
        for image in images {
            let image = image.into();
            self.files
                .entry(image.clone())
                .or_default()
                .insert(tag.clone());
            files.insert(image);
        }
        let added = count.unwrap_or_else(|| u64::try_from(files.len() - before).unwrap_or(u64::MAX));
        *self.counts.entry(tag).or_default() += added;
    }

    /// Number of distinct tags.
    #[must_use]
    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }

    /// Number of distinct files.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Returns true if the index knows `tag`.
    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        self.tags.contains_key(&tag.to_lowercase())
    }

    /// Files carrying `tag`.
    #[must_use]
    pub fn files_for(&self, tag: &str) -> Option<&BTreeSet<String>> {
        self.tags.get(&tag.to_lowercase())
    }

    /// Tags attached to a file.
    #[must_use]
    pub fn tags_for_file(&self, file: &str) -> Option<&BTreeSet<String>> {
        self.files.get(file)
    }

    /// Tags with their declared counts.
    #[must_use]
    pub fn list(&self, sort: TagSort) -> Vec<(String, u64)> {
        let mut tags: Vec<(String, u64)> = self
            .counts
            .iter()
            .map(|(tag, count)| (tag.clone(), *count))
            .collect();
        if sort == TagSort::Count {
            tags.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        }
        tags
    }

    /// Checks that a parsed query can be evaluated.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidQuery`] if there is no positive clause
    /// - [`Error::UnknownTags`] if a tag is not in the index
    pub fn validate(&self, ast: &QueryAst) -> Result<()> {
        if ast.positives().next().is_none() {
            return Err(Error::InvalidQuery(
                "query needs at least one tag without '!'".to_string(),
            ));
        }

        let unknown: Vec<String> = ast
            .tags()
            .into_iter()
            .filter(|tag| !self.tags.contains_key(*tag))
            .map(ToString::to_string)
            .collect();

        if unknown.is_empty() {
            return Ok(());
        }
        let suggestions = match unknown.as_slice() {
            [single] => self.suggest(single),
            _ => Vec::new(),
        };
        Err(Error::UnknownTags {
            tags: unknown,
            suggestions,
        })
    }

    /// Known tags similar to `tag`, closest first.
    #[must_use]
    pub fn suggest(&self, tag: &str) -> Vec<String> {
        let tag = tag.to_lowercase();
        let mut candidates: Vec<(usize, &String)> = self
            .tags
            .keys()
            .filter_map(|known| {
                let distance = edit_distance(&tag, known);
                let related = known.contains(tag.as_str()) || tag.contains(known.as_str());
                (distance <= MAX_SUGGESTION_DISTANCE || related).then_some((distance, known))
            })
            .collect();
        candidates.sort();
        candidates
            .into_iter()
            .take(MAX_SUGGESTIONS)
            .map(|(_, known)| known.clone())
            .collect()
    }

    /// Files matching a parsed query, sorted.
    ///
    /// OR groups are unioned first; positive clauses are intersected in
    /// order and the union of negative clauses is subtracted.
    #[must_use]
    pub fn evaluate(&self, ast: &QueryAst) -> Vec<String> {
        let mut positives = ast.positives().map(|clause| self.clause_files(clause));
        let Some(mut result) = positives.next() else {
            return Vec::new();
        };
        for files in positives {
            if result.is_empty() {
                break;
            }
            result.retain(|file| files.contains(*file));
        }

        for clause in ast.negatives() {
            for tag in &clause.alternatives {
                if let Some(files) = self.tags.get(tag) {
                    result.retain(|file| !files.contains(*file));
                }
            }
        }

        result.into_iter().cloned().collect()
    }

    /// Parses, validates and evaluates a query.
    #[instrument(skip(self))]
    pub fn query(&self, query: &str) -> Result<Vec<String>> {
        metrics::counter!("tagsort_queries_total").increment(1);
        let ast = QueryAst::parse(query)?;
        self.validate(&ast)?;
        let results = self.evaluate(&ast);
        tracing::debug!(results = results.len(), "Query evaluated");
        Ok(results)
    }

    fn clause_files(&self, clause: &Clause) -> BTreeSet<&String> {
        clause
            .alternatives
            .iter()
            .filter_map(|tag| self.tags.get(tag))
            .flatten()
            .collect()
    }
}

/// Resolves an index file identifier to a path under `image_root`.
///
/// Absolute identifiers are returned unchanged.
#[must_use]
pub fn resolve_image_path(image_root: Option<&Path>, file: &str) -> PathBuf {
    let path = Path::new(file);
    match image_root {
        Some(root) if path.is_relative() => root.join(path),
        _ => path.to_path_buf(),
    }
}

/// Levenshtein distance over characters.
#[must_use]
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            current[j + 1] = (previous[j + 1] + 1)
                .min(current[j] + 1)
                .min(previous[j] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}
