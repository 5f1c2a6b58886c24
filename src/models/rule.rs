//! Sorting rules and their validation.

use super::destination::sanitize_folder_name;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// How a rule's term is compared against metadata text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Trimmed text must equal the term.
    Exact,
    /// Term appears anywhere in the text.
    Contains,
    /// Term appears delimited by word boundaries.
    #[default]
    WordBoundary,
    /// Term is a regular expression.
    Regex,
}

impl MatchKind {
    /// Returns all match kinds.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Exact, Self::Contains, Self::WordBoundary, Self::Regex]
    }

    /// Returns the match kind as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Contains => "contains",
            Self::WordBoundary => "word_boundary",
            Self::Regex => "regex",
        }
    }

    /// Parses a match kind from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "exact" => Some(Self::Exact),
            "contains" => Some(Self::Contains),
            "word_boundary" | "word-boundary" | "word" => Some(Self::WordBoundary),
            "regex" => Some(Self::Regex),
            _ => None,
        }
    }
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which metadata text a rule searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchScope {
    /// Positive prompt only (optionally with the negative prompt appended).
    PromptOnly,
    /// Companion tag text only.
    TagsOnly,
    /// Prompt, tags, or any other string field.
    #[default]
    Either,
    /// Must match in the prompt and in the tags.
    Both,
}

impl SearchScope {
    /// Returns the scope as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PromptOnly => "prompt_only",
            Self::TagsOnly => "tags_only",
            Self::Either => "either",
            Self::Both => "both",
        }
    }

    /// Parses a scope from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "prompt_only" | "prompt-only" | "prompt" => Some(Self::PromptOnly),
            "tags_only" | "tags-only" | "tags" => Some(Self::TagsOnly),
            "either" => Some(Self::Either),
            "both" => Some(Self::Both),
            _ => None,
        }
    }
}

impl fmt::Display for SearchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A validated sorting rule.
///
/// Rules are immutable for the duration of a sorting pass. Build them with
/// [`Rule::new`] and the `with_*` methods, or load them through
/// [`RuleSet::from_specs`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// The term to search for.
    pub term: String,
    /// Disabled rules never match.
    pub enabled: bool,
    /// Lower numbers take precedence. Always at least 1.
    pub priority: u32,
    /// How the term is compared.
    pub match_kind: MatchKind,
    /// Whether comparison is case-sensitive.
    pub case_sensitive: bool,
    /// Folder the rule routes into (already sanitized).
    pub folder_name: String,
    /// Whether this rule may produce a destination alongside others.
    pub allow_multi_destination: bool,
    /// Terms that cannot coexist with this one.
    pub exclusions: Vec<String>,
    /// Higher values come first in combination folder names.
    pub combination_priority: i32,
    /// Which metadata text is searched.
    pub scope: SearchScope,
    /// Append the negative prompt to prompt text.
    pub include_negative: bool,
}

impl Rule {
    /// Creates a rule with default settings for the given term.
    #[must_use]
    pub fn new(term: impl Into<String>) -> Self {
        let term = term.into().trim().to_string();
        let folder_name = sanitize_folder_name(&term);
        Self {
            term,
            enabled: true,
            priority: 1,
            match_kind: MatchKind::default(),
            case_sensitive: false,
            folder_name,
            allow_multi_destination: true,
            exclusions: Vec::new(),
            combination_priority: 0,
            scope: SearchScope::default(),
            include_negative: false,
        }
    }

    /// Sets the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the match kind.
    #[must_use]
    pub const fn with_match_kind(mut self, kind: MatchKind) -> Self {
        self.match_kind = kind;
        self
    }

    /// Sets the search scope.
    #[must_use]
    pub const fn with_scope(mut self, scope: SearchScope) -> Self {
        self.scope = scope;
        self
    }

    /// Sets the destination folder name (sanitized).
    #[must_use]
    pub fn with_folder_name(mut self, folder: &str) -> Self {
        self.folder_name = sanitize_folder_name(folder);
        self
    }

    /// Sets the exclusion list.
    #[must_use]
    pub fn with_exclusions<I, S>(mut self, exclusions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclusions = exclusions.into_iter().map(Into::into).collect();
        self
    }

    /// Sets case sensitivity.
    #[must_use]
    pub const fn with_case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    /// Sets whether the rule may share a file with other destinations.
    #[must_use]
    pub const fn with_allow_multi(mut self, allow: bool) -> Self {
        self.allow_multi_destination = allow;
        self
    }

    /// Sets the combination naming priority.
    #[must_use]
    pub const fn with_combination_priority(mut self, priority: i32) -> Self {
        self.combination_priority = priority;
        self
    }

    /// Sets whether negative prompt text is searched.
    #[must_use]
    pub const fn with_include_negative(mut self, include: bool) -> Self {
        self.include_negative = include;
        self
    }

    /// Sets the enabled flag.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Returns true if this rule's exclusion list names `term`.
    #[must_use]
    pub fn excludes(&self, term: &str) -> bool {
        self.exclusions
            .iter()
            .any(|excluded| fold_term(excluded) == fold_term(term))
    }

    fn validate(&self) -> Result<()> {
        if self.term.is_empty() {
            return Err(Error::InvalidInput("rule term cannot be empty".to_string()));
        }
        if self.priority < 1 {
            return Err(Error::InvalidInput(format!(
                "rule '{}' has priority {}, must be at least 1",
                self.term, self.priority
            )));
        }
        Ok(())
    }
}

/// Case-folded form of a term, used wherever two terms are compared.
#[must_use]
pub fn fold_term(term: &str) -> String {
    term.trim().to_lowercase()
}

/// Rule as written in a configuration file.
///
/// Every field but `term` is optional; enum values are kept as strings so a
/// bad value produces a readable validation error instead of a parse failure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RuleSpec {
    /// The term to search for.
    #[serde(default)]
    pub term: String,
    /// Enabled flag.
    pub enabled: Option<bool>,
    /// Priority (must be at least 1).
    pub priority: Option<i64>,
    /// Match kind name.
    pub match_type: Option<String>,
    /// Case sensitivity.
    pub case_sensitive: Option<bool>,
    /// Destination folder name.
    pub folder_name: Option<String>,
    /// Allow routing alongside other destinations.
    pub allow_multi_copy: Option<bool>,
    /// Mutually exclusive terms.
    #[serde(default)]
    pub exclusion_terms: Vec<String>,
    /// Combination naming priority.
    pub combination_priority: Option<i32>,
    /// Search scope name.
    pub search_scope: Option<String>,
    /// Include negative prompt in prompt text.
    pub include_negative_prompt: Option<bool>,
}

impl RuleSpec {
    /// Validates the fields and converts them into a [`Rule`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty term, a priority below 1,
    /// or an unrecognised match type or search scope.
    pub fn into_rule(self) -> Result<Rule> {
        let term = self.term.trim().to_string();
        if term.is_empty() {
            return Err(Error::InvalidInput("rule term cannot be empty".to_string()));
        }

        let priority = match self.priority {
            None => 1,
            Some(p) if p >= 1 => u32::try_from(p).map_err(|_| {
                Error::InvalidInput(format!("rule '{term}' priority {p} is out of range"))
            })?,
            Some(p) => {
                return Err(Error::InvalidInput(format!(
                    "rule '{term}' has priority {p}, must be at least 1"
                )));
            },
        };

        let match_kind = match self.match_type.as_deref() {
            None => MatchKind::default(),
            Some(raw) => MatchKind::parse(raw).ok_or_else(|| {
                Error::InvalidInput(format!("rule '{term}' has unknown match_type '{raw}'"))
            })?,
        };

        let scope = match self.search_scope.as_deref() {
            None => SearchScope::default(),
            Some(raw) => SearchScope::parse(raw).ok_or_else(|| {
                Error::InvalidInput(format!("rule '{term}' has unknown search_scope '{raw}'"))
            })?,
        };

        let folder = self
            .folder_name
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .unwrap_or(&term);

        let rule = Rule::new(term.clone())
            .with_folder_name(folder)
            .with_priority(priority)
            .with_match_kind(match_kind)
            .with_scope(scope)
            .with_enabled(self.enabled.unwrap_or(true))
            .with_case_sensitive(self.case_sensitive.unwrap_or(false))
            .with_allow_multi(self.allow_multi_copy.unwrap_or(true))
            .with_combination_priority(self.combination_priority.unwrap_or(0))
            .with_include_negative(self.include_negative_prompt.unwrap_or(false))
            .with_exclusions(
                self.exclusion_terms
                    .into_iter()
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty()),
            );

        Ok(rule)
    }
}

impl From<&Rule> for RuleSpec {
    fn from(rule: &Rule) -> Self {
        Self {
            term: rule.term.clone(),
            enabled: Some(rule.enabled),
            priority: Some(i64::from(rule.priority)),
            match_type: Some(rule.match_kind.as_str().to_string()),
            case_sensitive: Some(rule.case_sensitive),
            folder_name: Some(rule.folder_name.clone()),
            allow_multi_copy: Some(rule.allow_multi_destination),
            exclusion_terms: rule.exclusions.clone(),
            combination_priority: Some(rule.combination_priority),
            search_scope: Some(rule.scope.as_str().to_string()),
            include_negative_prompt: Some(rule.include_negative),
        }
    }
}

/// A validated, immutable collection of rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Validates a list of rules.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if any rule is invalid or two rules
    /// share a term (case-insensitively).
    pub fn new(rules: Vec<Rule>) -> Result<Self> {
        let mut seen = HashSet::new();
        for rule in &rules {
            rule.validate()?;
            if !seen.insert(fold_term(&rule.term)) {
                return Err(Error::InvalidInput(format!(
                    "duplicate rule term '{}'",
                    rule.term
                )));
            }
        }

        for rule in &rules {
            for excluded in &rule.exclusions {
                if !seen.contains(&fold_term(excluded)) {
                    tracing::warn!(
                        term = %rule.term,
                        excluded = %excluded,
                        "Exclusion names a term with no rule"
                    );
                }
            }
        }

        Ok(Self { rules })
    }

    /// Converts and validates configuration-file specs.
    ///
    /// # Errors
    ///
    /// Returns the first validation error encountered.
    pub fn from_specs(specs: Vec<RuleSpec>) -> Result<Self> {
        let rules = specs
            .into_iter()
            .map(RuleSpec::into_rule)
            .collect::<Result<Vec<_>>>()?;
        Self::new(rules)
    }

    /// Returns the rules in their configured order.
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Returns the number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns true if there are no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Returns true if at least one rule is enabled.
    #[must_use]
    pub fn has_enabled(&self) -> bool {
        self.rules.iter().any(|r| r.enabled)
    }
}
