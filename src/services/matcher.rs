//! Term matching and exclusion filtering.
//!
//! [`TermMatcher`] decides which rules match one file's metadata. Compiled
//! patterns are cached per [`PatternKey`] for the lifetime of the matcher, so
//! a sorting pass compiles each term at most once. The resulting
//! [`MatchSet`] is sorted by priority and has mutual exclusions applied by
//! [`filter_exclusions`].

use crate::models::{FileMetadata, MatchKind, Rule, SearchScope};
use regex::{Regex, RegexBuilder};
use std::collections::HashMap;

/// Cache key for a compiled pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PatternKey {
    /// The rule term, as written.
    pub term: String,
    /// How the term is matched.
    pub kind: MatchKind,
    /// Whether matching is case-sensitive.
    pub case_sensitive: bool,
}

impl PatternKey {
    /// Builds the key for a rule.
    #[must_use]
    pub fn for_rule(rule: &Rule) -> Self {
        Self {
            term: rule.term.clone(),
            kind: rule.match_kind,
            case_sensitive: rule.case_sensitive,
        }
    }
}

/// Rules that matched one file, in priority order, exclusions applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchSet<'r> {
    rules: Vec<&'r Rule>,
}

impl<'r> MatchSet<'r> {
    /// Builds a match set from already filtered, sorted rules.
    #[must_use]
    pub const fn from_sorted(rules: Vec<&'r Rule>) -> Self {
        Self { rules }
    }

    /// Returns the matched rules.
    #[must_use]
    pub fn rules(&self) -> &[&'r Rule] {
        &self.rules
    }

    /// Returns the matched terms in order.
    #[must_use]
    pub fn terms(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.term.as_str()).collect()
    }

    /// Returns the number of matched rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns true if nothing matched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Matches rules against file metadata.
#[derive(Debug, Default)]
pub struct TermMatcher {
    patterns: HashMap<PatternKey, Option<Regex>>,
}

impl TermMatcher {
    /// Creates a matcher with an empty pattern cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the rules matching `metadata`, sorted and exclusion-filtered.
    ///
    /// Disabled rules are ignored. Ties in priority are broken by term so the
    /// result does not depend on the order of `rules`.
    pub fn match_rules<'r>(&mut self, metadata: &FileMetadata, rules: &'r [Rule]) -> MatchSet<'r> {
        let mut matched: Vec<&Rule> = rules
            .iter()
            .filter(|rule| rule.enabled)
            .filter(|rule| self.rule_matches(rule, metadata))
            .collect();

        matched.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.term.cmp(&b.term)));

        MatchSet::from_sorted(filter_exclusions(matched))
    }

    /// Returns true if `rule` matches the scoped text of `metadata`.
    pub fn rule_matches(&mut self, rule: &Rule, metadata: &FileMetadata) -> bool {
        let prompt = prompt_text(rule, metadata);
        let tags = metadata.tags();

        match rule.scope {
            SearchScope::PromptOnly => self.matches_text(rule, &prompt),
            SearchScope::TagsOnly => self.matches_text(rule, tags),
            SearchScope::Both => self.matches_text(rule, &prompt) && self.matches_text(rule, tags),
            SearchScope::Either => {
                // Remaining string fields are searched as one space-joined text.
                let other = metadata.other_text().collect::<Vec<_>>().join(" ");
                self.matches_text(rule, &prompt)
                    || self.matches_text(rule, tags)
                    || self.matches_text(rule, &other)
            },
        }
    }

    /// Returns true if `rule`'s term matches `text` under its match kind.
    pub fn matches_text(&mut self, rule: &Rule, text: &str) -> bool {
        if text.trim().is_empty() || rule.term.is_empty() {
            return false;
        }

        match rule.match_kind {
            MatchKind::Exact => {
                let candidate = text.trim();
                if rule.case_sensitive {
                    candidate == rule.term
                } else {
                    candidate.to_lowercase() == rule.term.to_lowercase()
                }
            },
            MatchKind::Contains => {
                if rule.case_sensitive {
                    text.contains(&rule.term)
                } else {
                    text.to_lowercase().contains(&rule.term.to_lowercase())
                }
            },
            MatchKind::WordBoundary | MatchKind::Regex => self
                .pattern(rule)
                .is_some_and(|pattern| pattern.is_match(text)),
        }
    }

    /// Number of distinct patterns compiled so far (including failures).
    #[must_use]
    pub fn cached_patterns(&self) -> usize {
        self.patterns.len()
    }

    fn pattern(&mut self, rule: &Rule) -> Option<&Regex> {
        let key = PatternKey::for_rule(rule);
        self.patterns
            .entry(key)
            .or_insert_with_key(compile)
            .as_ref()
    }
}

fn compile(key: &PatternKey) -> Option<Regex> {
    let source = match key.kind {
        MatchKind::WordBoundary => format!(r"\b{}\b", regex::escape(&key.term)),
        _ => key.term.clone(),
    };

    match RegexBuilder::new(&source)
        .case_insensitive(!key.case_sensitive)
        .build()
    {
        Ok(pattern) => Some(pattern),
        Err(e) => {
            tracing::warn!(term = %key.term, error = %e, "Invalid pattern, rule will never match");
            None
        },
    }
}

fn prompt_text(rule: &Rule, metadata: &FileMetadata) -> String {
    let positive = metadata.positive_prompt();
    let negative = metadata.negative_prompt();
    if rule.include_negative && !negative.is_empty() {
        format!("{positive} {negative}")
    } else {
        positive.to_string()
    }
}

/// Applies mutual exclusions to priority-sorted matches in one pass.
///
/// A candidate is dropped if an accepted rule excludes it. Accepting a
/// candidate removes every accepted rule the candidate excludes.
#[must_use]
pub fn filter_exclusions<'r>(sorted: Vec<&'r Rule>) -> Vec<&'r Rule> {
    let mut accepted: Vec<&Rule> = Vec::with_capacity(sorted.len());

    for candidate in sorted {
        if accepted.iter().any(|rule| rule.excludes(&candidate.term)) {
            tracing::debug!(term = %candidate.term, "Dropped by exclusion");
            continue;
        }
        accepted.retain(|rule| !candidate.excludes(&rule.term));
        accepted.push(candidate);
    }

    accepted
}
