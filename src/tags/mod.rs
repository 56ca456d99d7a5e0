//! Project tag classification
//!
//! Maps free text to zero or more project tags via an ordered list of
//! case-insensitive substring rules loaded from a JSON file. A missing or
//! malformed rule file degrades the classifier to a no-op instead of failing
//! the query; the [`RulesOrigin`] records which of the two happened so
//! callers can surface the degraded mode.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// One rule as written in the rule file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagRule {
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub patterns: Vec<String>,
}

/// Rule file structure: `{"projects": [{"tag": ..., "patterns": [...]}, ...]}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagRuleFile {
    #[serde(default)]
    pub projects: Vec<TagRule>,
}

/// Where the active rule set came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RulesOrigin {
    /// Rules were read from the given file
    Loaded(PathBuf),
    /// Rules were supplied directly, bypassing any file
    Inline,
    /// The file was absent or unusable; the classifier is a no-op
    Defaulted(DefaultedReason),
}

/// Why a rule file was replaced with the empty rule set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultedReason {
    MissingFile,
    UnreadableFile,
    InvalidJson,
}

impl fmt::Display for RulesOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RulesOrigin::Loaded(path) => write!(f, "loaded from {}", path.display()),
            RulesOrigin::Inline => write!(f, "supplied inline"),
            RulesOrigin::Defaulted(reason) => write!(f, "empty ({})", reason),
        }
    }
}

impl fmt::Display for DefaultedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultedReason::MissingFile => write!(f, "rule file missing"),
            DefaultedReason::UnreadableFile => write!(f, "rule file unreadable"),
            DefaultedReason::InvalidJson => write!(f, "rule file is not valid JSON"),
        }
    }
}

/// A usable rule: non-empty tag, patterns lowercased once at load
#[derive(Debug, Clone)]
pub struct TagMatcher {
    pub tag: String,
    pub patterns: Vec<String>,
}

/// Ordered substring classifier over chat text
#[derive(Debug, Clone)]
pub struct ProjectTagClassifier {
    rules: Vec<TagMatcher>,
    origin: RulesOrigin,
}

impl ProjectTagClassifier {
    /// Load rules from a JSON file; never fails, only degrades
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::defaulted(DefaultedReason::MissingFile);
        }

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => return Self::defaulted(DefaultedReason::UnreadableFile),
        };

        let file: TagRuleFile = match serde_json::from_str(&content) {
            Ok(file) => file,
            Err(_) => return Self::defaulted(DefaultedReason::InvalidJson),
        };

        Self {
            rules: compile_rules(file.projects),
            origin: RulesOrigin::Loaded(path.to_path_buf()),
        }
    }

    /// Build a classifier from rules already in memory
    pub fn from_rules(rules: Vec<TagRule>) -> Self {
        Self {
            rules: compile_rules(rules),
            origin: RulesOrigin::Inline,
        }
    }

    /// A classifier that never tags anything
    pub fn empty() -> Self {
        Self::from_rules(Vec::new())
    }

    fn defaulted(reason: DefaultedReason) -> Self {
        Self {
            rules: Vec::new(),
            origin: RulesOrigin::Defaulted(reason),
        }
    }

    /// Detect project tags in `text`.
    ///
    /// Rules are tested in file order; a rule's first matching pattern
    /// appends its tag and retires the rule for this text. Output is
    /// deduplicated and keeps insertion order.
    pub fn detect(&self, text: &str) -> Vec<String> {
        if self.rules.is_empty() {
            return Vec::new();
        }

        let haystack = text.to_lowercase();
        let mut tags: Vec<String> = Vec::new();
        for rule in &self.rules {
            for pattern in &rule.patterns {
                if haystack.contains(pattern.as_str()) {
                    if !tags.contains(&rule.tag) {
                        tags.push(rule.tag.clone());
                    }
                    break;
                }
            }
        }
        tags
    }

    pub fn origin(&self) -> &RulesOrigin {
        &self.origin
    }

    /// True when the configured rule file could not be used
    pub fn is_degraded(&self) -> bool {
        matches!(self.origin, RulesOrigin::Defaulted(_))
    }

    pub fn rules(&self) -> &[TagMatcher] {
        &self.rules
    }
}

/// Drop unusable entries, lowercase patterns for case-insensitive matching
fn compile_rules(raw: Vec<TagRule>) -> Vec<TagMatcher> {
    raw.into_iter()
        .filter_map(|rule| {
            if rule.tag.is_empty() {
                return None;
            }
            let patterns: Vec<String> = rule
                .patterns
                .iter()
                .filter(|p| !p.is_empty())
                .map(|p| p.to_lowercase())
                .collect();
            if patterns.is_empty() {
                return None;
            }
            Some(TagMatcher {
                tag: rule.tag,
                patterns,
            })
        })
        .collect()
}
