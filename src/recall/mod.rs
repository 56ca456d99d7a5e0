//! Query-time recall pipeline
//!
//! Everything between a raw query string and a ranked answer: time-bound
//! parsing, the lexical and semantic search legs, rank fusion, and optional
//! conversation grouping. Nothing here holds state across queries; each call
//! is a fresh request to response transformation over the backing stores.

mod engine;
mod grouping;
mod merge;
mod semantic;
mod timebounds;

pub use engine::RecallEngine;
pub use grouping::{group_by_conversation, ConversationGroup, UNKNOWN_CONVERSATION};
pub use merge::{merge, normalize_relevance, round_score, HitSource, MergedHit};
pub use semantic::{cosine_similarity, rank_documents, ScanOptions, SemanticHit};
pub use timebounds::parse_time_bound;

use crate::error::HindsightError;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Who wrote a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorRole {
    User,
    Assistant,
    Tool,
    System,
}

impl AuthorRole {
    /// The wire form stored in both backing stores
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthorRole::User => "user",
            AuthorRole::Assistant => "assistant",
            AuthorRole::Tool => "tool",
            AuthorRole::System => "system",
        }
    }
}

impl fmt::Display for AuthorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthorRole {
    type Err = HindsightError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Ok(AuthorRole::User),
            "assistant" => Ok(AuthorRole::Assistant),
            "tool" => Ok(AuthorRole::Tool),
            "system" => Ok(AuthorRole::System),
            other => Err(HindsightError::InvalidQuery(format!(
                "unknown author role '{other}'"
            ))),
        }
    }
}

/// One search invocation; `None` fields fall back to configured defaults
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    /// Query text
    pub query: String,

    /// Optional author role filter
    pub role: Option<AuthorRole>,

    /// Optional lower time bound, in any form [`parse_time_bound`] accepts
    pub since: Option<String>,

    /// Optional upper time bound
    pub until: Option<String>,

    /// Optional project tag filter
    pub project: Option<String>,

    /// Candidate cap for the lexical leg
    pub lexical_limit: Option<usize>,

    /// Candidate cap for the semantic leg
    pub semantic_limit: Option<usize>,

    /// Flat result cap after fusion
    pub top: Option<usize>,

    /// When set, results come back grouped by conversation
    pub grouping: Option<GroupingOptions>,

    /// Overrides the configured embedding-call timeout
    pub timeout: Option<Duration>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }
}

/// Grouping caps; `None` fields fall back to configured defaults
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupingOptions {
    pub max_conversations: Option<usize>,
    pub hits_per_conversation: Option<usize>,
}

/// How many hits each stage saw
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SourceCounts {
    pub lexical: usize,
    pub semantic: usize,
    pub merged: usize,
}

/// Result payload, flat or grouped
#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchResults {
    Hits(Vec<MergedHit>),
    Grouped(Vec<ConversationGroup>),
}

/// Everything one query returns
#[derive(Debug, Serialize)]
pub struct SearchOutcome {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Applied lower bound in epoch seconds, if one parsed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<f64>,
    /// Applied upper bound in epoch seconds, if one parsed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    pub counts: SourceCounts,
    /// Wall time for the whole query, rounded to milliseconds
    pub seconds: f64,
    #[serde(flatten)]
    pub results: SearchResults,
}
