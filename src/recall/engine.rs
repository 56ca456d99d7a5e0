//! Query orchestration across both search legs

use crate::config::SearchConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{HindsightError, Result};
use crate::recall::{
    group_by_conversation, merge, parse_time_bound, rank_documents, ScanOptions, SearchOutcome,
    SearchRequest, SearchResults, SemanticHit, SourceCounts,
};
use crate::storage::{ArchiveStore, LexicalHit, VectorStore};
use crate::tags::ProjectTagClassifier;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Recall engine combining lexical and semantic search
///
/// Holds only read handles and per-query defaults; all state lives in the
/// backing stores, so one engine serves any number of concurrent queries.
pub struct RecallEngine {
    archive: Arc<ArchiveStore>,
    vectors: Arc<VectorStore>,
    provider: Arc<dyn EmbeddingProvider>,
    classifier: Arc<ProjectTagClassifier>,
    config: SearchConfig,
    embed_timeout: Duration,
}

impl RecallEngine {
    /// Create a new recall engine
    pub fn new(
        archive: Arc<ArchiveStore>,
        vectors: Arc<VectorStore>,
        provider: Arc<dyn EmbeddingProvider>,
        classifier: Arc<ProjectTagClassifier>,
        config: SearchConfig,
        embed_timeout: Duration,
    ) -> Self {
        Self {
            archive,
            vectors,
            provider,
            classifier,
            config,
            embed_timeout,
        }
    }

    /// Run one query end to end.
    ///
    /// A provider failure or timeout fails the whole query; there is no
    /// lexical-only fallback, so a lexical answer and a fused answer are
    /// never silently interchangeable.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchOutcome> {
        if request.query.trim().is_empty() {
            return Err(HindsightError::InvalidQuery(
                "query text cannot be empty".to_string(),
            ));
        }

        let started = Instant::now();

        let since = parse_bound("since", request.since.as_deref());
        let until = parse_bound("until", request.until.as_deref());
        let role = request.role.map(|r| r.as_str());

        let lexical_limit = request.lexical_limit.unwrap_or(self.config.lexical_limit);
        let semantic_limit = request.semantic_limit.unwrap_or(self.config.semantic_limit);

        // Step 1: both legs in parallel. Neither mutates anything, and the
        // lexical query runs while the embedding call is in flight.
        let (semantic, lexical) = tokio::join!(
            self.semantic_leg(
                &request.query,
                role,
                since,
                until,
                semantic_limit,
                request.timeout,
            ),
            self.lexical_leg(&request.query, role, since, until, lexical_limit),
        );
        let semantic = semantic?;
        let lexical = lexical?;

        let lexical_count = lexical.len();
        let semantic_count = semantic.len();

        // Step 2: fuse, deduplicate, rank.
        let merged = merge(
            lexical,
            semantic,
            request.project.as_deref(),
            &self.classifier,
        );
        let merged_count = merged.len();

        // Step 3: flat cap, or regroup by conversation.
        let top = request.top.unwrap_or(self.config.top);
        let results = match request.grouping {
            Some(grouping) => {
                let max_conversations = grouping
                    .max_conversations
                    .unwrap_or(self.config.max_conversations);
                let per_conversation = grouping
                    .hits_per_conversation
                    .unwrap_or(self.config.hits_per_conversation);
                // The grouper gets enough depth to fill every bucket even
                // when that exceeds the flat cap.
                let depth = top.max(max_conversations.saturating_mul(per_conversation));
                let mut pool = merged;
                pool.truncate(depth);
                SearchResults::Grouped(group_by_conversation(
                    pool,
                    max_conversations,
                    per_conversation,
                ))
            }
            None => {
                let mut flat = merged;
                flat.truncate(top);
                SearchResults::Hits(flat)
            }
        };

        let seconds = (started.elapsed().as_secs_f64() * 1000.0).round() / 1000.0;
        tracing::debug!(
            "query '{}': {} lexical, {} semantic, {} merged in {}s",
            request.query,
            lexical_count,
            semantic_count,
            merged_count,
            seconds
        );

        Ok(SearchOutcome {
            query: request.query.clone(),
            role: role.map(str::to_string),
            since,
            until,
            project: request.project.clone(),
            counts: SourceCounts {
                lexical: lexical_count,
                semantic: semantic_count,
                merged: merged_count,
            },
            seconds,
            results,
        })
    }

    /// Embed the query, then score the whole stored corpus
    async fn semantic_leg(
        &self,
        query: &str,
        role: Option<&str>,
        since: Option<f64>,
        until: Option<f64>,
        top: usize,
        timeout: Option<Duration>,
    ) -> Result<Vec<SemanticHit>> {
        let budget = timeout.unwrap_or(self.embed_timeout);
        let vector = match tokio::time::timeout(budget, self.provider.embed(query)).await {
            Ok(Ok(vector)) => vector,
            Ok(Err(e)) => {
                return Err(HindsightError::Provider {
                    message: e.to_string(),
                })
            }
            Err(_) => {
                return Err(HindsightError::ProviderTimeout {
                    seconds: budget.as_secs(),
                })
            }
        };

        let documents = self.vectors.load_all()?;
        tracing::debug!("scoring {} embedded documents", documents.len());

        Ok(rank_documents(
            &documents,
            &vector,
            &ScanOptions {
                role,
                since,
                until,
                top,
                min_text_length: self.config.min_text_length,
                preview_max_chars: self.config.preview_max_chars,
            },
        ))
    }

    /// Query the full-text index
    async fn lexical_leg(
        &self,
        query: &str,
        role: Option<&str>,
        since: Option<f64>,
        until: Option<f64>,
        limit: usize,
    ) -> Result<Vec<LexicalHit>> {
        self.archive.search(query, role, since, until, limit)
    }
}

/// Parse one bound, logging when supplied input is dropped as unparseable
fn parse_bound(side: &str, raw: Option<&str>) -> Option<f64> {
    let raw = raw?;
    let parsed = parse_time_bound(raw);
    if parsed.is_none() {
        tracing::warn!("Unparseable --{} value '{}', treating as unbounded", side, raw);
    }
    parsed
}
