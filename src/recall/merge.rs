//! Rank fusion across the lexical and semantic result sets
//!
//! The two sources score on incompatible scales: bm25 where lower is better,
//! cosine where higher is better. Lexical relevance is squashed onto `[0, 1]`
//! so one ordering covers both, then hits are deduplicated by document id
//! with the better score winning.

use crate::recall::SemanticHit;
use crate::storage::LexicalHit;
use crate::tags::ProjectTagClassifier;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Which side of the search produced (or co-produced) a hit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HitSource {
    Lexical,
    Semantic,
}

/// One fused, deduplicated result
#[derive(Debug, Clone, Serialize)]
pub struct MergedHit {
    pub id: String,
    pub conversation_id: Option<String>,
    pub author_role: Option<String>,
    pub created_at: Option<f64>,
    /// Best normalized score across contributing sources, in `[0, 1]`
    pub score: f32,
    pub sources: Vec<HitSource>,
    pub preview: String,
    /// Project tags detected on any contributing source's text, in detection order
    pub tags: Vec<String>,
}

/// Map a bm25-style relevance (lower = better) onto `[0, 1]`.
///
/// Raw 0 maps to 1.0 and larger values decay toward 0. Negative raw values
/// clamp to 0 first, so a bm25 implementation that reports negated scores
/// still lands inside the unit interval.
pub fn normalize_relevance(raw: f64) -> f32 {
    (1.0 / (1.0 + raw.max(0.0))) as f32
}

/// Round to four decimals; scores are rounded once, on entry into the map
pub fn round_score(score: f32) -> f32 {
    (score * 10_000.0).round() / 10_000.0
}

/// Fuse both result sets into one ranked, deduplicated sequence.
///
/// Tag filtering runs per source before fusion: a document enters via
/// whichever source's text carries the requested tag, and is not re-checked
/// against the union afterwards. The lexical side classifies its snippet,
/// the semantic side its (longer) text, so the two sides can legitimately
/// disagree about the same document.
pub fn merge(
    lexical: Vec<LexicalHit>,
    semantic: Vec<SemanticHit>,
    project_tag: Option<&str>,
    classifier: &ProjectTagClassifier,
) -> Vec<MergedHit> {
    let mut map = MergeMap::default();

    for hit in lexical {
        let tags = classifier.detect(&hit.snippet);
        if !passes_tag_filter(project_tag, &tags) {
            continue;
        }
        map.insert_lexical(hit, tags);
    }

    for hit in semantic {
        let tags = classifier.detect(&hit.text);
        if !passes_tag_filter(project_tag, &tags) {
            continue;
        }
        map.absorb_semantic(hit, tags);
    }

    let mut hits = map.into_hits();

    // Stable sort: equal score and timestamp keep their arrival order.
    hits.sort_by(|a, b| {
        match b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal) {
            Ordering::Equal => {
                let a_ts = a.created_at.unwrap_or(f64::NEG_INFINITY);
                let b_ts = b.created_at.unwrap_or(f64::NEG_INFINITY);
                b_ts.partial_cmp(&a_ts).unwrap_or(Ordering::Equal)
            }
            unequal => unequal,
        }
    });

    hits
}

fn passes_tag_filter(project_tag: Option<&str>, detected: &[String]) -> bool {
    match project_tag {
        Some(tag) => detected.iter().any(|t| t == tag),
        None => true,
    }
}

/// Insertion-ordered map from document id to its merged hit.
///
/// Backed by a vec so iteration order is insertion order; the final stable
/// sort inherits that order as its implicit last tie-break.
#[derive(Debug, Default)]
struct MergeMap {
    index: HashMap<String, usize>,
    hits: Vec<MergedHit>,
}

impl MergeMap {
    /// Insert a lexical hit; a repeated id overwrites in place.
    fn insert_lexical(&mut self, hit: LexicalHit, tags: Vec<String>) {
        let merged = MergedHit {
            id: hit.id,
            conversation_id: hit.conversation_id,
            author_role: hit.author_role,
            created_at: hit.created_at,
            score: round_score(normalize_relevance(hit.raw_relevance)),
            sources: vec![HitSource::Lexical],
            preview: hit.snippet,
            tags,
        };

        match self.index.get(&merged.id) {
            Some(&slot) => self.hits[slot] = merged,
            None => {
                self.index.insert(merged.id.clone(), self.hits.len());
                self.hits.push(merged);
            }
        }
    }

    /// Fold a semantic hit into the map.
    ///
    /// On an id already present: the score keeps whichever side is higher,
    /// the preview is replaced only when the semantic text is strictly
    /// longer, and newly detected tags are unioned in. Identity fields from
    /// the first insertion are kept as-is.
    fn absorb_semantic(&mut self, hit: SemanticHit, tags: Vec<String>) {
        let score = round_score(hit.similarity);

        match self.index.get(&hit.id) {
            Some(&slot) => {
                let merged = &mut self.hits[slot];
                merged.score = merged.score.max(score);
                if !merged.sources.contains(&HitSource::Semantic) {
                    merged.sources.push(HitSource::Semantic);
                }
                if hit.text.chars().count() > merged.preview.chars().count() {
                    merged.preview = hit.text;
                }
                for tag in tags {
                    if !merged.tags.contains(&tag) {
                        merged.tags.push(tag);
                    }
                }
            }
            None => {
                self.index.insert(hit.id.clone(), self.hits.len());
                self.hits.push(MergedHit {
                    id: hit.id,
                    conversation_id: hit.conversation_id,
                    author_role: hit.author_role,
                    created_at: hit.created_at,
                    score,
                    sources: vec![HitSource::Semantic],
                    preview: hit.text,
                    tags,
                });
            }
        }
    }

    fn into_hits(self) -> Vec<MergedHit> {
        self.hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::TagRule;

    fn lexical(id: &str, raw: f64, ts: Option<f64>, snippet: &str) -> LexicalHit {
        LexicalHit {
            id: id.to_string(),
            conversation_id: Some("c1".to_string()),
            author_role: Some("user".to_string()),
            created_at: ts,
            raw_relevance: raw,
            snippet: snippet.to_string(),
        }
    }

    fn semantic(id: &str, similarity: f32, ts: Option<f64>, text: &str) -> SemanticHit {
        SemanticHit {
            id: id.to_string(),
            conversation_id: Some("c1".to_string()),
            author_role: Some("assistant".to_string()),
            created_at: ts,
            similarity,
            text: text.to_string(),
        }
    }

    fn tagger(tag: &str, pattern: &str) -> ProjectTagClassifier {
        ProjectTagClassifier::from_rules(vec![TagRule {
            tag: tag.to_string(),
            patterns: vec![pattern.to_string()],
        }])
    }

    #[test]
    fn test_normalize_relevance_shape() {
        assert_eq!(normalize_relevance(0.0), 1.0);
        assert_eq!(round_score(normalize_relevance(0.5)), 0.6667);
        assert_eq!(round_score(normalize_relevance(2.0)), 0.3333);
        // Negative raw clamps instead of overshooting past 1.
        assert_eq!(normalize_relevance(-3.0), 1.0);
        // Monotonic decreasing over the positive range.
        assert!(normalize_relevance(1.0) > normalize_relevance(4.0));
    }

    #[test]
    fn test_concrete_fusion_scenario() {
        let lexical_hits = vec![
            lexical("m1", 0.5, Some(10.0), "first match"),
            lexical("m2", 2.0, Some(20.0), "second match"),
        ];
        let semantic_hits = vec![
            semantic("m2", 0.9, Some(20.0), "second match, longer rendition"),
            semantic("m3", 0.4, Some(30.0), "third, semantic only"),
        ];

        let merged = merge(
            lexical_hits,
            semantic_hits,
            None,
            &ProjectTagClassifier::empty(),
        );

        let ids: Vec<&str> = merged.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["m2", "m1", "m3"]);

        assert_eq!(merged[0].score, 0.9);
        assert_eq!(
            merged[0].sources,
            vec![HitSource::Lexical, HitSource::Semantic]
        );
        assert_eq!(merged[0].preview, "second match, longer rendition");

        assert_eq!(merged[1].score, 0.6667);
        assert_eq!(merged[1].sources, vec![HitSource::Lexical]);

        assert_eq!(merged[2].score, 0.4);
        assert_eq!(merged[2].sources, vec![HitSource::Semantic]);
    }

    #[test]
    fn test_each_id_appears_once() {
        let merged = merge(
            vec![
                lexical("m1", 0.5, Some(1.0), "first"),
                lexical("m1", 0.7, Some(1.0), "repeated"),
            ],
            vec![
                semantic("m1", 0.2, Some(1.0), "again"),
                semantic("m1", 0.3, Some(1.0), "and again"),
            ],
            None,
            &ProjectTagClassifier::empty(),
        );
        assert_eq!(merged.len(), 1);
        // Repeated lexical id overwrote, then both semantic scores folded in.
        assert_eq!(merged[0].score, round_score(normalize_relevance(0.7)));
    }

    #[test]
    fn test_score_is_max_of_sources() {
        let merged = merge(
            vec![lexical("m1", 0.5, Some(1.0), "strong lexical")],
            vec![semantic("m1", 0.2, Some(1.0), "weak semantic")],
            None,
            &ProjectTagClassifier::empty(),
        );
        assert_eq!(merged[0].score, 0.6667);
        assert_eq!(
            merged[0].sources,
            vec![HitSource::Lexical, HitSource::Semantic]
        );
        assert!(merged.iter().all(|h| (0.0..=1.0).contains(&h.score)));
    }

    #[test]
    fn test_preview_replaced_only_when_strictly_longer() {
        let merged = merge(
            vec![lexical("m1", 0.5, Some(1.0), "snippet text")],
            vec![semantic("m1", 0.9, Some(1.0), "same length")],
            None,
            &ProjectTagClassifier::empty(),
        );
        assert_eq!(merged[0].preview, "snippet text");

        let merged = merge(
            vec![lexical("m1", 0.5, Some(1.0), "snippet text")],
            vec![semantic("m1", 0.9, Some(1.0), "a noticeably longer body")],
            None,
            &ProjectTagClassifier::empty(),
        );
        assert_eq!(merged[0].preview, "a noticeably longer body");
    }

    #[test]
    fn test_tag_filter_applies_per_source() {
        let classifier = tagger("atlas", "atlas");

        // The snippet misses the tag but the semantic text carries it: the
        // document still enters, via the semantic side alone.
        let merged = merge(
            vec![lexical("m1", 0.1, Some(1.0), "no marker here")],
            vec![semantic("m1", 0.4, Some(1.0), "notes on the Atlas rollout")],
            Some("atlas"),
            &classifier,
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].sources, vec![HitSource::Semantic]);
        assert_eq!(merged[0].tags, vec!["atlas"]);

        // Neither side carries the tag: nothing survives.
        let merged = merge(
            vec![lexical("m1", 0.1, Some(1.0), "no marker here")],
            vec![semantic("m2", 0.4, Some(1.0), "also unrelated")],
            Some("atlas"),
            &classifier,
        );
        assert!(merged.is_empty());
    }

    #[test]
    fn test_tags_unioned_across_sources() {
        let classifier = ProjectTagClassifier::from_rules(vec![
            TagRule {
                tag: "atlas".to_string(),
                patterns: vec!["atlas".to_string()],
            },
            TagRule {
                tag: "billing".to_string(),
                patterns: vec!["invoice".to_string()],
            },
        ]);

        let merged = merge(
            vec![lexical("m1", 0.5, Some(1.0), "atlas status check")],
            vec![semantic(
                "m1",
                0.3,
                Some(1.0),
                "atlas invoice reconciliation thread",
            )],
            None,
            &classifier,
        );
        assert_eq!(merged[0].tags, vec!["atlas", "billing"]);
    }

    #[test]
    fn test_equal_scores_break_by_recency() {
        let merged = merge(
            vec![
                lexical("older", 1.0, Some(100.0), "same score, older"),
                lexical("newer", 1.0, Some(200.0), "same score, newer"),
            ],
            Vec::new(),
            None,
            &ProjectTagClassifier::empty(),
        );
        let ids: Vec<&str> = merged.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["newer", "older"]);
    }

    #[test]
    fn test_missing_timestamp_sorts_last_among_equal_scores() {
        let merged = merge(
            vec![
                lexical("unstamped", 1.0, None, "no timestamp"),
                lexical("stamped", 1.0, Some(5.0), "has a timestamp"),
            ],
            Vec::new(),
            None,
            &ProjectTagClassifier::empty(),
        );
        let ids: Vec<&str> = merged.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["stamped", "unstamped"]);
    }

    #[test]
    fn test_full_ties_keep_arrival_order() {
        let merged = merge(
            vec![
                lexical("first", 1.0, Some(50.0), "tied"),
                lexical("second", 1.0, Some(50.0), "tied"),
            ],
            Vec::new(),
            None,
            &ProjectTagClassifier::empty(),
        );
        let ids: Vec<&str> = merged.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second"]);
    }

    #[test]
    fn test_semantic_only_ids_keep_their_metadata() {
        let merged = merge(
            Vec::new(),
            vec![semantic("m9", 0.7, Some(42.0), "semantic only entry")],
            None,
            &ProjectTagClassifier::empty(),
        );
        assert_eq!(merged[0].author_role.as_deref(), Some("assistant"));
        assert_eq!(merged[0].created_at, Some(42.0));
        assert_eq!(merged[0].score, 0.7);
    }
}
