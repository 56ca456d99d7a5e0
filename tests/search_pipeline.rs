//! End-to-end recall tests over real temporary stores
//!
//! The embedding provider is stubbed with fixed direction vectors so every
//! run is deterministic and needs no network.

use async_trait::async_trait;
use hindsight::config::{SearchConfig, SnippetConfig};
use hindsight::embedding::{EmbeddingError, EmbeddingProvider};
use hindsight::error::HindsightError;
use hindsight::recall::{
    AuthorRole, GroupingOptions, HitSource, RecallEngine, SearchRequest, SearchResults,
};
use hindsight::storage::{ArchiveStore, DocMeta, Message, VectorStore};
use hindsight::tags::{ProjectTagClassifier, TagRule};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Maps texts onto fixed directions: deployment talk along x, billing along y
struct StubProvider;

#[async_trait]
impl EmbeddingProvider for StubProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(stub_vector(text))
    }

    fn model_name(&self) -> &str {
        "stub"
    }
}

/// Always fails, as an unreachable endpoint would
struct FailingProvider;

#[async_trait]
impl EmbeddingProvider for FailingProvider {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::RequestError(
            "connection refused".to_string(),
        ))
    }

    fn model_name(&self) -> &str {
        "unreachable"
    }
}

/// Takes far longer than any timeout a test supplies
struct SlowProvider;

#[async_trait]
impl EmbeddingProvider for SlowProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(stub_vector(text))
    }

    fn model_name(&self) -> &str {
        "slow"
    }
}

fn stub_vector(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    if lower.contains("deploy") {
        vec![1.0, 0.0]
    } else if lower.contains("invoice") {
        vec![0.0, 1.0]
    } else {
        vec![0.7, 0.7]
    }
}

/// Messages for the archive and documents for the vector store.
///
/// `m1` exists in both stores under the same id to exercise deduplication;
/// `d-sem` and `d-billing` are embedded only; `d-short` is below every
/// realistic minimum length.
fn seed_stores(dir: &TempDir) -> anyhow::Result<()> {
    let archive = ArchiveStore::open(&dir.path().join("archive.sqlite"), SnippetConfig::default())?;
    let messages = [
        (
            "m1",
            "c-deploy",
            "user",
            1000.0,
            "planning the next deploy of the atlas service before the weekend freeze",
        ),
        (
            "m2",
            "c-deploy",
            "assistant",
            1100.0,
            "deploy checklist reviewed and the rollback steps are in the runbook",
        ),
        (
            "m4",
            "c-deploy",
            "tool",
            1200.0,
            "pipeline log: deploy job 8841 finished without warnings",
        ),
        (
            "m3",
            "c-billing",
            "user",
            2000.0,
            "february invoice reconciliation is still pending on the vendor side",
        ),
    ];
    for (id, convo, role, ts, text) in messages {
        archive.insert_message(&Message {
            id: id.to_string(),
            conversation_id: Some(convo.to_string()),
            author_role: Some(role.to_string()),
            created_at: Some(ts),
            text: text.to_string(),
        })?;
    }

    let vectors = VectorStore::open(&dir.path().join("semantic.sqlite"))?;
    let documents: [(&str, &str, &str, f64, &str, [f32; 2]); 4] = [
        (
            "m1",
            "c-deploy",
            "user",
            1000.0,
            "planning the next deploy of the atlas service, with the database migration and cache warmup",
            [1.0, 0.0],
        ),
        (
            "d-sem",
            "c-deploy",
            "assistant",
            1300.0,
            "retrospective notes on the last atlas deploy, what went wrong and what we keep doing",
            [0.9, 0.1],
        ),
        (
            "d-billing",
            "c-billing",
            "user",
            2100.0,
            "invoice totals for february are waiting on the vendor csv export",
            [0.0, 1.0],
        ),
        ("d-short", "c-deploy", "user", 1400.0, "too brief", [1.0, 0.0]),
    ];
    for (id, convo, role, ts, text, vector) in documents {
        vectors.insert_document(
            id,
            "chat",
            text,
            &DocMeta {
                conversation_id: Some(convo.to_string()),
                author_role: Some(role.to_string()),
                created_at: Some(ts),
            },
            &vector,
        )?;
    }

    Ok(())
}

fn search_config() -> SearchConfig {
    SearchConfig {
        // Fixture texts are realistic but short; the default floor of 120
        // characters has its own dedicated test below.
        min_text_length: 10,
        ..SearchConfig::default()
    }
}

fn build_engine(
    dir: &TempDir,
    provider: Arc<dyn EmbeddingProvider>,
    classifier: ProjectTagClassifier,
    config: SearchConfig,
) -> anyhow::Result<RecallEngine> {
    let archive = Arc::new(ArchiveStore::open(
        &dir.path().join("archive.sqlite"),
        config.snippet.clone(),
    )?);
    let vectors = Arc::new(VectorStore::open(&dir.path().join("semantic.sqlite"))?);

    Ok(RecallEngine::new(
        archive,
        vectors,
        provider,
        Arc::new(classifier),
        config,
        Duration::from_secs(30),
    ))
}

fn flat_hits(results: SearchResults) -> Vec<hindsight::recall::MergedHit> {
    match results {
        SearchResults::Hits(hits) => hits,
        SearchResults::Grouped(_) => panic!("expected flat results"),
    }
}

#[tokio::test]
async fn test_fused_search_merges_both_sources() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    seed_stores(&dir)?;
    let engine = build_engine(
        &dir,
        Arc::new(StubProvider),
        ProjectTagClassifier::empty(),
        search_config(),
    )?;

    let outcome = engine.search(&SearchRequest::new("deploy")).await?;

    assert_eq!(outcome.counts.lexical, 3);
    // d-short falls below the length floor; the other three documents score.
    assert_eq!(outcome.counts.semantic, 3);
    assert_eq!(outcome.counts.merged, 5);

    let hits = flat_hits(outcome.results);
    let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
    // Index-side bm25 is negative for every match, so each lexical hit
    // normalizes to 1.0 and the three tie-break by recency; the two
    // semantic-only documents trail on their cosine scores.
    assert_eq!(ids, vec!["m4", "m2", "m1", "d-sem", "d-billing"]);

    let m1 = hits.iter().find(|h| h.id == "m1").unwrap();
    assert_eq!(m1.sources, vec![HitSource::Lexical, HitSource::Semantic]);
    assert_eq!(m1.score, 1.0);
    // The embedded rendition is longer than the snippet and replaces it.
    assert!(m1.preview.contains("cache warmup"));

    let d_sem = hits.iter().find(|h| h.id == "d-sem").unwrap();
    assert_eq!(d_sem.sources, vec![HitSource::Semantic]);
    assert_eq!(d_sem.score, 0.9939);

    for pair in hits.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }

    Ok(())
}

#[tokio::test]
async fn test_role_and_time_filters_apply_to_both_legs() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    seed_stores(&dir)?;
    let engine = build_engine(
        &dir,
        Arc::new(StubProvider),
        ProjectTagClassifier::empty(),
        search_config(),
    )?;

    let request = SearchRequest {
        role: Some(AuthorRole::User),
        since: Some("950".to_string()),
        until: Some("1050".to_string()),
        ..SearchRequest::new("deploy")
    };
    let outcome = engine.search(&request).await?;

    assert_eq!(outcome.counts.lexical, 1);
    assert_eq!(outcome.counts.semantic, 1);
    assert_eq!(outcome.counts.merged, 1);
    assert_eq!(outcome.since, Some(950.0));
    assert_eq!(outcome.until, Some(1050.0));

    let hits = flat_hits(outcome.results);
    assert_eq!(hits[0].id, "m1");
    assert_eq!(
        hits[0].sources,
        vec![HitSource::Lexical, HitSource::Semantic]
    );

    Ok(())
}

#[tokio::test]
async fn test_unparseable_bound_widens_instead_of_failing() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    seed_stores(&dir)?;
    let engine = build_engine(
        &dir,
        Arc::new(StubProvider),
        ProjectTagClassifier::empty(),
        search_config(),
    )?;

    let request = SearchRequest {
        since: Some("not a date".to_string()),
        ..SearchRequest::new("deploy")
    };
    let outcome = engine.search(&request).await?;

    assert_eq!(outcome.since, None);
    assert_eq!(outcome.counts.lexical, 3);

    Ok(())
}

#[tokio::test]
async fn test_phrase_query_narrows_lexical_leg() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    seed_stores(&dir)?;
    let engine = build_engine(
        &dir,
        Arc::new(StubProvider),
        ProjectTagClassifier::empty(),
        search_config(),
    )?;

    // Only m2 contains the words adjacently; m1 and m4 mention "deploy"
    // elsewhere in the sentence.
    let outcome = engine
        .search(&SearchRequest::new("deploy checklist"))
        .await?;
    assert_eq!(outcome.counts.lexical, 1);

    let hits = flat_hits(outcome.results);
    assert!(hits.iter().any(|h| h.id == "m2"));

    Ok(())
}

#[tokio::test]
async fn test_project_tag_filter() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    seed_stores(&dir)?;
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
    let engine = build_engine(&dir, Arc::new(StubProvider), classifier, search_config())?;

    let request = SearchRequest {
        project: Some("billing".to_string()),
        ..SearchRequest::new("invoice")
    };
    let outcome = engine.search(&request).await?;

    let hits = flat_hits(outcome.results);
    let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["d-billing", "m3"]);
    for hit in &hits {
        assert!(hit.tags.iter().any(|t| t == "billing"));
    }

    Ok(())
}

#[tokio::test]
async fn test_grouped_results_respect_caps() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    seed_stores(&dir)?;
    let engine = build_engine(
        &dir,
        Arc::new(StubProvider),
        ProjectTagClassifier::empty(),
        search_config(),
    )?;

    let request = SearchRequest {
        grouping: Some(GroupingOptions {
            max_conversations: Some(1),
            hits_per_conversation: Some(2),
        }),
        ..SearchRequest::new("deploy")
    };
    let outcome = engine.search(&request).await?;

    let groups = match outcome.results {
        SearchResults::Grouped(groups) => groups,
        SearchResults::Hits(_) => panic!("expected grouped results"),
    };

    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].conversation_id, "c-deploy");
    assert_eq!(groups[0].hits.len(), 2);
    let ids: Vec<&str> = groups[0].hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["m4", "m2"]);

    Ok(())
}

#[tokio::test]
async fn test_flat_top_cap() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    seed_stores(&dir)?;
    let engine = build_engine(
        &dir,
        Arc::new(StubProvider),
        ProjectTagClassifier::empty(),
        search_config(),
    )?;

    let request = SearchRequest {
        top: Some(2),
        ..SearchRequest::new("deploy")
    };
    let outcome = engine.search(&request).await?;

    // Counts report what each stage saw before the cap.
    assert_eq!(outcome.counts.merged, 5);
    let hits = flat_hits(outcome.results);
    let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["m4", "m2"]);

    Ok(())
}

#[tokio::test]
async fn test_default_length_floor_empties_semantic_leg() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    seed_stores(&dir)?;
    // Every seeded document is shorter than the default 120-character floor.
    let engine = build_engine(
        &dir,
        Arc::new(StubProvider),
        ProjectTagClassifier::empty(),
        SearchConfig::default(),
    )?;

    let outcome = engine.search(&SearchRequest::new("deploy")).await?;

    assert_eq!(outcome.counts.semantic, 0);
    assert_eq!(outcome.counts.lexical, 3);
    let hits = flat_hits(outcome.results);
    assert!(hits.iter().all(|h| h.sources == vec![HitSource::Lexical]));

    Ok(())
}

#[tokio::test]
async fn test_provider_failure_fails_whole_query() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    seed_stores(&dir)?;
    let engine = build_engine(
        &dir,
        Arc::new(FailingProvider),
        ProjectTagClassifier::empty(),
        search_config(),
    )?;

    // The lexical leg alone would have answered this query; it must not.
    match engine.search(&SearchRequest::new("deploy")).await {
        Err(HindsightError::Provider { message }) => {
            assert!(message.contains("connection refused"));
        }
        other => panic!("expected provider failure, got {:?}", other),
    }

    Ok(())
}

#[tokio::test]
async fn test_provider_timeout_fails_whole_query() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    seed_stores(&dir)?;
    let engine = build_engine(
        &dir,
        Arc::new(SlowProvider),
        ProjectTagClassifier::empty(),
        search_config(),
    )?;

    let request = SearchRequest {
        timeout: Some(Duration::from_millis(50)),
        ..SearchRequest::new("deploy")
    };
    match engine.search(&request).await {
        Err(HindsightError::ProviderTimeout { .. }) => {}
        other => panic!("expected provider timeout, got {:?}", other),
    }

    Ok(())
}

#[tokio::test]
async fn test_blank_query_rejected() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    seed_stores(&dir)?;
    let engine = build_engine(
        &dir,
        Arc::new(StubProvider),
        ProjectTagClassifier::empty(),
        search_config(),
    )?;

    for query in ["", "   "] {
        match engine.search(&SearchRequest::new(query)).await {
            Err(HindsightError::InvalidQuery(_)) => {}
            other => panic!("expected invalid query, got {:?}", other),
        }
    }

    Ok(())
}
