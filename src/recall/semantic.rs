//! In-memory semantic scoring over the embedded corpus
//!
//! Every stored vector is scored against the query vector on every call.
//! Exact brute force is the deliberate trade at the corpus sizes this engine
//! targets (tens of thousands of documents); an approximate index only pays
//! for itself well beyond that.

use crate::storage::StoredDocument;
use std::cmp::Ordering;

/// One cosine-scored document
#[derive(Debug, Clone)]
pub struct SemanticHit {
    pub id: String,
    pub conversation_id: Option<String>,
    pub author_role: Option<String>,
    pub created_at: Option<f64>,
    /// Cosine similarity in `[-1, 1]`
    pub similarity: f32,
    /// Document text, truncated to the preview cap
    pub text: String,
}

/// Knobs for one scan; defaults come from [`crate::config::SearchConfig`]
#[derive(Debug, Clone)]
pub struct ScanOptions<'a> {
    pub role: Option<&'a str>,
    pub since: Option<f64>,
    pub until: Option<f64>,
    /// Result cap after sorting
    pub top: usize,
    /// Documents with fewer characters than this are low-signal fragments
    pub min_text_length: usize,
    /// Hit text is cut at this many characters
    pub preview_max_chars: usize,
}

/// Score, filter, and rank the corpus against one query vector.
///
/// Filter order: text presence and length, then role, then time bounds. An
/// empty text is dropped even when the length floor is zero. A document with
/// no stored role fails any role filter; a document with no timestamp fails
/// any time bound, matching what the SQL predicates on the lexical side do
/// with NULL.
pub fn rank_documents(
    documents: &[StoredDocument],
    query_vector: &[f32],
    options: &ScanOptions,
) -> Vec<SemanticHit> {
    let mut hits = Vec::new();

    for document in documents {
        let Some(text) = document.text.as_deref() else {
            continue;
        };
        if text.is_empty() || text.chars().count() < options.min_text_length {
            continue;
        }

        if let Some(role) = options.role {
            if document.meta.author_role.as_deref().unwrap_or("") != role {
                continue;
            }
        }

        if !within_bounds(document.meta.created_at, options.since, options.until) {
            continue;
        }

        hits.push(SemanticHit {
            id: document.id.clone(),
            conversation_id: document.meta.conversation_id.clone(),
            author_role: document.meta.author_role.clone(),
            created_at: document.meta.created_at,
            similarity: cosine_similarity(query_vector, &document.vector),
            text: preview_of(text, options.preview_max_chars),
        });
    }

    hits.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
    });
    hits.truncate(options.top);

    hits
}

/// Cosine similarity `dot(a,b) / (‖a‖·‖b‖)`, or `0.0` when either norm is zero.
///
/// Dot product and both norms accumulate in one pass over the zipped prefix,
/// so vectors of unequal dimensionality score their common prefix.
/// Accumulation runs in f64 so thousands of small f32 terms do not lose
/// precision.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a.sqrt() * norm_b.sqrt())) as f32
}

fn within_bounds(created_at: Option<f64>, since: Option<f64>, until: Option<f64>) -> bool {
    if since.is_none() && until.is_none() {
        return true;
    }
    let Some(created_at) = created_at else {
        return false;
    };
    since.map_or(true, |s| created_at >= s) && until.map_or(true, |u| created_at <= u)
}

fn preview_of(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut preview: String = text.chars().take(max_chars).collect();
    preview.push('…');
    preview
}
