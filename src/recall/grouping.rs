//! Conversation grouping over the merged result set
//!
//! Re-buckets flat hits by conversation and ranks the buckets, not the
//! individual hits, first. Pure and deterministic; callers decide how much
//! of the merged set to feed in.

use crate::recall::MergedHit;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Bucket for hits whose conversation id is absent or empty
pub const UNKNOWN_CONVERSATION: &str = "unknown";

/// One conversation and its best hits, score-descending
#[derive(Debug, Clone, Serialize)]
pub struct ConversationGroup {
    pub conversation_id: String,
    pub hits: Vec<MergedHit>,
}

/// Bucket hits by conversation, rank buckets by their single best score,
/// and cap both the bucket count and the hits kept per bucket.
///
/// Bucket ties keep first-appearance order, which for score-sorted input is
/// the order of each conversation's best hit.
pub fn group_by_conversation(
    hits: Vec<MergedHit>,
    max_conversations: usize,
    hits_per_conversation: usize,
) -> Vec<ConversationGroup> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<ConversationGroup> = Vec::new();

    for hit in hits {
        let key = hit
            .conversation_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .unwrap_or(UNKNOWN_CONVERSATION)
            .to_string();

        match index.get(&key) {
            Some(&slot) => groups[slot].hits.push(hit),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push(ConversationGroup {
                    conversation_id: key,
                    hits: vec![hit],
                });
            }
        }
    }

    groups.sort_by(|a, b| {
        bucket_best(b)
            .partial_cmp(&bucket_best(a))
            .unwrap_or(Ordering::Equal)
    });
    groups.truncate(max_conversations);

    for group in &mut groups {
        group
            .hits
            .sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        group.hits.truncate(hits_per_conversation);
    }

    groups
}

fn bucket_best(group: &ConversationGroup) -> f32 {
    group
        .hits
        .iter()
        .map(|hit| hit.score)
        .fold(f32::NEG_INFINITY, f32::max)
}
