//! Hindsight - unified recall over archived conversations
//!
//! Combines exact full-text matching over a SQLite archive with embedding
//! cosine similarity over a vector store, fusing both result sets into one
//! deduplicated, ranked answer that can be filtered by author role, time
//! range, and project tag, and optionally grouped by conversation.

pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod recall;
pub mod storage;
pub mod tags;

pub use error::{HindsightError, Result};
