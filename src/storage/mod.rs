//! Storage layer for Hindsight
//!
//! Two SQLite stores behind connection pools: the conversation archive with
//! its full-text index, and the embedding vector store populated by the
//! external backfill job. Query-time access is read-only; the write helpers
//! exist for the import/backfill tooling and the test suite, which share the
//! schema definitions kept here.

pub mod archive;
pub mod vectors;

pub use archive::{ArchiveStats, ArchiveStore, LexicalHit, Message};
pub use vectors::{pack_f32, unpack_f32, DocMeta, SemanticStats, StoredDocument, VectorStore};

/// Database connection pool
pub type DbPool = r2d2::Pool<r2d2_sqlite::SqliteConnectionManager>;
