//! Embedding vector store
//!
//! The semantic side of recall: a `vecs` table mapping document id to a raw
//! little-endian f32 blob, joined with a `docs` sidecar carrying the source
//! label, text, and conversation metadata as JSON. The external backfill job
//! is the only production writer; queries load the whole corpus and score it
//! in memory.

use crate::error::{HindsightError, Result, StoreKind};
use crate::storage::DbPool;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use serde_json::Value;
use std::path::Path;

/// Conversation metadata parsed from the sidecar JSON
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocMeta {
    pub conversation_id: Option<String>,
    pub author_role: Option<String>,
    pub created_at: Option<f64>,
}

/// One embedded document joined with its vector
#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub id: String,
    pub source: Option<String>,
    pub text: Option<String>,
    pub meta: DocMeta,
    pub vector: Vec<f32>,
}

/// Vector store statistics
#[derive(Debug)]
pub struct SemanticStats {
    pub document_count: usize,
    pub vector_count: usize,
}

/// Pooled handle onto the vector database
pub struct VectorStore {
    pool: DbPool,
}

impl VectorStore {
    /// Open (and if necessary create) the vector store at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| HindsightError::Io {
                source: e,
                context: format!("Failed to create vector store directory: {:?}", parent),
            })?;
        }

        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA busy_timeout = 5000;
                ",
            )
        });

        let pool = Pool::builder()
            .max_size(16)
            .build(manager)
            .map_err(|e| HindsightError::StoreUnavailable {
                store: StoreKind::Semantic,
                message: format!("Failed to create connection pool: {}", e),
            })?;

        let store = Self { pool };
        store.migrate()?;

        Ok(store)
    }

    fn conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| HindsightError::StoreUnavailable {
                store: StoreKind::Semantic,
                message: format!("Failed to get connection: {}", e),
            })
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )
        .map_err(store_err)?;

        let current_version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM _migrations",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;

            if version > current_version {
                tracing::info!("Applying vector store migration {}", version);
                conn.execute_batch(migration).map_err(store_err)?;
                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )
                .map_err(store_err)?;
            }
        }

        Ok(())
    }

    /// Load every stored document with its unpacked vector.
    ///
    /// The whole corpus is scored per query; at the tens-of-thousands scale
    /// this store is built for, one full scan is cheaper than maintaining
    /// query-time index structures.
    pub fn load_all(&self) -> Result<Vec<StoredDocument>> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(
                "SELECT v.id, v.v, d.source, d.text, d.meta_json
                 FROM vecs v JOIN docs d ON d.id = v.id",
            )
            .map_err(store_err)?;
        let mut rows = stmt.query([]).map_err(store_err)?;

        let mut documents = Vec::new();
        while let Some(row) = rows.next().map_err(store_err)? {
            let id: String = row.get(0).map_err(store_err)?;
            let blob: Vec<u8> = row.get(1).map_err(store_err)?;
            let vector = unpack_f32(&blob).ok_or_else(|| HindsightError::StoreCorrupt {
                store: StoreKind::Semantic,
                message: format!(
                    "vector blob for '{}' is {} bytes, not a multiple of 4",
                    id,
                    blob.len()
                ),
            })?;
            let source: Option<String> = row.get(2).map_err(store_err)?;
            let text: Option<String> = row.get(3).map_err(store_err)?;
            let meta_json: Option<String> = row.get(4).map_err(store_err)?;
            let meta = parse_meta(&id, meta_json.as_deref())?;

            documents.push(StoredDocument {
                id,
                source,
                text,
                meta,
                vector,
            });
        }

        Ok(documents)
    }

    /// Insert or replace one document and its vector.
    ///
    /// Backfill-side helper; the query path never writes.
    pub fn insert_document(
        &self,
        id: &str,
        source: &str,
        text: &str,
        meta: &DocMeta,
        vector: &[f32],
    ) -> Result<()> {
        let meta_json = serde_json::to_string(&serde_json::json!({
            "conversation_id": meta.conversation_id,
            "author_role": meta.author_role,
            "created_at": meta.created_at,
        }))
        .map_err(|e| HindsightError::Json {
            source: e,
            context: format!("Failed to serialize metadata for '{}'", id),
        })?;

        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(store_err)?;

        tx.execute(
            "INSERT OR REPLACE INTO docs (id, source, text, meta_json) VALUES (?1, ?2, ?3, ?4)",
            params![id, source, text, meta_json],
        )
        .map_err(store_err)?;

        tx.execute(
            "INSERT OR REPLACE INTO vecs (id, dim, v) VALUES (?1, ?2, ?3)",
            params![id, vector.len() as i64, pack_f32(vector)],
        )
        .map_err(store_err)?;

        tx.commit().map_err(store_err)
    }

    /// Get vector store statistics
    pub fn stats(&self) -> Result<SemanticStats> {
        let conn = self.conn()?;

        let document_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM docs", [], |row| row.get(0))
            .map_err(store_err)?;

        let vector_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM vecs", [], |row| row.get(0))
            .map_err(store_err)?;

        Ok(SemanticStats {
            document_count: document_count as usize,
            vector_count: vector_count as usize,
        })
    }
}

fn store_err(e: rusqlite::Error) -> HindsightError {
    HindsightError::Store {
        store: StoreKind::Semantic,
        source: e,
    }
}

/// Pack a float vector as little-endian bytes
pub fn pack_f32(values: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(values.len() * 4);
    for value in values {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Unpack a little-endian byte blob into floats; None if the length is off
pub fn unpack_f32(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}

/// Parse the sidecar metadata JSON for one document.
///
/// NULL or empty metadata is an empty object; metadata that is present but
/// not valid JSON is store corruption and fails the query.
fn parse_meta(id: &str, meta_json: Option<&str>) -> Result<DocMeta> {
    let raw = match meta_json {
        Some(raw) if !raw.is_empty() => raw,
        _ => return Ok(DocMeta::default()),
    };

    let value: Value =
        serde_json::from_str(raw).map_err(|e| HindsightError::StoreCorrupt {
            store: StoreKind::Semantic,
            message: format!("meta_json for '{}' is not valid JSON: {}", id, e),
        })?;

    Ok(DocMeta {
        conversation_id: value
            .get("conversation_id")
            .and_then(Value::as_str)
            .map(str::to_string),
        author_role: value
            .get("author_role")
            .and_then(Value::as_str)
            .map(str::to_string),
        created_at: value.get("created_at").and_then(epoch_from_json),
    })
}

/// Coerce a JSON `created_at` (number or numeric string) to epoch seconds
fn epoch_from_json(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Vector store migrations
const MIGRATIONS: &[&str] = &[
    // Migration 1: document sidecar plus packed vectors
    r#"
    CREATE TABLE docs (
        id TEXT PRIMARY KEY,
        source TEXT,
        text TEXT,
        meta_json TEXT
    );

    CREATE INDEX idx_docs_source ON docs(source);

    CREATE TABLE vecs (
        id TEXT PRIMARY KEY,
        dim INTEGER,
        v BLOB
    );
    "#,
];
