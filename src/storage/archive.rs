//! Conversation archive and its full-text index
//!
//! The archive holds the canonical `messages` table plus `messages_fts`, an
//! FTS5 projection of the same five columns. Lexical search runs entirely
//! inside SQLite: match expression, role and time predicates, bm25 ordering
//! and snippet generation, so this module is also the lexical search adapter.

use crate::config::SnippetConfig;
use crate::error::{HindsightError, Result, StoreKind};
use crate::storage::DbPool;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::ValueRef;
use rusqlite::{params, ToSql};
use std::path::Path;

/// One row of the canonical archive
#[derive(Debug, Clone)]
pub struct Message {
    pub id: String,
    pub conversation_id: Option<String>,
    pub author_role: Option<String>,
    pub created_at: Option<f64>,
    pub text: String,
}

/// One ranked row out of the full-text index
#[derive(Debug, Clone)]
pub struct LexicalHit {
    pub id: String,
    pub conversation_id: Option<String>,
    pub author_role: Option<String>,
    pub created_at: Option<f64>,
    /// bm25 as reported by the index; lower is more relevant
    pub raw_relevance: f64,
    pub snippet: String,
}

/// Archive statistics
#[derive(Debug)]
pub struct ArchiveStats {
    pub message_count: usize,
    pub conversation_count: usize,
    pub indexed_count: usize,
}

/// Pooled handle onto the archive database
pub struct ArchiveStore {
    pool: DbPool,
    snippet: SnippetConfig,
}

impl ArchiveStore {
    /// Open (and if necessary create) the archive at `path`
    pub fn open(path: &Path, snippet: SnippetConfig) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| HindsightError::Io {
                source: e,
                context: format!("Failed to create archive directory: {:?}", parent),
            })?;
        }

        // Pragmas run per pooled connection; busy_timeout matters because
        // parallel queries share this database with the external importer.
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
                store: StoreKind::Archive,
                message: format!("Failed to create connection pool: {}", e),
            })?;

        let store = Self { pool, snippet };
        store.migrate()?;

        Ok(store)
    }

    /// Get a connection from the pool
    fn conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| HindsightError::StoreUnavailable {
                store: StoreKind::Archive,
                message: format!("Failed to get connection: {}", e),
            })
    }

    /// Run schema migrations
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
                tracing::info!("Applying archive migration {}", version);
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

    /// Search the full-text index.
    ///
    /// A query containing whitespace is issued as one exact phrase (embedded
    /// quotes stripped first) so multi-word queries do not degrade into
    /// match-any-word. Ordering is bm25 ascending, then `created_at`
    /// descending, and rows are capped at `limit`.
    pub fn search(
        &self,
        query: &str,
        role: Option<&str>,
        since: Option<f64>,
        until: Option<f64>,
        limit: usize,
    ) -> Result<Vec<LexicalHit>> {
        let conn = self.conn()?;

        let mut sql = String::from(
            "SELECT message_id, conversation_id, author_role, created_at, \
             snippet(messages_fts, 4, ?, ?, ?, ?) AS snip, \
             bm25(messages_fts) AS relevance \
             FROM messages_fts WHERE messages_fts MATCH ?",
        );
        let mut args: Vec<Box<dyn ToSql>> = vec![
            Box::new(self.snippet.start.clone()),
            Box::new(self.snippet.end.clone()),
            Box::new(self.snippet.ellipsis.clone()),
            Box::new(self.snippet.tokens as i64),
            Box::new(fts_match_expression(query)),
        ];

        if let Some(role) = role {
            sql.push_str(" AND author_role = ?");
            args.push(Box::new(role.to_string()));
        }
        if let Some(since) = since {
            sql.push_str(" AND CAST(created_at AS REAL) >= ?");
            args.push(Box::new(since));
        }
        if let Some(until) = until {
            sql.push_str(" AND CAST(created_at AS REAL) <= ?");
            args.push(Box::new(until));
        }

        sql.push_str(" ORDER BY relevance ASC, CAST(created_at AS REAL) DESC LIMIT ?");
        args.push(Box::new(limit as i64));

        let mut stmt = conn.prepare(&sql).map_err(store_err)?;
        let rows = stmt
            .query_map(
                rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())),
                |row| {
                    Ok(LexicalHit {
                        id: row.get(0)?,
                        conversation_id: row.get(1)?,
                        author_role: row.get(2)?,
                        created_at: epoch_from_ref(row.get_ref(3)?),
                        snippet: row.get(4)?,
                        raw_relevance: row.get(5)?,
                    })
                },
            )
            .map_err(store_err)?;

        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(store_err)
    }

    /// Insert one message into both the canonical table and the index.
    ///
    /// Import-side helper; the query path never writes.
    pub fn insert_message(&self, message: &Message) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(store_err)?;

        tx.execute(
            "INSERT INTO messages (id, conversation_id, author_role, created_at, content_text)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                message.id,
                message.conversation_id,
                message.author_role,
                message.created_at,
                message.text,
            ],
        )
        .map_err(store_err)?;

        tx.execute(
            "INSERT INTO messages_fts (message_id, conversation_id, author_role, created_at, content_text)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                message.id,
                message.conversation_id,
                message.author_role,
                message.created_at,
                message.text,
            ],
        )
        .map_err(store_err)?;

        tx.commit().map_err(store_err)
    }

    /// Get archive statistics
    pub fn stats(&self) -> Result<ArchiveStats> {
        let conn = self.conn()?;

        let message_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))
            .map_err(store_err)?;

        let conversation_count: i64 = conn
            .query_row(
                "SELECT COUNT(DISTINCT conversation_id) FROM messages",
                [],
                |row| row.get(0),
            )
            .map_err(store_err)?;

        let indexed_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM messages_fts", [], |row| row.get(0))
            .map_err(store_err)?;

        Ok(ArchiveStats {
            message_count: message_count as usize,
            conversation_count: conversation_count as usize,
            indexed_count: indexed_count as usize,
        })
    }
}

fn store_err(e: rusqlite::Error) -> HindsightError {
    HindsightError::Store {
        store: StoreKind::Archive,
        source: e,
    }
}

/// Build the FTS5 match expression for a raw query
fn fts_match_expression(query: &str) -> String {
    if query.chars().any(char::is_whitespace) {
        format!("\"{}\"", query.replace('"', ""))
    } else {
        query.to_string()
    }
}

/// Coerce whatever the index stored for `created_at` into epoch seconds
fn epoch_from_ref(value: ValueRef<'_>) -> Option<f64> {
    match value {
        ValueRef::Integer(i) => Some(i as f64),
        ValueRef::Real(f) => Some(f),
        ValueRef::Text(bytes) => std::str::from_utf8(bytes)
            .ok()
            .and_then(|s| s.trim().parse().ok()),
        _ => None,
    }
}

/// Archive migrations (each string is one migration)
const MIGRATIONS: &[&str] = &[
    // Migration 1: canonical messages plus full-text projection
    r#"
    CREATE TABLE messages (
        id TEXT PRIMARY KEY,
        conversation_id TEXT,
        author_role TEXT,
        created_at REAL,
        content_text TEXT
    );

    CREATE INDEX idx_messages_conversation ON messages(conversation_id);
    CREATE INDEX idx_messages_created_at ON messages(created_at);

    CREATE VIRTUAL TABLE messages_fts USING fts5(
        message_id,
        conversation_id,
        author_role,
        created_at,
        content_text
    );
    "#,
];
