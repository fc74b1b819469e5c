use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tokio::task;
use uuid::Uuid;

use super::documents::{Collection, Document, DocumentStore, ListQuery, SortField, StoreError};

/// SQLite-backed document store. Each collection row keeps its JSON body and a
/// version counter bumped on every update.
#[derive(Debug, Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock().map_err(|_| anyhow!("Database connection lock poisoned"))
}

fn timestamp(at: DateTime<Utc>) -> String {
    // Fixed precision keeps the text column sortable.
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl Database {
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data directory: {}", parent.display()))?;
        }

        let path = path.to_path_buf();
        let conn = task::spawn_blocking(move || {
            Connection::open(&path)
                .with_context(|| format!("Failed to open database at {}", path.display()))
        })
        .await??;

        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Create an in-memory database (used for testing)
    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = lock(&self.conn)?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER NOT NULL
            );",
        )?;

        let version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if version < 1 {
            conn.execute_batch(
                "CREATE TABLE documents (
                    collection TEXT NOT NULL,
                    id TEXT NOT NULL,
                    version INTEGER NOT NULL DEFAULT 1,
                    body TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (collection, id)
                );

                CREATE INDEX idx_documents_created ON documents(collection, created_at DESC);
                CREATE INDEX idx_documents_updated ON documents(collection, updated_at DESC);

                INSERT INTO schema_version (version) VALUES (1);",
            )?;
        }

        if version < 2 {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS settings (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );

                UPDATE schema_version SET version = 2;",
            )?;
        }

        Ok(())
    }

    // --- Documents ---

    pub async fn insert_document(&self, collection: Collection, body: Value) -> Result<Document> {
        let conn = self.conn.clone();
        task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            let now = Utc::now().trunc_subsecs(6);
            let doc = Document {
                id: Uuid::new_v4().to_string(),
                version: 1,
                created_at: now,
                updated_at: now,
                body,
            };
            conn.execute(
                "INSERT INTO documents (collection, id, version, body, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    collection.as_str(),
                    doc.id,
                    doc.version as i64,
                    serde_json::to_string(&doc.body)?,
                    timestamp(doc.created_at),
                    timestamp(doc.updated_at),
                ],
            )?;
            Ok(doc)
        })
        .await?
    }

    pub async fn get_document(&self, collection: Collection, id: &str) -> Result<Option<Document>> {
        let conn = self.conn.clone();
        let id = id.to_string();
        task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            let mut stmt = conn.prepare(
                "SELECT id, version, body, created_at, updated_at
                 FROM documents WHERE collection = ?1 AND id = ?2",
            )?;
            let result = stmt
                .query_row(params![collection.as_str(), id], |row| {
                    Ok(Self::row_to_document(row))
                })
                .optional()?;
            result.transpose()
        })
        .await?
    }

    /// Overwrite a document body. The outer error is an SQLite failure; the
    /// inner one tells a missing document from a stale `expected_version`.
    pub async fn update_document(
        &self,
        collection: Collection,
        id: &str,
        body: Value,
        expected_version: Option<u64>,
    ) -> Result<std::result::Result<Document, StoreError>> {
        let conn = self.conn.clone();
        let id = id.to_string();
        task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            let now = timestamp(Utc::now());
            let changed = conn.execute(
                "UPDATE documents SET body = ?1, version = version + 1, updated_at = ?2
                 WHERE collection = ?3 AND id = ?4 AND (?5 IS NULL OR version = ?5)",
                params![
                    serde_json::to_string(&body)?,
                    now,
                    collection.as_str(),
                    id,
                    expected_version.map(|v| v as i64),
                ],
            )?;

            if changed == 0 {
                let found: Option<i64> = conn
                    .query_row(
                        "SELECT version FROM documents WHERE collection = ?1 AND id = ?2",
                        params![collection.as_str(), id],
                        |row| row.get(0),
                    )
                    .optional()?;
                return Ok(Err(match (found, expected_version) {
                    (Some(found), Some(expected)) => StoreError::Conflict {
                        collection: collection.as_str(),
                        id,
                        expected,
                        found: found as u64,
                    },
                    _ => StoreError::not_found(collection, id),
                }));
            }

            let doc = conn.query_row(
                "SELECT id, version, body, created_at, updated_at
                 FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection.as_str(), id],
                |row| Ok(Self::row_to_document(row)),
            )??;
            Ok(Ok(doc))
        })
        .await?
    }

    pub async fn list_documents(&self, collection: Collection, query: ListQuery) -> Result<Vec<Document>> {
        let conn = self.conn.clone();
        task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            let column = match query.order_by {
                SortField::CreatedAt => "created_at",
                SortField::UpdatedAt => "updated_at",
            };
            let direction = if query.descending { "DESC" } else { "ASC" };
            let limit = query.limit.map(|l| l as i64).unwrap_or(-1);
            let sql = format!(
                "SELECT id, version, body, created_at, updated_at
                 FROM documents WHERE collection = ?1
                 ORDER BY {column} {direction}, rowid {direction} LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let documents = stmt
                .query_map(params![collection.as_str(), limit], |row| {
                    Ok(Self::row_to_document(row))
                })?
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .collect::<Result<Vec<_>, _>>()?;
            Ok(documents)
        })
        .await?
    }

    // --- Settings ---

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.clone();
        let key = key.to_string();
        task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            let result: Option<String> = conn
                .query_row(
                    "SELECT value FROM settings WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(result)
        })
        .await?
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.clone();
        let key = key.to_string();
        let value = value.to_string();
        task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            conn.execute(
                "INSERT INTO settings (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO UPDATE SET value = ?2",
                params![key, value],
            )?;
            Ok(())
        })
        .await?
    }

    // --- Row helpers ---

    fn row_to_document(row: &rusqlite::Row) -> Result<Document> {
        let version: i64 = row.get(1)?;
        let body_str: String = row.get(2)?;
        let created_str: String = row.get(3)?;
        let updated_str: String = row.get(4)?;

        Ok(Document {
            id: row.get(0)?,
            version: version as u64,
            body: serde_json::from_str(&body_str).context("Stored body is not valid JSON")?,
            created_at: DateTime::parse_from_rfc3339(&created_str)?.with_timezone(&Utc),
            updated_at: DateTime::parse_from_rfc3339(&updated_str)?.with_timezone(&Utc),
        })
    }
}

#[async_trait]
impl DocumentStore for Database {
    async fn insert(&self, collection: Collection, body: Value) -> Result<Document, StoreError> {
        Ok(self.insert_document(collection, body).await?)
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self.get_document(collection, id).await?)
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        body: Value,
        expected_version: Option<u64>,
    ) -> Result<Document, StoreError> {
        self.update_document(collection, id, body, expected_version).await?
    }

    async fn list(&self, collection: Collection, query: ListQuery) -> Result<Vec<Document>, StoreError> {
        Ok(self.list_documents(collection, query).await?)
    }
}
