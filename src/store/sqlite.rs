//! Durable [`CatalogStore`] backed by `SQLite`.
//!
//! The `packages` table stores the URL as received next to its canonical
//! key. Uniqueness is enforced on `canonical_key`; deletes match the `url`
//! column exactly. Collection membership lives in
//! `custom_collection_members`, keyed by `(collection_id, canonical_key)`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use url::Url;

use super::{parse_stored_url, CatalogStore, CollectionRecord, PackageRecord, ProcessingStage};
use crate::error::{StoreError, StoreResult};
use crate::reconcile::canonical::canonicalize;
use crate::sources::CollectionDescriptor;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS packages (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    url           TEXT NOT NULL,
    canonical_key TEXT NOT NULL UNIQUE,
    stage         TEXT NOT NULL,
    created_at    TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS custom_collections (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL,
    description TEXT,
    badge       TEXT,
    url         TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS custom_collection_members (
    collection_id INTEGER NOT NULL REFERENCES custom_collections(id) ON DELETE CASCADE,
    url           TEXT NOT NULL,
    canonical_key TEXT NOT NULL,
    PRIMARY KEY (collection_id, canonical_key)
);
";

#[derive(Debug, Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (or creates) the database file and applies the schema.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        info!("Opening catalog database at {}", path.display());
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Looks a package up by canonical identity.
    pub async fn package(&self, url: &Url) -> StoreResult<Option<PackageRecord>> {
        let key = canonicalize(url).to_string();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT url, stage, created_at FROM packages WHERE canonical_key = ?1",
                    params![key],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                        ))
                    },
                )
                .optional()?;

            row.map(|(url, stage, created_at)| -> StoreResult<PackageRecord> {
                let created_at = DateTime::parse_from_rfc3339(&created_at)
                    .map_err(|e| {
                        StoreError::InvalidData(format!("created_at '{}': {}", created_at, e))
                    })?
                    .with_timezone(&Utc);
                Ok(PackageRecord {
                    url: parse_stored_url(&url)?,
                    stage: stage.parse()?,
                    created_at,
                })
            })
            .transpose()
        })
        .await
    }

    /// Runs `f` against the connection on the blocking thread pool.
    async fn with_conn<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| {
                StoreError::InvalidData("database connection lock poisoned".to_string())
            })?;
            f(&mut guard)
        })
        .await?
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

fn ensure_collection(conn: &Connection, collection_id: i64) -> StoreResult<()> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM custom_collections WHERE id = ?1",
            params![collection_id],
            |_| Ok(()),
        )
        .optional()?;
    exists.ok_or(StoreError::CollectionNotFound(collection_id))
}

#[async_trait]
impl CatalogStore for SqliteStore {
    async fn list_package_urls(&self) -> StoreResult<Vec<Url>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT url FROM packages ORDER BY url")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            let mut urls = Vec::new();
            for raw in rows {
                urls.push(parse_stored_url(&raw?)?);
            }
            Ok(urls)
        })
        .await
    }

    async fn insert_packages(&self, urls: &[Url], stage: ProcessingStage) -> StoreResult<()> {
        let urls: Vec<Url> = urls.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO packages (url, canonical_key, stage, created_at) \
                     VALUES (?1, ?2, ?3, ?4)",
                )?;
                let now = Utc::now().to_rfc3339();
                for url in &urls {
                    let key = canonicalize(url);
                    stmt.execute(params![url.as_str(), key.as_str(), stage.as_str(), now])
                        .map_err(|e| {
                            if is_constraint_violation(&e) {
                                StoreError::DuplicateIdentity(url.to_string())
                            } else {
                                StoreError::Database(e)
                            }
                        })?;
                }
            }
            tx.commit()?;
            debug!("Inserted {} packages", urls.len());
            Ok(())
        })
        .await
    }

    async fn delete_package(&self, url: &Url) -> StoreResult<usize> {
        let url = url.to_string();
        self.with_conn(move |conn| {
            Ok(conn.execute("DELETE FROM packages WHERE url = ?1", params![url])?)
        })
        .await
    }

    async fn find_or_create_collection(
        &self,
        descriptor: &CollectionDescriptor,
    ) -> StoreResult<CollectionRecord> {
        let descriptor = descriptor.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO custom_collections (name, description, badge, url)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(url) DO UPDATE SET
                     name = excluded.name,
                     description = excluded.description,
                     badge = excluded.badge",
                params![
                    descriptor.name,
                    descriptor.description,
                    descriptor.badge,
                    descriptor.url.as_str()
                ],
            )?;

            let (id, name, description, badge) = conn.query_row(
                "SELECT id, name, description, badge FROM custom_collections WHERE url = ?1",
                params![descriptor.url.as_str()],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                },
            )?;

            Ok(CollectionRecord {
                id,
                name,
                description,
                badge,
                url: descriptor.url,
            })
        })
        .await
    }

    async fn collection_members(&self, collection_id: i64) -> StoreResult<Vec<Url>> {
        self.with_conn(move |conn| {
            ensure_collection(conn, collection_id)?;
            let mut stmt = conn.prepare(
                "SELECT url FROM custom_collection_members WHERE collection_id = ?1 ORDER BY rowid",
            )?;
            let rows = stmt.query_map(params![collection_id], |row| row.get::<_, String>(0))?;
            let mut urls = Vec::new();
            for raw in rows {
                urls.push(parse_stored_url(&raw?)?);
            }
            Ok(urls)
        })
        .await
    }

    async fn reconcile_membership(
        &self,
        collection_id: i64,
        to_add: &[Url],
        to_delete: &[Url],
    ) -> StoreResult<()> {
        let to_add = to_add.to_vec();
        let to_delete = to_delete.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            ensure_collection(&tx, collection_id)?;
            for url in &to_delete {
                tx.execute(
                    "DELETE FROM custom_collection_members WHERE collection_id = ?1 AND url = ?2",
                    params![collection_id, url.as_str()],
                )?;
            }
            for url in &to_add {
                let key = canonicalize(url);
                tx.execute(
                    "INSERT INTO custom_collection_members (collection_id, url, canonical_key) \
                     VALUES (?1, ?2, ?3)",
                    params![collection_id, url.as_str(), key.as_str()],
                )
                .map_err(|e| {
                    if is_constraint_violation(&e) {
                        StoreError::DuplicateIdentity(url.to_string())
                    } else {
                        StoreError::Database(e)
                    }
                })?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }
}
