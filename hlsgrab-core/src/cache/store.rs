use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::info;

use crate::key::ContentKey;

use super::models::{dedup_urls, ManifestEntry};
use super::{CacheError, CacheResult, ManifestCache};

const CACHE_SCHEMA: &str = include_str!("../../../sql/manifest_cache.sql");

#[derive(Debug, Clone)]
pub struct SqliteManifestCacheBuilder {
    path: Option<PathBuf>,
    create_if_missing: bool,
}

impl Default for SqliteManifestCacheBuilder {
    fn default() -> Self {
        Self {
            path: None,
            create_if_missing: true,
        }
    }
}

impl SqliteManifestCacheBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    pub fn build(self) -> CacheResult<SqliteManifestCache> {
        let path = self.path.ok_or(CacheError::MissingStore)?;
        let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE;
        if self.create_if_missing {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }

        Ok(SqliteManifestCache { path, flags })
    }
}

/// SQLite-backed manifest cache. Opens a connection per call, so clones are
/// cheap and can be moved into blocking tasks.
#[derive(Debug, Clone)]
pub struct SqliteManifestCache {
    path: PathBuf,
    flags: OpenFlags,
}

impl SqliteManifestCache {
    pub fn builder() -> SqliteManifestCacheBuilder {
        SqliteManifestCacheBuilder::new()
    }

    pub fn new(path: impl AsRef<Path>) -> CacheResult<Self> {
        SqliteManifestCacheBuilder::new().path(path).build()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> CacheResult<Connection> {
        let conn = Connection::open_with_flags(&self.path, self.flags).map_err(|source| {
            CacheError::OpenDatabase {
                path: self.path.clone(),
                source,
            }
        })?;
        apply_pragmas(&conn).map_err(|source| CacheError::OpenDatabase {
            path: self.path.clone(),
            source,
        })?;
        Ok(conn)
    }

    pub fn initialize(&self) -> CacheResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = self.open()?;
        conn.execute_batch(CACHE_SCHEMA)?;
        Ok(())
    }

    pub fn fetch(&self, key: &ContentKey) -> CacheResult<Option<ManifestEntry>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare("SELECT * FROM manifest_cache WHERE key = ?1")?;
        let entry = stmt
            .query_row([key.to_string()], |row| ManifestEntry::from_row(row))
            .optional()?;
        Ok(entry.filter(|entry| !entry.manifest_urls.is_empty()))
    }

    pub fn store(&self, source_url: &str, manifest_urls: &[String]) -> CacheResult<ManifestEntry> {
        let key = ContentKey::derive(source_url).to_string();
        let manifest_urls = dedup_urls(manifest_urls.iter().cloned());
        if manifest_urls.is_empty() {
            return Err(CacheError::EmptyManifests { key });
        }
        let entry = ManifestEntry {
            key,
            source_url: source_url.to_string(),
            manifest_urls,
            updated_at: Utc::now(),
        };
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO manifest_cache (key, source_url, manifest_urls, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(key) DO UPDATE SET
                source_url = excluded.source_url,
                manifest_urls = excluded.manifest_urls,
                updated_at = excluded.updated_at",
            params![
                &entry.key,
                &entry.source_url,
                serde_json::to_string(&entry.manifest_urls)?,
                entry.updated_at.naive_utc(),
            ],
        )?;
        info!(
            key = %entry.key,
            streams = entry.manifest_urls.len(),
            "stored manifest urls"
        );
        Ok(entry)
    }

    pub fn list(&self, limit: usize) -> CacheResult<Vec<ManifestEntry>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM manifest_cache
             ORDER BY updated_at DESC, key ASC
             LIMIT ?1",
        )?;
        let rows = stmt
            .query_map([limit as i64], |row| ManifestEntry::from_row(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn total(&self) -> CacheResult<usize> {
        let conn = self.open()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM manifest_cache", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn apply_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.busy_timeout(Duration::from_millis(5000))?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;\n\
         PRAGMA synchronous = NORMAL;\n\
         PRAGMA temp_store = MEMORY;\n",
    )
}

#[async_trait]
impl ManifestCache for SqliteManifestCache {
    async fn lookup(&self, key: &ContentKey) -> CacheResult<Option<ManifestEntry>> {
        let store = self.clone();
        let key = key.clone();
        tokio::task::spawn_blocking(move || store.fetch(&key)).await?
    }

    async fn upsert(
        &self,
        source_url: &str,
        manifest_urls: &[String],
    ) -> CacheResult<ManifestEntry> {
        let store = self.clone();
        let source_url = source_url.to_string();
        let manifest_urls = manifest_urls.to_vec();
        tokio::task::spawn_blocking(move || store.store(&source_url, &manifest_urls)).await?
    }

    async fn entries(&self, limit: usize) -> CacheResult<Vec<ManifestEntry>> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.list(limit)).await?
    }

    async fn count(&self) -> CacheResult<usize> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.total()).await?
    }
}
