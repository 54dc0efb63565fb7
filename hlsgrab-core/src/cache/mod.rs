//! Manifest cache keyed by [`ContentKey`].
//!
//! Entries are replaced wholesale on every successful resolution and are
//! never expired here.

mod error;
mod memory;
mod models;
mod store;

use async_trait::async_trait;

use crate::key::ContentKey;

pub use error::{CacheError, CacheResult};
pub use memory::MemoryManifestCache;
pub use models::{dedup_urls, ManifestEntry};
pub use store::{SqliteManifestCache, SqliteManifestCacheBuilder};

#[async_trait]
pub trait ManifestCache: Send + Sync {
    /// Returns the stored entry for `key`. Entries without URLs count as absent.
    async fn lookup(&self, key: &ContentKey) -> CacheResult<Option<ManifestEntry>>;

    /// Replaces or inserts the entry for the key derived from `source_url`.
    /// Fails with [`CacheError::EmptyManifests`] when `manifest_urls` is empty.
    async fn upsert(
        &self,
        source_url: &str,
        manifest_urls: &[String],
    ) -> CacheResult<ManifestEntry>;

    async fn entries(&self, limit: usize) -> CacheResult<Vec<ManifestEntry>>;

    async fn count(&self) -> CacheResult<usize>;
}
