use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use crate::key::ContentKey;

use super::models::{dedup_urls, ManifestEntry};
use super::{CacheError, CacheResult, ManifestCache};

/// In-process cache for tests and throwaway runs. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryManifestCache {
    entries: Arc<Mutex<HashMap<String, ManifestEntry>>>,
}

impl MemoryManifestCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an entry verbatim, bypassing key derivation.
    pub fn seed(&self, entry: ManifestEntry) {
        let mut guard = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        guard.insert(entry.key.clone(), entry);
    }

    pub fn snapshot(&self) -> Vec<ManifestEntry> {
        let guard = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        guard.values().cloned().collect()
    }
}

#[async_trait]
impl ManifestCache for MemoryManifestCache {
    async fn lookup(&self, key: &ContentKey) -> CacheResult<Option<ManifestEntry>> {
        let guard = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        Ok(guard
            .get(&key.to_string())
            .filter(|entry| !entry.manifest_urls.is_empty())
            .cloned())
    }

    async fn upsert(
        &self,
        source_url: &str,
        manifest_urls: &[String],
    ) -> CacheResult<ManifestEntry> {
        let key = ContentKey::derive(source_url).to_string();
        let manifest_urls = dedup_urls(manifest_urls.iter().cloned());
        if manifest_urls.is_empty() {
            return Err(CacheError::EmptyManifests { key });
        }
        let entry = ManifestEntry {
            key: key.clone(),
            source_url: source_url.to_string(),
            manifest_urls,
            updated_at: Utc::now(),
        };
        let mut guard = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        guard.insert(key, entry.clone());
        Ok(entry)
    }

    async fn entries(&self, limit: usize) -> CacheResult<Vec<ManifestEntry>> {
        let mut entries = self.snapshot();
        entries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.key.cmp(&b.key)));
        entries.truncate(limit);
        Ok(entries)
    }

    async fn count(&self) -> CacheResult<usize> {
        let guard = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        Ok(guard.len())
    }
}
