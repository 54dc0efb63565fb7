use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolverMetrics {
    pub requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub attempts: u64,
    pub attempt_failures: u64,
    pub embeds_located: u64,
    pub manifests_captured: u64,
    pub resolutions_stored: u64,
    pub resolutions_exhausted: u64,
}

impl ResolverMetrics {
    pub fn record_request(&mut self) {
        self.requests = self.requests.saturating_add(1);
    }

    pub fn record_cache_hit(&mut self) {
        self.cache_hits = self.cache_hits.saturating_add(1);
    }

    pub fn record_cache_miss(&mut self) {
        self.cache_misses = self.cache_misses.saturating_add(1);
    }

    pub fn record_attempt(&mut self, located: bool, failed: bool) {
        self.attempts = self.attempts.saturating_add(1);
        if located {
            self.embeds_located = self.embeds_located.saturating_add(1);
        }
        if failed {
            self.attempt_failures = self.attempt_failures.saturating_add(1);
        }
    }

    pub fn record_manifests(&mut self, count: u64) {
        self.manifests_captured = self.manifests_captured.saturating_add(count);
    }

    pub fn record_stored(&mut self) {
        self.resolutions_stored = self.resolutions_stored.saturating_add(1);
    }

    pub fn record_exhausted(&mut self) {
        self.resolutions_exhausted = self.resolutions_exhausted.saturating_add(1);
    }
}
