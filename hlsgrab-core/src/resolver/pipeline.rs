use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::info;

use crate::cache::{CacheResult, ManifestCache};
use crate::capture::{CaptureSettings, ChromiumLauncher, TrafficResolver};
use crate::config::HlsgrabConfig;
use crate::key::ContentKey;
use crate::locator::{EmbedLocator, LocateResult};

use super::metrics::ResolverMetrics;
use super::retry::{AttemptReport, RetryCoordinator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    Cache,
    Resolved,
    Exhausted,
}

#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub source_url: String,
    pub key: ContentKey,
    pub streams: Vec<String>,
    pub source: ResolutionSource,
    pub attempts: usize,
}

/// Cache-first resolution: derive key, look up, and only on a miss run the
/// retry coordinator and store a non-empty result.
#[derive(Clone)]
pub struct StreamPipeline {
    cache: Arc<dyn ManifestCache>,
    coordinator: RetryCoordinator,
    metrics: Arc<Mutex<ResolverMetrics>>,
}

impl StreamPipeline {
    pub fn new(cache: Arc<dyn ManifestCache>, coordinator: RetryCoordinator) -> Self {
        Self {
            cache,
            coordinator,
            metrics: Arc::new(Mutex::new(ResolverMetrics::default())),
        }
    }

    /// Wires the proxy locator and the Chromium capture from configuration.
    pub fn from_config(
        config: &HlsgrabConfig,
        cache: Arc<dyn ManifestCache>,
    ) -> LocateResult<Self> {
        let locator = EmbedLocator::from_config(&config.locator)?;
        let launcher = ChromiumLauncher::new(config.capture.clone());
        let capture = TrafficResolver::new(
            Arc::new(launcher),
            CaptureSettings::from(&config.capture),
        );
        let coordinator = RetryCoordinator::new(
            Arc::new(locator),
            Arc::new(capture),
            config.retry.max_attempts,
        );
        Ok(Self::new(cache, coordinator))
    }

    pub fn metrics(&self) -> ResolverMetrics {
        self.lock_metrics().clone()
    }

    pub async fn resolve(&self, source_url: &str) -> CacheResult<Resolution> {
        let key = ContentKey::derive(source_url);
        self.with_metrics(ResolverMetrics::record_request);

        if let Some(entry) = self.cache.lookup(&key).await? {
            info!(key = %key, streams = entry.manifest_urls.len(), "found cached streams");
            self.with_metrics(ResolverMetrics::record_cache_hit);
            return Ok(Resolution {
                source_url: source_url.to_string(),
                key,
                streams: entry.manifest_urls,
                source: ResolutionSource::Cache,
                attempts: 0,
            });
        }
        self.with_metrics(ResolverMetrics::record_cache_miss);

        let report = self.coordinator.run(source_url).await;
        self.record_report(&report);

        let source = if report.streams.is_empty() {
            self.with_metrics(ResolverMetrics::record_exhausted);
            ResolutionSource::Exhausted
        } else {
            self.cache.upsert(source_url, &report.streams).await?;
            self.with_metrics(ResolverMetrics::record_stored);
            ResolutionSource::Resolved
        };

        Ok(Resolution {
            source_url: source_url.to_string(),
            key,
            attempts: report.attempts_used(),
            streams: report.streams,
            source,
        })
    }

    fn record_report(&self, report: &AttemptReport) {
        let mut metrics = self.lock_metrics();
        for attempt in &report.attempts {
            metrics.record_attempt(attempt.embed_url.is_some(), attempt.error.is_some());
            metrics.record_manifests(attempt.manifest_urls.len() as u64);
        }
    }

    fn with_metrics<F>(&self, f: F)
    where
        F: FnOnce(&mut ResolverMetrics),
    {
        f(&mut self.lock_metrics());
    }

    fn lock_metrics(&self) -> std::sync::MutexGuard<'_, ResolverMetrics> {
        self.metrics.lock().unwrap_or_else(|p| p.into_inner())
    }
}
