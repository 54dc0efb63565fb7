use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::cache::dedup_urls;
use crate::capture::TrafficResolver;
use crate::locator::{EmbedLocator, LocatedEmbed};

use super::error::AttemptResult;

pub const DEFAULT_MAX_ATTEMPTS: usize = 2;

/// Step one of an attempt: find the embed page for a source URL.
#[async_trait]
pub trait EmbedSource: Send + Sync {
    async fn find_embed(&self, source_url: &str) -> AttemptResult<Option<LocatedEmbed>>;
}

/// Step two of an attempt: turn an embed URL into manifest URLs.
#[async_trait]
pub trait ManifestSource: Send + Sync {
    async fn capture_manifests(&self, embed_url: &str) -> AttemptResult<Vec<String>>;
}

#[async_trait]
impl EmbedSource for EmbedLocator {
    async fn find_embed(&self, source_url: &str) -> AttemptResult<Option<LocatedEmbed>> {
        Ok(self.locate(source_url).await)
    }
}

#[async_trait]
impl ManifestSource for TrafficResolver {
    // Runs on its own task so a panic inside the browser driver only costs
    // this attempt.
    async fn capture_manifests(&self, embed_url: &str) -> AttemptResult<Vec<String>> {
        let resolver = self.clone();
        let embed_url = embed_url.to_string();
        let streams = tokio::spawn(async move { resolver.resolve(&embed_url).await }).await?;
        Ok(streams)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResolutionAttempt {
    pub attempt_number: usize,
    pub source_url: String,
    pub chosen_origin: Option<String>,
    pub embed_url: Option<String>,
    pub manifest_urls: Vec<String>,
    pub error: Option<String>,
}

impl ResolutionAttempt {
    fn new(source_url: &str, attempt_number: usize) -> Self {
        Self {
            attempt_number,
            source_url: source_url.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AttemptReport {
    pub streams: Vec<String>,
    pub attempts: Vec<ResolutionAttempt>,
}

impl AttemptReport {
    pub fn attempts_used(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.streams.is_empty()
    }
}

/// Bounded retry over locate → capture. Stops at the first attempt that
/// yields manifests; an empty result after the last attempt is a normal
/// outcome, not an error.
#[derive(Clone)]
pub struct RetryCoordinator {
    locator: Arc<dyn EmbedSource>,
    capture: Arc<dyn ManifestSource>,
    max_attempts: usize,
}

impl RetryCoordinator {
    pub fn new(
        locator: Arc<dyn EmbedSource>,
        capture: Arc<dyn ManifestSource>,
        max_attempts: usize,
    ) -> Self {
        Self {
            locator,
            capture,
            max_attempts,
        }
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub async fn get_streams(&self, source_url: &str) -> Vec<String> {
        self.run(source_url).await.streams
    }

    pub async fn run(&self, source_url: &str) -> AttemptReport {
        let mut report = AttemptReport::default();
        let mut streams = Vec::new();
        let mut attempt = 0usize;

        while attempt < self.max_attempts && streams.is_empty() {
            let mut record = ResolutionAttempt::new(source_url, attempt + 1);
            info!(
                source = %source_url,
                attempt = record.attempt_number,
                max_attempts = self.max_attempts,
                "starting resolution attempt"
            );
            match self.attempt(source_url, &mut record).await {
                Ok(found) => streams = found,
                Err(err) => {
                    warn!(
                        source = %source_url,
                        attempt = record.attempt_number,
                        error = %err,
                        "resolution attempt failed"
                    );
                    record.error = Some(err.to_string());
                    streams = Vec::new();
                }
            }
            record.manifest_urls = streams.clone();
            report.attempts.push(record);
            attempt += 1;
        }

        info!(
            source = %source_url,
            attempts = report.attempts.len(),
            streams = streams.len(),
            "resolution finished"
        );
        report.streams = streams;
        report
    }

    async fn attempt(
        &self,
        source_url: &str,
        record: &mut ResolutionAttempt,
    ) -> AttemptResult<Vec<String>> {
        let Some(located) = self.locator.find_embed(source_url).await? else {
            info!(attempt = record.attempt_number, "no embed url found");
            return Ok(Vec::new());
        };
        record.chosen_origin = Some(located.origin.clone());
        record.embed_url = Some(located.embed_url.clone());
        let streams = self.capture.capture_manifests(&located.embed_url).await?;
        Ok(dedup_urls(streams))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::AttemptError;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    type Scripted<T> = Mutex<VecDeque<AttemptResult<T>>>;

    struct ScriptedLocator {
        outcomes: Scripted<Option<LocatedEmbed>>,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl EmbedSource for ScriptedLocator {
        async fn find_embed(&self, _source_url: &str) -> AttemptResult<Option<LocatedEmbed>> {
            *self.calls.lock().unwrap() += 1;
            self.outcomes.lock().unwrap().pop_front().unwrap_or(Ok(None))
        }
    }

    struct ScriptedCapture {
        outcomes: Scripted<Vec<String>>,
        embeds: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ManifestSource for ScriptedCapture {
        async fn capture_manifests(&self, embed_url: &str) -> AttemptResult<Vec<String>> {
            self.embeds.lock().unwrap().push(embed_url.to_string());
            self.outcomes.lock().unwrap().pop_front().unwrap_or(Ok(Vec::new()))
        }
    }

    fn embed(n: usize) -> LocatedEmbed {
        LocatedEmbed {
            origin: "vidsrc.net".into(),
            page_url: "https://vidsrc.net/embed/movie?tmdb=1".into(),
            embed_url: format!("https://embed.test/rcp/{n}"),
        }
    }

    fn coordinator(
        locate: Vec<AttemptResult<Option<LocatedEmbed>>>,
        capture: Vec<AttemptResult<Vec<String>>>,
    ) -> (RetryCoordinator, Arc<ScriptedLocator>, Arc<ScriptedCapture>) {
        let locator = Arc::new(ScriptedLocator {
            outcomes: Mutex::new(locate.into()),
            calls: Mutex::new(0),
        });
        let capture = Arc::new(ScriptedCapture {
            outcomes: Mutex::new(capture.into()),
            embeds: Mutex::new(Vec::new()),
        });
        let coordinator = RetryCoordinator::new(
            Arc::clone(&locator) as Arc<dyn EmbedSource>,
            Arc::clone(&capture) as Arc<dyn ManifestSource>,
            DEFAULT_MAX_ATTEMPTS,
        );
        (coordinator, locator, capture)
    }

    #[tokio::test]
    async fn absent_embed_twice_exhausts_after_two_attempts() {
        let (coordinator, locator, capture) = coordinator(vec![Ok(None), Ok(None)], vec![]);
        let report = coordinator.run("https://vidsrc.xyz/embed/movie?tmdb=1").await;
        assert!(report.is_exhausted());
        assert_eq!(report.attempts_used(), 2);
        assert_eq!(*locator.calls.lock().unwrap(), 2);
        assert!(capture.embeds.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn first_success_stops_the_loop() {
        let (coordinator, locator, _capture) = coordinator(
            vec![Ok(Some(embed(1)))],
            vec![Ok(vec!["https://cdn.test/a.m3u8".into()])],
        );
        let streams = coordinator.get_streams("https://h/e?tmdb=1").await;
        assert_eq!(streams, vec!["https://cdn.test/a.m3u8".to_string()]);
        assert_eq!(*locator.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn failed_attempt_is_discarded_and_next_attempt_runs() {
        let (coordinator, _locator, capture) = coordinator(
            vec![Ok(Some(embed(1))), Ok(Some(embed(2)))],
            vec![
                Err(AttemptError::Capture("browser crashed".into())),
                Ok(vec!["https://cdn.test/b.m3u8".into()]),
            ],
        );
        let report = coordinator.run("https://h/e?tmdb=1").await;
        assert_eq!(report.streams, vec!["https://cdn.test/b.m3u8".to_string()]);
        assert_eq!(report.attempts_used(), 2);
        assert_eq!(
            report.attempts[0].error.as_deref(),
            Some("manifest capture failed: browser crashed")
        );
        assert!(report.attempts[0].manifest_urls.is_empty());
        assert_eq!(
            report.attempts[1].embed_url.as_deref(),
            Some("https://embed.test/rcp/2")
        );
        assert_eq!(capture.embeds.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn locator_fault_counts_as_an_attempt() {
        let (coordinator, locator, _capture) = coordinator(
            vec![Err(AttemptError::Locator("proxy reset".into())), Ok(None)],
            vec![],
        );
        let report = coordinator.run("https://h/e?tmdb=1").await;
        assert!(report.is_exhausted());
        assert_eq!(*locator.calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn empty_capture_triggers_a_retry_and_duplicates_collapse() {
        let (coordinator, _locator, _capture) = coordinator(
            vec![Ok(Some(embed(1))), Ok(Some(embed(2)))],
            vec![
                Ok(Vec::new()),
                Ok(vec![
                    "https://cdn.test/m.m3u8".into(),
                    "https://cdn.test/m.m3u8".into(),
                ]),
            ],
        );
        let streams = coordinator.get_streams("https://h/e?tmdb=1").await;
        assert_eq!(streams, vec!["https://cdn.test/m.m3u8".to_string()]);
    }

    #[tokio::test]
    async fn zero_attempts_never_calls_collaborators() {
        let (coordinator, locator, _capture) = coordinator(vec![Ok(Some(embed(1)))], vec![]);
        let coordinator = RetryCoordinator {
            max_attempts: 0,
            ..coordinator
        };
        assert!(coordinator.get_streams("https://h/e?tmdb=1").await.is_empty());
        assert_eq!(*locator.calls.lock().unwrap(), 0);
    }
}
