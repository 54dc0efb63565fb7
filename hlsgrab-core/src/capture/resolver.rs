use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::CaptureSection;

use super::error::CaptureResult;
use super::session::{CaptureSession, CaptureSessionFactory, ObservedExchange};

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub observe_window: Duration,
    pub click_offset: (f64, f64),
    pub manifest_marker: String,
    pub max_sessions: usize,
}

impl From<&CaptureSection> for CaptureSettings {
    fn from(config: &CaptureSection) -> Self {
        Self {
            observe_window: config.observe_window(),
            click_offset: (config.click_offset[0], config.click_offset[1]),
            manifest_marker: config.manifest_marker.clone(),
            max_sessions: config.max_concurrent_browsers.max(1),
        }
    }
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self::from(&CaptureSection::default())
    }
}

/// Opens a browser on an embed page and harvests manifest URLs from its
/// traffic. Never fails: every error ends in an empty list.
#[derive(Clone)]
pub struct TrafficResolver {
    factory: Arc<dyn CaptureSessionFactory>,
    settings: CaptureSettings,
    permits: Arc<Semaphore>,
}

impl TrafficResolver {
    pub fn new(factory: Arc<dyn CaptureSessionFactory>, settings: CaptureSettings) -> Self {
        let permits = Arc::new(Semaphore::new(settings.max_sessions.max(1)));
        Self {
            factory,
            settings,
            permits,
        }
    }

    pub async fn resolve(&self, embed_url: &str) -> Vec<String> {
        let _permit = match self.permits.acquire().await {
            Ok(permit) => permit,
            Err(err) => {
                warn!(error = %err, "browser session limiter closed");
                return Vec::new();
            }
        };

        let mut session = match self.factory.open().await {
            Ok(session) => session,
            Err(err) => {
                warn!(embed = %embed_url, error = %err, "failed to open capture session");
                return Vec::new();
            }
        };

        let outcome = self.drive(session.as_mut(), embed_url).await;
        if let Err(err) = session.release().await {
            warn!(error = %err, "failed to release capture session");
        }

        match outcome {
            Ok(exchanges) => {
                let manifests = select_manifests(&exchanges, &self.settings.manifest_marker);
                if manifests.is_empty() {
                    info!(
                        embed = %embed_url,
                        observed = exchanges.len(),
                        "no manifest requests observed"
                    );
                } else {
                    info!(
                        embed = %embed_url,
                        manifests = manifests.len(),
                        "captured manifest urls"
                    );
                }
                manifests
            }
            Err(err) => {
                warn!(embed = %embed_url, error = %err, "capture session failed");
                Vec::new()
            }
        }
    }

    async fn drive(
        &self,
        session: &mut dyn CaptureSession,
        embed_url: &str,
    ) -> CaptureResult<Vec<ObservedExchange>> {
        info!(embed = %embed_url, "opening embed page");
        session.navigate(embed_url).await?;
        session.interact(self.settings.click_offset).await?;
        debug!(
            window_secs = self.settings.observe_window.as_secs(),
            "waiting for player traffic"
        );
        session.observe(self.settings.observe_window).await
    }
}

/// Request URLs that got a response and carry the manifest marker, first
/// occurrence only.
pub fn select_manifests(exchanges: &[ObservedExchange], marker: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    exchanges
        .iter()
        .filter(|exchange| exchange.responded && exchange.url.contains(marker))
        .filter(|exchange| seen.insert(exchange.url.as_str()))
        .map(|exchange| exchange.url.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Journal {
        steps: Mutex<Vec<String>>,
        releases: AtomicUsize,
    }

    struct ScriptedSession {
        journal: Arc<Journal>,
        fail_navigation: bool,
        exchanges: Vec<ObservedExchange>,
    }

    #[async_trait]
    impl CaptureSession for ScriptedSession {
        async fn navigate(&mut self, url: &str) -> CaptureResult<()> {
            self.journal.steps.lock().unwrap().push(format!("navigate {url}"));
            if self.fail_navigation {
                Err(CaptureError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "net::ERR_CONNECTION_REFUSED",
                )))
            } else {
                Ok(())
            }
        }

        async fn interact(&mut self, offset: (f64, f64)) -> CaptureResult<()> {
            self.journal
                .steps
                .lock()
                .unwrap()
                .push(format!("click {}x{}", offset.0, offset.1));
            Ok(())
        }

        async fn observe(&mut self, window: Duration) -> CaptureResult<Vec<ObservedExchange>> {
            self.journal
                .steps
                .lock()
                .unwrap()
                .push(format!("observe {}ms", window.as_millis()));
            Ok(self.exchanges.clone())
        }

        async fn release(&mut self) -> CaptureResult<()> {
            self.journal.releases.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct ScriptedFactory {
        journal: Arc<Journal>,
        fail_open: bool,
        fail_navigation: bool,
        exchanges: Vec<ObservedExchange>,
    }

    #[async_trait]
    impl CaptureSessionFactory for ScriptedFactory {
        async fn open(&self) -> CaptureResult<Box<dyn CaptureSession>> {
            if self.fail_open {
                return Err(CaptureError::Launch("chrome not found".into()));
            }
            Ok(Box::new(ScriptedSession {
                journal: Arc::clone(&self.journal),
                fail_navigation: self.fail_navigation,
                exchanges: self.exchanges.clone(),
            }))
        }
    }

    fn settings() -> CaptureSettings {
        CaptureSettings {
            observe_window: Duration::from_millis(5),
            click_offset: (100.0, 100.0),
            manifest_marker: ".m3u8".into(),
            max_sessions: 1,
        }
    }

    fn resolver(
        journal: &Arc<Journal>,
        fail_open: bool,
        fail_navigation: bool,
        exchanges: Vec<ObservedExchange>,
    ) -> TrafficResolver {
        TrafficResolver::new(
            Arc::new(ScriptedFactory {
                journal: Arc::clone(journal),
                fail_open,
                fail_navigation,
                exchanges,
            }),
            settings(),
        )
    }

    #[test]
    fn select_manifests_filters_unanswered_and_duplicates() {
        let exchanges = vec![
            ObservedExchange::new("https://cdn.test/master.m3u8", true),
            ObservedExchange::new("https://cdn.test/pending.m3u8", false),
            ObservedExchange::new("https://cdn.test/seg-1.ts", true),
            ObservedExchange::new("https://cdn.test/master.m3u8", true),
            ObservedExchange::new("https://cdn.test/index.m3u8?token=abc", true),
        ];
        assert_eq!(
            select_manifests(&exchanges, ".m3u8"),
            vec![
                "https://cdn.test/master.m3u8".to_string(),
                "https://cdn.test/index.m3u8?token=abc".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn resolve_runs_navigate_click_observe_and_releases() {
        let journal = Arc::new(Journal::default());
        let resolver = resolver(
            &journal,
            false,
            false,
            vec![ObservedExchange::new("https://cdn.example/a.m3u8", true)],
        );
        let streams = resolver.resolve("https://embed.test/rcp/1").await;
        assert_eq!(streams, vec!["https://cdn.example/a.m3u8".to_string()]);
        assert_eq!(
            journal.steps.lock().unwrap().as_slice(),
            [
                "navigate https://embed.test/rcp/1".to_string(),
                "click 100x100".to_string(),
                "observe 5ms".to_string(),
            ]
        );
        assert_eq!(journal.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn navigation_failure_yields_empty_and_still_releases() {
        let journal = Arc::new(Journal::default());
        let resolver = resolver(
            &journal,
            false,
            true,
            vec![ObservedExchange::new("https://cdn.example/a.m3u8", true)],
        );
        assert!(resolver.resolve("https://embed.test/rcp/1").await.is_empty());
        assert_eq!(journal.steps.lock().unwrap().len(), 1);
        assert_eq!(journal.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn launch_failure_yields_empty() {
        let journal = Arc::new(Journal::default());
        let resolver = resolver(&journal, true, false, Vec::new());
        assert!(resolver.resolve("https://embed.test/rcp/1").await.is_empty());
        assert!(journal.steps.lock().unwrap().is_empty());
        assert_eq!(journal.releases.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn no_matching_traffic_yields_empty_and_releases() {
        let journal = Arc::new(Journal::default());
        let resolver = resolver(
            &journal,
            false,
            false,
            vec![ObservedExchange::new("https://ads.test/pop.js", true)],
        );
        assert!(resolver.resolve("https://embed.test/rcp/1").await.is_empty());
        assert_eq!(journal.releases.load(Ordering::SeqCst), 1);
    }
}
