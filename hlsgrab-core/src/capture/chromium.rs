use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromiumConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventRequestWillBeSent, EventResponseReceived,
};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, NavigateParams,
};
use chromiumoxide::layout::Point;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::CaptureSection;

use super::error::{CaptureError, CaptureResult};
use super::session::{CaptureSession, CaptureSessionFactory, ObservedExchange};

const POPUP_GUARD: &str = r#"
(() => {
    const blocked = function() {
        console.log('Blocked window.open');
        return null;
    };
    try {
        Object.defineProperty(window, 'open', {
            value: blocked,
            writable: false,
            configurable: false,
        });
    } catch (_) {
        window.open = blocked;
    }
})();
"#;

/// Launches one throwaway Chromium per capture session.
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    config: Arc<CaptureSection>,
}

impl ChromiumLauncher {
    pub fn new(config: CaptureSection) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub async fn launch(&self) -> CaptureResult<ChromiumCaptureSession> {
        let profile_dir = tempfile::Builder::new()
            .prefix("hlsgrab-profile-")
            .tempdir()?;
        let chromium_config = self.build_chromium_config(&profile_dir)?;
        info!(
            profile = %profile_dir.path().display(),
            headless = self.config.headless,
            "Launching Chromium instance"
        );

        let (browser, mut handler) = Browser::launch(chromium_config)
            .await
            .map_err(|err| CaptureError::Launch(err.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "Chromium handler reported error");
                }
            }
        });

        let mut session = ChromiumCaptureSession {
            browser,
            page: None,
            handler_task: Some(handler_task),
            listener_tasks: Vec::new(),
            traffic: Arc::new(Mutex::new(TrafficLog::default())),
            profile_dir: Some(profile_dir),
        };
        if let Err(err) = session.prepare_page().await {
            if let Err(release_err) = session.release().await {
                warn!(error = %release_err, "failed to release browser after setup error");
            }
            return Err(err);
        }
        Ok(session)
    }

    fn build_chromium_config(&self, profile_dir: &TempDir) -> CaptureResult<ChromiumConfig> {
        let mut builder = ChromiumConfig::builder().user_data_dir(profile_dir.path());

        if let Some(executable) = &self.config.executable_path {
            builder = builder.chrome_executable(executable);
        }
        if !self.config.headless {
            builder = builder.with_head();
        }
        if !self.config.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(timeout) = self.config.request_timeout_seconds {
            builder = builder.request_timeout(Duration::from_secs(timeout));
        }

        let mut args = vec![
            "--block-new-web-contents".to_string(),
            "--mute-audio".to_string(),
            "--no-first-run".to_string(),
            "--autoplay-policy=no-user-gesture-required".to_string(),
            "--disable-background-timer-throttling".to_string(),
            "--password-store=basic".to_string(),
        ];
        if self.config.disable_gpu {
            args.push("--disable-gpu".into());
        }
        builder = builder.args(args);

        builder.build().map_err(CaptureError::Configuration)
    }
}

#[async_trait]
impl CaptureSessionFactory for ChromiumLauncher {
    async fn open(&self) -> CaptureResult<Box<dyn CaptureSession>> {
        Ok(Box::new(self.launch().await?))
    }
}

#[derive(Debug, Default)]
struct TrafficLog {
    exchanges: Vec<ObservedExchange>,
    latest_by_request: HashMap<String, usize>,
}

impl TrafficLog {
    fn record_request(&mut self, request_id: &str, url: &str, redirected: bool) {
        if redirected {
            self.mark_responded(request_id);
        }
        self.exchanges.push(ObservedExchange::new(url, false));
        self.latest_by_request
            .insert(request_id.to_string(), self.exchanges.len() - 1);
    }

    fn record_response(&mut self, request_id: &str, url: &str) {
        if !self.mark_responded(request_id) {
            // Response without a matching request event, e.g. served from cache.
            self.exchanges.push(ObservedExchange::new(url, true));
        }
    }

    fn mark_responded(&mut self, request_id: &str) -> bool {
        match self.latest_by_request.get(request_id) {
            Some(&index) => {
                self.exchanges[index].responded = true;
                true
            }
            None => false,
        }
    }
}

#[derive(Debug)]
pub struct ChromiumCaptureSession {
    browser: Browser,
    page: Option<Page>,
    handler_task: Option<JoinHandle<()>>,
    listener_tasks: Vec<JoinHandle<()>>,
    traffic: Arc<Mutex<TrafficLog>>,
    profile_dir: Option<TempDir>,
}

impl ChromiumCaptureSession {
    async fn prepare_page(&mut self) -> CaptureResult<()> {
        let page = self.browser.new_page("about:blank").await?;
        page.execute(EnableParams::default()).await?;
        page.evaluate_on_new_document(
            AddScriptToEvaluateOnNewDocumentParams::builder()
                .source(POPUP_GUARD)
                .build()
                .map_err(CaptureError::Configuration)?,
        )
        .await?;

        let mut requests = page.event_listener::<EventRequestWillBeSent>().await?;
        let traffic = Arc::clone(&self.traffic);
        self.listener_tasks.push(tokio::spawn(async move {
            while let Some(event) = requests.next().await {
                let mut log = traffic.lock().unwrap_or_else(|p| p.into_inner());
                log.record_request(
                    event.request_id.inner(),
                    &event.request.url,
                    event.redirect_response.is_some(),
                );
            }
        }));

        let mut responses = page.event_listener::<EventResponseReceived>().await?;
        let traffic = Arc::clone(&self.traffic);
        self.listener_tasks.push(tokio::spawn(async move {
            while let Some(event) = responses.next().await {
                let mut log = traffic.lock().unwrap_or_else(|p| p.into_inner());
                log.record_response(event.request_id.inner(), &event.response.url);
            }
        }));

        self.page = Some(page);
        Ok(())
    }

    fn page(&self) -> CaptureResult<&Page> {
        self.page.as_ref().ok_or(CaptureError::Released)
    }
}

#[async_trait]
impl CaptureSession for ChromiumCaptureSession {
    async fn navigate(&mut self, url: &str) -> CaptureResult<()> {
        let params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(CaptureError::Configuration)?;
        let page = self.page()?;
        page.goto(params).await?;
        page.wait_for_navigation().await?;
        Ok(())
    }

    async fn interact(&mut self, offset: (f64, f64)) -> CaptureResult<()> {
        let page = self.page()?;
        let body = page
            .find_element("body")
            .await
            .map_err(|err| CaptureError::Interaction(format!("body element not found: {err}")))?;
        let bbox = body.bounding_box().await.map_err(|err| {
            CaptureError::Interaction(format!("failed to get body bounding box: {err}"))
        })?;
        let x = bbox.x + clamp_offset(offset.0, bbox.width);
        let y = bbox.y + clamp_offset(offset.1, bbox.height);
        let point = Point::new(x, y);
        page.move_mouse(point)
            .await
            .map_err(|err| CaptureError::Interaction(format!("failed to move mouse: {err}")))?;
        page.click(point)
            .await
            .map_err(|err| CaptureError::Interaction(format!("failed to click: {err}")))?;
        debug!(x, y, "clicked embed page body");
        Ok(())
    }

    async fn observe(&mut self, window: Duration) -> CaptureResult<Vec<ObservedExchange>> {
        sleep(window).await;
        let log = self.traffic.lock().unwrap_or_else(|p| p.into_inner());
        debug!(exchanges = log.exchanges.len(), "collected network exchanges");
        Ok(log.exchanges.clone())
    }

    async fn release(&mut self) -> CaptureResult<()> {
        for task in self.listener_tasks.drain(..) {
            task.abort();
        }
        let Some(handle) = self.handler_task.take() else {
            return Ok(());
        };
        info!("Shutting down Chromium instance");
        self.page = None;
        if let Err(err) = self.browser.close().await {
            warn!(error = %err, "Failed to close browser gracefully");
        }
        if let Err(err) = self.browser.wait().await {
            warn!(error = %err, "Failed to reap browser process");
        }
        if let Err(err) = handle.await {
            warn!(error = %err, "Browser handler join error");
        }
        if let Some(dir) = self.profile_dir.take() {
            if let Err(err) = dir.close() {
                debug!(error = %err, "Failed to remove browser profile directory");
            }
        }
        Ok(())
    }
}

impl Drop for ChromiumCaptureSession {
    fn drop(&mut self) {
        for task in &self.listener_tasks {
            task.abort();
        }
        if let Some(handle) = self.handler_task.take() {
            warn!("ChromiumCaptureSession dropped without release");
            handle.abort();
        }
    }
}

fn clamp_offset(offset: f64, extent: f64) -> f64 {
    if extent > 1.0 {
        offset.clamp(0.0, extent - 1.0)
    } else {
        offset.max(0.0)
    }
}
