use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ConfigError, Result};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HlsgrabConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub locator: LocatorSection,
    #[serde(default)]
    pub capture: CaptureSection,
    #[serde(default)]
    pub retry: RetrySection,
}

impl HlsgrabConfig {
    /// Applies `HLSGRAB_*` environment overrides on top of the file values.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        if let Some(key) = non_empty("HLSGRAB_PROXY_API_KEY") {
            self.locator.api_key = key;
        }
        if let Some(path) = non_empty("HLSGRAB_DATABASE") {
            self.cache.database_path = path;
        }
        if let Some(bind) = non_empty("HLSGRAB_BIND") {
            self.server.bind = bind;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.locator.mirrors.iter().all(|m| m.trim().is_empty()) {
            return Err(ConfigError::Invalid {
                field: "locator.mirrors",
                reason: "at least one mirror origin is required".into(),
            });
        }
        if self.capture.max_concurrent_browsers == 0 {
            return Err(ConfigError::Invalid {
                field: "capture.max_concurrent_browsers",
                reason: "must be greater than zero".into(),
            });
        }
        if !self.capture.manifest_marker.contains('.') {
            return Err(ConfigError::Invalid {
                field: "capture.manifest_marker",
                reason: format!(
                    "expected a file extension, got {:?}",
                    self.capture.manifest_marker
                ),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocatorSection {
    #[serde(default = "default_mirrors")]
    pub mirrors: Vec<String>,
    #[serde(default = "default_proxy_endpoint")]
    pub proxy_endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_fetch_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_iframe_selector")]
    pub iframe_selector: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl LocatorSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.max(1))
    }
}

impl Default for LocatorSection {
    fn default() -> Self {
        Self {
            mirrors: default_mirrors(),
            proxy_endpoint: default_proxy_endpoint(),
            api_key: String::new(),
            timeout_seconds: default_fetch_timeout(),
            iframe_selector: default_iframe_selector(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureSection {
    #[serde(default)]
    pub executable_path: Option<String>,
    #[serde(default = "default_true")]
    pub headless: bool,
    #[serde(default = "default_true")]
    pub sandbox: bool,
    #[serde(default = "default_true")]
    pub disable_gpu: bool,
    #[serde(default = "default_observe_seconds")]
    pub observe_seconds: u64,
    #[serde(default = "default_click_offset")]
    pub click_offset: [f64; 2],
    #[serde(default = "default_manifest_marker")]
    pub manifest_marker: String,
    #[serde(default)]
    pub request_timeout_seconds: Option<u64>,
    #[serde(default = "default_max_browsers")]
    pub max_concurrent_browsers: usize,
}

impl CaptureSection {
    pub fn observe_window(&self) -> Duration {
        Duration::from_secs(self.observe_seconds)
    }
}

impl Default for CaptureSection {
    fn default() -> Self {
        Self {
            executable_path: None,
            headless: true,
            sandbox: true,
            disable_gpu: true,
            observe_seconds: default_observe_seconds(),
            click_offset: default_click_offset(),
            manifest_marker: default_manifest_marker(),
            request_timeout_seconds: None,
            max_concurrent_browsers: default_max_browsers(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:5000".into()
}

fn default_database_path() -> String {
    "data/streams.sqlite".into()
}

fn default_mirrors() -> Vec<String> {
    ["vidsrc.in", "vidsrc.pm", "vidsrc.xyz", "vidsrc.net"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_proxy_endpoint() -> String {
    "https://proxy.scrapeops.io/v1/".into()
}

fn default_fetch_timeout() -> u64 {
    60
}

fn default_iframe_selector() -> String {
    "iframe#player_iframe".into()
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.into()
}

fn default_true() -> bool {
    true
}

fn default_observe_seconds() -> u64 {
    20
}

fn default_click_offset() -> [f64; 2] {
    [100.0, 100.0]
}

fn default_manifest_marker() -> String {
    ".m3u8".into()
}

fn default_max_browsers() -> usize {
    2
}

fn default_max_attempts() -> usize {
    2
}

pub fn load_hlsgrab_config<P: AsRef<Path>>(path: P) -> Result<HlsgrabConfig> {
    load_toml(path)
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("configs/hlsgrab.toml")
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}
