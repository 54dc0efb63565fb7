use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use hlsgrab_core::{
    load_hlsgrab_config, ContentKey, HlsgrabConfig, ManifestCache, ManifestEntry,
    MemoryManifestCache, Resolution, ResolutionSource, SqliteManifestCache, StreamPipeline,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

pub mod server;

pub use server::{router, serve};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] hlsgrab_core::ConfigError),
    #[error("cache error: {0}")]
    Cache(#[from] hlsgrab_core::CacheError),
    #[error("locator setup failed: {0}")]
    Locator(#[from] hlsgrab_core::LocateError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Parser, Debug)]
#[command(author, version, about = "HLS stream resolver control interface", long_about = None)]
pub struct Cli {
    /// Path to hlsgrab.toml
    #[arg(long, default_value = "configs/hlsgrab.toml")]
    pub config: PathBuf,
    /// Alternative SQLite cache path (overrides cache.database_path)
    #[arg(long)]
    pub database: Option<PathBuf>,
    /// Keep the cache in memory for this process only
    #[arg(long, default_value_t = false)]
    pub ephemeral: bool,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Runs the HTTP API
    Serve(ServeArgs),
    /// Resolves a source URL once and prints the streams
    Resolve(UrlArgs),
    /// Inspects cached manifest entries
    #[command(subcommand)]
    Cache(CacheCommands),
    /// Prints the cache key derived from a source URL
    Key(UrlArgs),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Listen address (overrides server.bind)
    #[arg(long)]
    pub bind: Option<String>,
}

#[derive(Args, Debug)]
pub struct UrlArgs {
    /// Catalog page URL, e.g. https://vidsrc.xyz/embed/movie?tmdb=27205
    pub url: String,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Shows the entry stored for a source URL
    Show(UrlArgs),
    /// Lists the most recently updated entries
    List(CacheListArgs),
}

#[derive(Args, Debug)]
pub struct CacheListArgs {
    /// Maximum number of entries
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

pub async fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Commands::Key(args) => {
            render(&KeyReport::new(&args.url), cli.format)?;
        }
        Commands::Serve(args) => {
            let context = AppContext::new(&cli)?;
            let bind = args
                .bind
                .clone()
                .unwrap_or_else(|| context.config.server.bind.clone());
            serve(&bind, context.pipeline()?).await?;
        }
        Commands::Resolve(args) => {
            let context = AppContext::new(&cli)?;
            let resolution = context.pipeline()?.resolve(&args.url).await?;
            render(&resolution, cli.format)?;
        }
        Commands::Cache(CacheCommands::Show(args)) => {
            let context = AppContext::new(&cli)?;
            let key = ContentKey::derive(&args.url);
            let entry = context.cache.lookup(&key).await?;
            render(
                &CacheLookup {
                    key: key.to_string(),
                    entry,
                },
                cli.format,
            )?;
        }
        Commands::Cache(CacheCommands::List(args)) => {
            let context = AppContext::new(&cli)?;
            let rows = context.cache.entries(args.limit).await?;
            let total = context.cache.count().await?;
            render(&CacheList { total, rows }, cli.format)?;
        }
    }

    Ok(())
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

struct AppContext {
    config: HlsgrabConfig,
    cache: Arc<dyn ManifestCache>,
}

impl AppContext {
    fn new(cli: &Cli) -> Result<Self> {
        let mut config = if cli.config.exists() {
            load_hlsgrab_config(&cli.config)?
        } else {
            warn!(path = %cli.config.display(), "config file not found, using defaults");
            HlsgrabConfig::default()
        };
        config.apply_env_overrides();
        if let Some(database) = &cli.database {
            config.cache.database_path = database.display().to_string();
        }
        config.validate()?;

        let cache: Arc<dyn ManifestCache> = if cli.ephemeral {
            info!("using in-memory manifest cache");
            Arc::new(MemoryManifestCache::new())
        } else {
            let store = SqliteManifestCache::builder()
                .path(&config.cache.database_path)
                .create_if_missing(true)
                .build()?;
            store.initialize()?;
            info!(path = %store.path().display(), "opened manifest cache");
            Arc::new(store)
        };

        Ok(Self { config, cache })
    }

    fn pipeline(&self) -> Result<StreamPipeline> {
        Ok(StreamPipeline::from_config(
            &self.config,
            Arc::clone(&self.cache),
        )?)
    }
}

#[derive(Debug, Serialize)]
struct KeyReport {
    source_url: String,
    key: String,
    kind: &'static str,
}

impl KeyReport {
    fn new(source_url: &str) -> Self {
        let key = ContentKey::derive(source_url);
        Self {
            source_url: source_url.to_string(),
            kind: if key.is_tv() { "tv" } else { "movie" },
            key: key.to_string(),
        }
    }
}

impl DisplayFallback for KeyReport {
    fn display(&self) -> String {
        self.key.clone()
    }
}

#[derive(Debug, Serialize)]
struct CacheLookup {
    key: String,
    entry: Option<ManifestEntry>,
}

impl DisplayFallback for CacheLookup {
    fn display(&self) -> String {
        match &self.entry {
            Some(entry) => format_entry(entry),
            None => format!("{} | not cached", self.key),
        }
    }
}

#[derive(Debug, Serialize)]
struct CacheList {
    total: usize,
    rows: Vec<ManifestEntry>,
}

impl DisplayFallback for CacheList {
    fn display(&self) -> String {
        if self.rows.is_empty() {
            return "No cached entries".to_string();
        }
        let mut lines: Vec<String> = self.rows.iter().map(format_entry).collect();
        lines.push(format!("({} of {} entries)", self.rows.len(), self.total));
        lines.join("\n")
    }
}

impl DisplayFallback for Resolution {
    fn display(&self) -> String {
        let origin = match self.source {
            ResolutionSource::Cache => "cache".to_string(),
            ResolutionSource::Resolved => format!("resolved in {} attempt(s)", self.attempts),
            ResolutionSource::Exhausted => {
                format!("no streams after {} attempt(s)", self.attempts)
            }
        };
        let mut lines = vec![format!("{} | {}", self.key, origin)];
        lines.extend(self.streams.iter().map(|url| format!("  {url}")));
        lines.join("\n")
    }
}

fn format_entry(entry: &ManifestEntry) -> String {
    let mut lines = vec![format!(
        "{} | streams={} | updated={}",
        entry.key,
        entry.manifest_urls.len(),
        entry.updated_at.format("%Y-%m-%d %H:%M:%S")
    )];
    lines.extend(entry.manifest_urls.iter().map(|url| format!("  {url}")));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn key_report_names_the_content_kind() {
        let tv = KeyReport::new("https://vidsrc.xyz/embed/tv?tmdb=603&season=1&episode=1");
        assert_eq!(tv.display(), "tv:603:1:1");
        assert_eq!(tv.kind, "tv");

        let movie = KeyReport::new("https://vidsrc.xyz/embed/movie?tmdb=27205");
        assert_eq!(movie.display(), "movie:27205");
        assert_eq!(movie.kind, "movie");
    }

    #[test]
    fn cache_list_text_includes_urls_and_totals() {
        let list = CacheList {
            total: 3,
            rows: vec![ManifestEntry {
                key: "movie:1".into(),
                source_url: "https://vidsrc.xyz/embed/movie?tmdb=1".into(),
                manifest_urls: vec!["https://cdn.test/a.m3u8".into()],
                updated_at: Utc::now(),
            }],
        };
        let text = list.display();
        assert!(text.starts_with("movie:1 | streams=1"));
        assert!(text.contains("  https://cdn.test/a.m3u8"));
        assert!(text.ends_with("(1 of 3 entries)"));
    }

    #[test]
    fn missing_entry_is_reported_by_key() {
        let lookup = CacheLookup {
            key: "tv:null:1:2".into(),
            entry: None,
        };
        assert_eq!(lookup.display(), "tv:null:1:2 | not cached");
    }

    #[test]
    fn cli_parses_global_flags_and_subcommands() {
        let cli = Cli::try_parse_from([
            "hlsgrabctl",
            "--ephemeral",
            "--format",
            "json",
            "cache",
            "list",
            "--limit",
            "5",
        ])
        .unwrap();
        assert!(cli.ephemeral);
        assert!(matches!(cli.format, OutputFormat::Json));
        assert!(matches!(
            cli.command,
            Commands::Cache(CacheCommands::List(CacheListArgs { limit: 5 }))
        ));
    }
}
