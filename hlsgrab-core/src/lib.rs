pub mod cache;
pub mod capture;
pub mod config;
pub mod error;
pub mod key;
pub mod locator;
pub mod resolver;

pub use cache::{
    CacheError, CacheResult, ManifestCache, ManifestEntry, MemoryManifestCache,
    SqliteManifestCache, SqliteManifestCacheBuilder,
};
pub use capture::{
    CaptureError, CaptureSession, CaptureSessionFactory, CaptureSettings, ChromiumLauncher,
    ObservedExchange, TrafficResolver,
};
pub use config::{default_config_path, load_hlsgrab_config, HlsgrabConfig};
pub use error::{ConfigError, Result};
pub use key::ContentKey;
pub use locator::{
    EmbedLocator, LocateError, LocatedEmbed, MirrorSet, PageFetcher, ProxyPageFetcher,
};
pub use resolver::{
    AttemptError, AttemptReport, EmbedSource, ManifestSource, Resolution, ResolutionSource,
    ResolverMetrics, RetryCoordinator, StreamPipeline,
};
