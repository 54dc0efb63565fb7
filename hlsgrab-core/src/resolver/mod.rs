//! Retry coordination and the cache-first resolution pipeline.

mod error;
mod metrics;
mod pipeline;
mod retry;

pub use error::{AttemptError, AttemptResult};
pub use metrics::ResolverMetrics;
pub use pipeline::{Resolution, ResolutionSource, StreamPipeline};
pub use retry::{
    AttemptReport, EmbedSource, ManifestSource, ResolutionAttempt, RetryCoordinator,
    DEFAULT_MAX_ATTEMPTS,
};
