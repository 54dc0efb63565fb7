//! Headless-browser traffic capture.
//!
//! [`TrafficResolver`] drives a [`CaptureSession`] (navigate, click, wait,
//! inspect) and keeps the responded request URLs that look like HLS
//! playlists. [`ChromiumLauncher`] is the production session factory.

mod chromium;
mod error;
mod resolver;
mod session;

pub use chromium::{ChromiumCaptureSession, ChromiumLauncher};
pub use error::{CaptureError, CaptureResult};
pub use resolver::{select_manifests, CaptureSettings, TrafficResolver};
pub use session::{CaptureSession, CaptureSessionFactory, ObservedExchange};
