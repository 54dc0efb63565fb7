//! HTTP surface: `GET /get_streams`, `/healthz` and `/stats`.

use axum::extract::{RawQuery, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use hlsgrab_core::{ResolverMetrics, StreamPipeline};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{error, info};
use url::form_urlencoded;

use crate::{AppError, Result};

pub const MISSING_VIDEO_URL: &str = "video url query parameter is required";

#[derive(Clone)]
struct ApiState {
    pipeline: StreamPipeline,
}

#[derive(Debug, Serialize)]
struct StreamsResponse {
    video_url: String,
    streams: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

pub fn router(pipeline: StreamPipeline) -> Router {
    Router::new()
        .route("/get_streams", get(get_streams))
        .route("/healthz", get(healthz))
        .route("/stats", get(stats))
        .with_state(ApiState { pipeline })
}

/// Binds `addr` and serves until Ctrl-C.
pub async fn serve(addr: &str, pipeline: StreamPipeline) -> Result<()> {
    let listener = bind(addr).await?;
    info!(addr = %listener.local_addr()?, "hlsgrab listening");
    axum::serve(listener, router(pipeline))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("hlsgrab stopped");
    Ok(())
}

/// Accepts `host:port` with either an IP literal or a host name.
async fn bind(addr: &str) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| AppError::Bind {
            addr: addr.to_string(),
            source,
        })
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
    }
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn stats(State(state): State<ApiState>) -> Json<ResolverMetrics> {
    Json(state.pipeline.metrics())
}

async fn get_streams(
    State(state): State<ApiState>,
    RawQuery(query): RawQuery,
) -> std::result::Result<Json<StreamsResponse>, ApiError> {
    let video_url = query
        .as_deref()
        .and_then(first_video_url)
        .ok_or_else(|| bad_request(MISSING_VIDEO_URL))?;

    let resolution = state.pipeline.resolve(&video_url).await.map_err(|err| {
        error!(video_url = %video_url, error = %err, "stream resolution failed");
        internal_error(err.to_string())
    })?;

    Ok(Json(StreamsResponse {
        video_url,
        streams: resolution.streams,
    }))
}

/// First non-blank `video_url` value; later repeats are ignored.
fn first_video_url(query: &str) -> Option<String> {
    form_urlencoded::parse(query.as_bytes())
        .find(|(name, value)| name == "video_url" && !value.trim().is_empty())
        .map(|(_, value)| value.into_owned())
}

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

fn internal_error(message: impl Into<String>) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_resolves_host_names() {
        let listener = bind("localhost:0").await.unwrap();
        assert!(listener.local_addr().unwrap().ip().is_loopback());
    }

    #[tokio::test]
    async fn bind_reports_the_rejected_address() {
        let err = bind("not an address").await.unwrap_err();
        match err {
            AppError::Bind { addr, .. } => assert_eq!(addr, "not an address"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn first_video_url_skips_blank_values() {
        let query = "video_url=&video_url=%20&video_url=https%3A%2F%2Fa.test%2Fe&video_url=b";
        assert_eq!(first_video_url(query).as_deref(), Some("https://a.test/e"));
        assert_eq!(first_video_url("other=1"), None);
    }
}
