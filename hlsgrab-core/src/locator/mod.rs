//! Finds the embedded player URL for a catalog page.
//!
//! The source URL is rebased onto a random mirror, fetched through a
//! [`PageFetcher`] and scanned for the player iframe. Every failure collapses
//! into `None`: callers only learn that nothing was found.

mod error;
mod fetcher;
mod mirror;

use std::sync::Arc;

use scraper::{Html, Selector};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::LocatorSection;

pub use error::{LocateError, LocateResult};
pub use fetcher::{PageFetcher, ProxyPageFetcher};
pub use mirror::{rebase_on_origin, MirrorSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocatedEmbed {
    pub origin: String,
    pub page_url: String,
    pub embed_url: String,
}

pub struct EmbedLocator {
    mirrors: MirrorSet,
    fetcher: Arc<dyn PageFetcher>,
    selector: String,
}

impl EmbedLocator {
    pub fn new(
        mirrors: MirrorSet,
        fetcher: Arc<dyn PageFetcher>,
        selector: impl Into<String>,
    ) -> Self {
        Self {
            mirrors,
            fetcher,
            selector: selector.into(),
        }
    }

    pub fn from_config(config: &LocatorSection) -> LocateResult<Self> {
        let fetcher = ProxyPageFetcher::from_config(config)?;
        Ok(Self::new(
            MirrorSet::new(config.mirrors.iter().cloned()),
            Arc::new(fetcher),
            config.iframe_selector.clone(),
        ))
    }

    /// Best-effort lookup of the embed URL behind `source_url`.
    pub async fn locate(&self, source_url: &str) -> Option<LocatedEmbed> {
        match self.try_locate(source_url).await {
            Ok(located) => {
                info!(
                    origin = %located.origin,
                    embed = %located.embed_url,
                    "located embed player"
                );
                Some(located)
            }
            Err(err) => {
                warn!(source = %source_url, error = %err, "failed to locate embed player");
                None
            }
        }
    }

    async fn try_locate(&self, source_url: &str) -> LocateResult<LocatedEmbed> {
        let origin = self.mirrors.choose().ok_or(LocateError::NoMirrors)?;
        let page_url = rebase_on_origin(source_url, origin)?;
        info!(origin = %origin, page = %page_url, "fetching source page from mirror");
        let html = self.fetcher.fetch(&page_url).await?;
        let embed_url = extract_embed_url(&html, &self.selector)?;
        Ok(LocatedEmbed {
            origin: origin.to_string(),
            page_url,
            embed_url,
        })
    }
}

/// Reads the `src` of the first element matching `selector`, resolving
/// protocol-relative values to https.
pub fn extract_embed_url(html: &str, selector: &str) -> LocateResult<String> {
    let parsed = Selector::parse(selector).map_err(|err| LocateError::Selector {
        selector: selector.to_string(),
        reason: format!("{err:?}"),
    })?;
    let document = Html::parse_document(html);
    let element = document
        .select(&parsed)
        .next()
        .ok_or_else(|| LocateError::MissingEmbed {
            selector: selector.to_string(),
        })?;
    let src = element
        .value()
        .attr("src")
        .map(str::trim)
        .filter(|src| !src.is_empty())
        .ok_or_else(|| LocateError::MissingSrc {
            selector: selector.to_string(),
        })?;
    Ok(normalize_embed_src(src))
}

fn normalize_embed_src(src: &str) -> String {
    match src.strip_prefix("//") {
        Some(rest) => format!("https://{rest}"),
        None => src.to_string(),
    }
}
