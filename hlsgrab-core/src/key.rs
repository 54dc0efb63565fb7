//! Cache key derivation from loosely structured catalog URLs.
//!
//! Only the query component matters: `tmdb`, `season` and `episode`. Scheme,
//! host and path are ignored so that mirrors of the same embed page share one
//! key.

use std::fmt;

use serde::{Serialize, Serializer};
use url::form_urlencoded;

/// Rendered in place of a missing catalog id.
pub const MISSING_ID: &str = "null";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContentKey {
    Tv {
        catalog_id: Option<String>,
        season: String,
        episode: String,
    },
    Movie {
        catalog_id: Option<String>,
    },
}

impl ContentKey {
    pub fn derive(source_url: &str) -> Self {
        let query = query_component(source_url);
        let catalog_id = first_value(query, "tmdb");
        match (first_value(query, "season"), first_value(query, "episode")) {
            (Some(season), Some(episode)) => ContentKey::Tv {
                catalog_id,
                season,
                episode,
            },
            _ => ContentKey::Movie { catalog_id },
        }
    }

    pub fn catalog_id(&self) -> Option<&str> {
        match self {
            ContentKey::Tv { catalog_id, .. } | ContentKey::Movie { catalog_id } => {
                catalog_id.as_deref()
            }
        }
    }

    pub fn is_tv(&self) -> bool {
        matches!(self, ContentKey::Tv { .. })
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = self.catalog_id().unwrap_or(MISSING_ID);
        match self {
            ContentKey::Tv {
                season, episode, ..
            } => write!(f, "tv:{id}:{season}:{episode}"),
            ContentKey::Movie { .. } => write!(f, "movie:{id}"),
        }
    }
}

impl Serialize for ContentKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Shorthand for `ContentKey::derive`.
pub fn derive(source_url: &str) -> ContentKey {
    ContentKey::derive(source_url)
}

fn query_component(source_url: &str) -> &str {
    let without_fragment = source_url
        .split_once('#')
        .map_or(source_url, |(head, _)| head);
    without_fragment
        .split_once('?')
        .map_or("", |(_, query)| query)
}

// Blank values count as absent, so a later non-blank repeat still wins.
fn first_value(query: &str, name: &str) -> Option<String> {
    form_urlencoded::parse(query.as_bytes())
        .find(|(key, value)| key == name && !value.is_empty())
        .map(|(_, value)| value.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn season_and_episode_select_tv_form() {
        let key = derive("https://vidsrc.xyz/embed/tv?tmdb=603&season=1&episode=1");
        assert_eq!(key.to_string(), "tv:603:1:1");
        assert!(key.is_tv());
    }

    #[test]
    fn missing_episode_falls_back_to_movie_form() {
        let key = derive("https://vidsrc.xyz/embed/tv?tmdb=1399&season=2");
        assert_eq!(key.to_string(), "movie:1399");
    }

    #[test]
    fn key_ignores_scheme_host_and_path() {
        let a = derive("https://vidsrc.in/embed/tv?tmdb=603&season=1&episode=1");
        let b = derive("http://vidsrc.net/other/path?episode=1&tmdb=603&season=1#frag");
        let c = derive("vidsrc.pm/embed?tmdb=603&season=1&episode=1");
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn missing_catalog_id_uses_placeholder() {
        assert_eq!(derive("https://vidsrc.xyz/embed/movie").to_string(), "movie:null");
        assert_eq!(
            derive("not a url at all?season=3&episode=4").to_string(),
            "tv:null:3:4"
        );
    }

    #[test]
    fn first_non_blank_occurrence_wins() {
        let key = derive("https://h/e?tmdb=&tmdb=27205&tmdb=99&season=&episode=2");
        assert_eq!(key.to_string(), "movie:27205");
    }

    #[test]
    fn zero_valued_season_is_still_present() {
        assert_eq!(
            derive("https://h/e?tmdb=1&season=0&episode=0").to_string(),
            "tv:1:0:0"
        );
    }

    #[test]
    fn query_values_are_percent_decoded() {
        assert_eq!(derive("https://h/e?tmdb=tt%2012").to_string(), "movie:tt 12");
    }

    #[test]
    fn derivation_is_deterministic() {
        let url = "https://vidsrc.xyz/embed/movie?tmdb=27205";
        let first = derive(url);
        for _ in 0..16 {
            assert_eq!(derive(url), first);
        }
    }

    #[test]
    fn fragment_query_marks_are_not_read() {
        assert_eq!(
            derive("https://h/e#?tmdb=1&season=1&episode=1").to_string(),
            "movie:null"
        );
    }
}
