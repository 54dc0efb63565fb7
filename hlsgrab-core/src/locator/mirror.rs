use rand::seq::SliceRandom;
use url::Url;

use super::error::{LocateError, LocateResult};

/// Interchangeable origins serving the same embed pages.
#[derive(Debug, Clone)]
pub struct MirrorSet {
    origins: Vec<String>,
}

impl MirrorSet {
    pub fn new<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let origins = origins
            .into_iter()
            .map(Into::into)
            .map(|origin: String| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();
        Self { origins }
    }

    pub fn origins(&self) -> &[String] {
        &self.origins
    }

    /// Picks an origin uniformly at random.
    pub fn choose(&self) -> Option<&str> {
        let mut rng = rand::thread_rng();
        self.origins.choose(&mut rng).map(String::as_str)
    }
}

/// Replaces the network location of `source_url` with `origin`, keeping
/// scheme, path, query and fragment. Scheme-less input is read as https.
pub fn rebase_on_origin(source_url: &str, origin: &str) -> LocateResult<String> {
    let invalid = |reason: String| LocateError::InvalidUrl {
        url: source_url.to_string(),
        reason,
    };
    let mut url = match Url::parse(source_url) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse(&format!("https://{}", source_url.trim_start_matches('/')))
                .map_err(|err| invalid(err.to_string()))?
        }
        Err(err) => return Err(invalid(err.to_string())),
    };

    let (host, port) = match origin.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) && !port.is_empty() => {
            let port = port
                .parse::<u16>()
                .map_err(|err| invalid(format!("origin port {port}: {err}")))?;
            (host, Some(port))
        }
        _ => (origin, None),
    };
    url.set_host(Some(host))
        .map_err(|err| invalid(format!("origin {origin}: {err}")))?;
    url.set_port(port)
        .map_err(|_| invalid(format!("origin {origin} cannot carry a port")))?;
    Ok(url.into())
}
