use thiserror::Error;

pub type LocateResult<T> = Result<T, LocateError>;

#[derive(Debug, Error)]
pub enum LocateError {
    #[error("invalid source url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("no mirror origins configured")]
    NoMirrors,
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("proxy returned status {status} for {url}")]
    Status { status: u16, url: String },
    #[error("invalid selector {selector}: {reason}")]
    Selector { selector: String, reason: String },
    #[error("embed element {selector} not found")]
    MissingEmbed { selector: String },
    #[error("embed element {selector} has no src attribute")]
    MissingSrc { selector: String },
}
