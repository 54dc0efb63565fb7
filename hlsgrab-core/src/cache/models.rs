use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub key: String,
    pub source_url: String,
    pub manifest_urls: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl ManifestEntry {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let raw_urls: String = row.get("manifest_urls")?;
        let manifest_urls = serde_json::from_str(&raw_urls).map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(err),
            )
        })?;
        let updated_at: NaiveDateTime = row.get("updated_at")?;
        Ok(Self {
            key: row.get("key")?,
            source_url: row.get("source_url")?,
            manifest_urls,
            updated_at: DateTime::from_naive_utc_and_offset(updated_at, Utc),
        })
    }
}

/// Drops repeated URLs while keeping first-seen order.
pub fn dedup_urls<I>(urls: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = std::collections::HashSet::new();
    urls.into_iter()
        .filter(|url| seen.insert(url.clone()))
        .collect()
}
