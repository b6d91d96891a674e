//! One-time fetch of the upstream record history.

use shared::{EmptySequence, Record, RecordSequence};
use thiserror::Error;
use url::Url;

use crate::config::Config;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid upstream url: {0}")]
    Url(#[from] url::ParseError),
    #[error("upstream request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("upstream returned {0}")]
    Status(reqwest::StatusCode),
    #[error("upstream body is not a JSON array of objects: {0}")]
    Decode(#[source] reqwest::Error),
    #[error("upstream returned no records")]
    Empty(#[from] EmptySequence),
}

/// GET `{upstream_url}?limit={upstream_limit}` and decode the body into a record sequence.
///
/// An empty array is an error: there would be nothing to replay.
pub async fn fetch_records(config: &Config) -> Result<RecordSequence, FetchError> {
    let url = history_url(&config.upstream_url, config.upstream_limit)?;
    let client = reqwest::Client::builder()
        .timeout(config.upstream_timeout)
        .build()
        .map_err(FetchError::Request)?;
    let res = client
        .get(url)
        .send()
        .await
        .map_err(FetchError::Request)?;
    if !res.status().is_success() {
        return Err(FetchError::Status(res.status()));
    }
    let objects: Vec<serde_json::Map<String, serde_json::Value>> =
        res.json().await.map_err(FetchError::Decode)?;
    let records = objects
        .into_iter()
        .map(|obj| Record(serde_json::Value::Object(obj)))
        .collect();
    Ok(RecordSequence::new(records)?)
}

/// `base` with its `limit` parameter set to `limit`; other query parameters are kept.
pub fn history_url(base: &str, limit: u32) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(base)?;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "limit")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("limit", &limit.to_string());
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_appended() {
        let url = history_url("https://example.test/v2/history", 100).unwrap();
        assert_eq!(url.as_str(), "https://example.test/v2/history?limit=100");
    }

    #[test]
    fn existing_limit_is_replaced_and_other_params_kept() {
        let url = history_url("https://example.test/v2/history?limit=5&codes=551&limit=7", 100)
            .unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("codes".to_string(), "551".to_string()),
                ("limit".to_string(), "100".to_string()),
            ]
        );
    }

    #[test]
    fn malformed_base_is_rejected() {
        assert!(history_url("not a url", 100).is_err());
    }
}
