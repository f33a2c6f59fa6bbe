use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::models::common::EntityType;

use super::{RecordPage, RecordSource};

/// HTTP client for the platform's Data API.
///
/// Every object type is exposed as `GET {base}/{type}?cursor=N&limit=M`
/// behind bearer-token auth. Responses wrap the page in a `response`
/// envelope carrying `results`, `count` (page size), and `remaining`
/// (records past this page). An optional `constraints` parameter filters
/// by modification time for incremental syncs.
pub struct DataApiClient {
    base_url: String,
    api_key: String,
    http: Client,
}

impl DataApiClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> crate::error::Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http,
        })
    }

    /// Create a client with a custom reqwest::Client (useful for testing).
    pub fn with_http_client(base_url: &str, api_key: &str, http: Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http,
        }
    }

    fn modified_constraint(since: &DateTime<Utc>) -> String {
        serde_json::json!([{
            "key": "Modified Date",
            "constraint_type": "greater than",
            "value": since.to_rfc3339(),
        }])
        .to_string()
    }
}

fn classify_status(status: StatusCode, body: &str) -> FetchError {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        FetchError::Auth(format!("status {status}: {body}"))
    } else if status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
    {
        FetchError::Transient(format!("status {status}: {body}"))
    } else {
        FetchError::Malformed(format!("unexpected status {status}: {body}"))
    }
}

#[async_trait]
impl RecordSource for DataApiClient {
    async fn fetch_page(
        &self,
        entity_type: EntityType,
        offset: u64,
        limit: u32,
        modified_since: Option<DateTime<Utc>>,
    ) -> std::result::Result<RecordPage, FetchError> {
        let url = format!("{}/{}", self.base_url, entity_type.api_path());
        debug!(%url, offset, limit, "fetching page");

        let mut request = self
            .http
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .query(&[("cursor", offset.to_string()), ("limit", limit.to_string())]);
        if let Some(since) = &modified_since {
            request = request.query(&[("constraints", Self::modified_constraint(since))]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, entity = %entity_type, "source request failed");
            return Err(classify_status(status, &body));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Transient(e.to_string()))?;
        let value: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| FetchError::Malformed(format!("invalid JSON: {e}")))?;

        let envelope = value
            .get("response")
            .ok_or_else(|| FetchError::Malformed("missing response envelope".into()))?;
        let records = envelope
            .get("results")
            .and_then(|v| v.as_array())
            .ok_or_else(|| FetchError::Malformed("missing results array".into()))?
            .clone();
        let count = envelope
            .get("count")
            .and_then(|v| v.as_u64())
            .unwrap_or(records.len() as u64);
        let remaining = envelope
            .get("remaining")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);

        Ok(RecordPage {
            records,
            total_count: Some(offset + count + remaining),
            has_more: remaining > 0,
        })
    }

    fn supports_modified_filter(&self) -> bool {
        true
    }
}
