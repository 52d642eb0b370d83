//! HTTP client for the OpenObserve search and stream APIs.
//!
//! All calls are single-attempt with HTTP basic auth; the shared
//! [`reqwest::Client`] enforces the request timeout. Responses are decoded
//! into typed shapes so that a malformed payload surfaces as an error
//! instead of silently producing wrong data.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::completion::StreamMetadata;

/// Search type reported to OpenObserve for queries issued from the UI.
pub const SEARCH_TYPE_UI: &str = "ui";

/// Timeout applied to every OpenObserve request.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// An error talking to OpenObserve. Every variant means the backend was
/// unavailable or unusable; callers degrade (empty completions, failed
/// health check) rather than abort.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request to OpenObserve failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("OpenObserve returned {status}: {body}")]
    Status {
        status: http::StatusCode,
        body: String,
    },
    #[error("failed to decode OpenObserve response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("no search_response_hits event in SSE response")]
    MissingSseHits,
}

/// Query-string parameters of a search call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchParams {
    pub organization: String,
    pub stream_type: String,
    pub search_type: String,
    pub use_cache: bool,
    /// Use the SSE endpoint (`_search_stream`) instead of `_search`.
    pub enable_sse: bool,
}

/// Body of a search call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SearchRequest {
    pub query: SearchQuery,
    pub search_type: String,
    pub timeout: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SearchQuery {
    pub sql: String,
    /// Start of the queried range, microseconds since the epoch.
    pub start_time: i64,
    /// End of the queried range, microseconds since the epoch.
    pub end_time: i64,
    pub from: i64,
    pub size: i64,
}

/// A search result. Fields OpenObserve omits decode to their defaults.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub took: i64,
    #[serde(default)]
    pub hits: Vec<Map<String, Value>>,
    #[serde(default)]
    pub total: i64,
    #[serde(default)]
    pub from: i64,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub scan_size: i64,
    #[serde(default)]
    pub trace_id: String,
    #[serde(default)]
    pub is_partial: bool,
}

/// One stream returned by the stream-listing API.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct StreamInfo {
    pub name: String,
    #[serde(default)]
    pub storage_type: String,
    #[serde(default)]
    pub stream_type: String,
    #[serde(default)]
    pub schema: Vec<SchemaField>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(default, rename = "type")]
    pub data_type: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ListStreamsResponse {
    #[serde(default)]
    pub list: Vec<StreamInfo>,
}

impl From<ListStreamsResponse> for StreamMetadata {
    fn from(response: ListStreamsResponse) -> Self {
        let mut metadata = StreamMetadata::new();
        for stream in response.list {
            let columns = stream.schema.into_iter().map(|field| field.name).collect();
            metadata.insert(stream.name, columns);
        }
        metadata
    }
}

/// A configured OpenObserve endpoint.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Client {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            base_url,
            username: username.into(),
            password: password.into(),
        }
    }

    /// Runs a search, over SSE or the regular endpoint depending on
    /// `params.enable_sse`.
    pub async fn search(
        &self,
        params: &SearchParams,
        request: &SearchRequest,
    ) -> Result<SearchResponse, ClientError> {
        let endpoint = if params.enable_sse {
            "_search_stream"
        } else {
            "_search"
        };
        let url = format!(
            "{}/api/{}/{}",
            self.base_url, params.organization, endpoint
        );
        debug!(
            %url,
            sql = %request.query.sql,
            stream_type = %params.stream_type,
            sse = params.enable_sse,
            "executing search",
        );

        let mut builder = self
            .http
            .post(&url)
            .query(&[
                ("search_type", params.search_type.clone()),
                ("type", params.stream_type.clone()),
                ("use_cache", params.use_cache.to_string()),
            ])
            .basic_auth(&self.username, Some(&self.password))
            .json(request);
        if params.enable_sse {
            builder = builder.header(http::header::ACCEPT, "text/event-stream");
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status { status, body });
        }

        if params.enable_sse {
            let body = response.text().await?;
            let search = parse_sse_search_response(&body)?;
            debug!(hits = search.hits.len(), "SSE search completed");
            Ok(search)
        } else {
            let search: SearchResponse = response.json().await?;
            debug!(hits = search.hits.len(), took = search.took, "search completed");
            Ok(search)
        }
    }

    /// Lists the streams of one organization and stream type, including
    /// their schemas.
    pub async fn list_streams(
        &self,
        organization: &str,
        stream_type: &str,
    ) -> Result<ListStreamsResponse, ClientError> {
        let url = format!("{}/api/{}/streams", self.base_url, organization);
        let response = self
            .http
            .get(&url)
            .query(&[
                ("type", stream_type),
                ("sort", "name"),
                ("asc", "true"),
                ("fetchSchema", "true"),
            ])
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status { status, body });
        }
        Ok(response.json().await?)
    }

    /// Fetches stream metadata for completion: one round trip, no retry.
    pub async fn stream_metadata(
        &self,
        organization: &str,
        stream_type: &str,
    ) -> Result<StreamMetadata, ClientError> {
        let streams = self.list_streams(organization, stream_type).await?;
        Ok(streams.into())
    }

    /// Checks that the configured endpoint answers authenticated requests.
    pub async fn health_check(&self) -> Result<(), ClientError> {
        let url = format!("{}/api/clusters", self.base_url);
        let response = self
            .http
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status { status, body });
        }
        Ok(())
    }
}

/// Extracts the search result from an SSE body: the payload is the `data:`
/// line following the `search_response_hits` event.
fn parse_sse_search_response(body: &str) -> Result<SearchResponse, ClientError> {
    let mut lines = body.lines();
    while let Some(line) = lines.next() {
        if line.starts_with("event: search_response_hits") {
            let data = lines.next().ok_or(ClientError::MissingSseHits)?;
            let payload = data.strip_prefix("data: ").unwrap_or(data);
            return Ok(serde_json::from_str(payload)?);
        }
    }
    Err(ClientError::MissingSseHits)
}
