//! The resource endpoint backing editor completion.
//!
//! `GET /openobserve/streams?organization=<org>&type=<stream type>` answers
//! with a JSON object mapping each stream name to its column names.

use bytes::Bytes;
use grafana_plugin_sdk::backend;
use http::Response;
use thiserror::Error;
use tracing::debug;
use url::form_urlencoded;

use crate::client::ClientError;
use crate::query::DEFAULT_STREAM_TYPE;
use crate::{DatasourceSettings, OpenObservePlugin, SettingsError, DEFAULT_ORGANIZATION};

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("datasource instance settings are missing")]
    MissingInstanceSettings,
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("failed to list streams: {0}")]
    ListStreams(#[from] ClientError),
    #[error("no resource at {0}")]
    NotFound(String),
    #[error("failed to encode stream metadata: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] http::Error),
}

impl backend::ErrIntoHttpResponse for ResourceError {
    fn into_http_response(self) -> Result<Response<Bytes>, Box<dyn std::error::Error>> {
        let status = match &self {
            Self::MissingInstanceSettings | Self::Settings(_) => http::StatusCode::BAD_REQUEST,
            Self::NotFound(_) => http::StatusCode::NOT_FOUND,
            // A failed OpenObserve call is a downstream failure, not ours.
            Self::ListStreams(_) => http::StatusCode::BAD_GATEWAY,
            Self::Encode(_) | Self::Http(_) => http::StatusCode::INTERNAL_SERVER_ERROR,
        };
        Ok(Response::builder()
            .status(status)
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(Bytes::from(serde_json::to_vec(
                &serde_json::json!({"error": self.to_string()}),
            )?))?)
    }
}

#[tonic::async_trait]
impl backend::ResourceService for OpenObservePlugin {
    type Error = ResourceError;
    type InitialResponse = Response<Bytes>;
    type Stream = backend::BoxResourceStream<Self::Error>;

    async fn call_resource(
        &self,
        r: backend::CallResourceRequest<Self>,
    ) -> Result<(Self::InitialResponse, Self::Stream), Self::Error> {
        match r.request.uri().path() {
            "/openobserve/streams" => {
                let instance_settings = r
                    .plugin_context
                    .instance_settings
                    .as_ref()
                    .ok_or(ResourceError::MissingInstanceSettings)?;
                let settings = DatasourceSettings::from_instance(instance_settings)?;
                let (organization, stream_type) = stream_query_params(r.request.uri().query());
                debug!(%organization, %stream_type, "listing streams for completion");

                let metadata = self
                    .client(&settings)
                    .stream_metadata(&organization, &stream_type)
                    .await?;
                let response = Response::builder()
                    .header(http::header::CONTENT_TYPE, "application/json")
                    .body(Bytes::from(serde_json::to_vec(&metadata)?))?;
                Ok((response, Box::pin(futures::stream::empty()) as Self::Stream))
            }
            other => Err(ResourceError::NotFound(other.to_string())),
        }
    }
}

/// Organization and stream type from the query string, with the endpoint
/// defaults filling absent or empty parameters.
fn stream_query_params(query: Option<&str>) -> (String, String) {
    let mut organization = DEFAULT_ORGANIZATION.to_string();
    let mut stream_type = DEFAULT_STREAM_TYPE.to_string();
    for (key, value) in form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
        if value.is_empty() {
            continue;
        }
        match key.as_ref() {
            "organization" => organization = value.into_owned(),
            "type" => stream_type = value.into_owned(),
            _ => {}
        }
    }
    (organization, stream_type)
}
