//! Query execution: each data query is searched, shaped into a frame, and
//! answered in request order.

use futures_util::stream::FuturesOrdered;
use grafana_plugin_sdk::backend::{self, DataQuery};
use grafana_plugin_sdk::data::Frame;
use thiserror::Error;
use tracing::debug;

use crate::client::{Client, ClientError};
use crate::frames::{self, FrameError};
use crate::query::{InvalidQuery, SearchQueryModel};
use crate::sql::{self, SqlError, STREAM_LIST_PREFIX};
use crate::{DatasourceSettings, OpenObserveJsonData, OpenObserveSecureJsonData, OpenObservePlugin, SettingsError};

/// Stream types with dedicated search handling; any other query type takes
/// the fallback path used by variable queries.
const SEARCH_QUERY_TYPES: [&str; 3] = ["logs", "metrics", "traces"];

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("datasource instance settings are missing for query {ref_id}")]
    MissingInstanceSettings { ref_id: String },
    #[error("invalid datasource configuration for query {ref_id}: {source}")]
    Settings {
        source: SettingsError,
        ref_id: String,
    },
    #[error("query {ref_id} failed validation: {source}")]
    Invalid { source: InvalidQuery, ref_id: String },
    #[error("cannot parse SQL of query {ref_id}: {source}")]
    Sql { source: SqlError, ref_id: String },
    #[error("invalid stream list command in query {ref_id}: {reason}")]
    StreamListCommand { reason: String, ref_id: String },
    #[error("search failed for query {ref_id}: {source}")]
    Search { source: ClientError, ref_id: String },
    #[error("cannot shape response of query {ref_id}: {source}")]
    Frame { source: FrameError, ref_id: String },
    #[error("invalid frame for query {ref_id}: {source}")]
    InvalidFrame {
        source: grafana_plugin_sdk::data::Error,
        ref_id: String,
    },
}

impl backend::DataQueryError for QueryError {
    fn ref_id(self) -> String {
        match self {
            Self::MissingInstanceSettings { ref_id }
            | Self::Settings { ref_id, .. }
            | Self::Invalid { ref_id, .. }
            | Self::Sql { ref_id, .. }
            | Self::StreamListCommand { ref_id, .. }
            | Self::Search { ref_id, .. }
            | Self::Frame { ref_id, .. }
            | Self::InvalidFrame { ref_id, .. } => ref_id,
        }
    }

    fn status(&self) -> backend::DataQueryStatus {
        match self {
            Self::MissingInstanceSettings { .. }
            | Self::Settings { .. }
            | Self::Sql { .. }
            | Self::StreamListCommand { .. } => backend::DataQueryStatus::BadRequest,
            Self::Invalid { .. } => backend::DataQueryStatus::ValidationFailed,
            Self::Search { source, .. } => match source {
                ClientError::Transport(error) if error.is_timeout() => {
                    backend::DataQueryStatus::Timeout
                }
                _ => backend::DataQueryStatus::BadGateway,
            },
            Self::Frame { .. } | Self::InvalidFrame { .. } => backend::DataQueryStatus::Internal,
        }
    }
}

#[tonic::async_trait]
impl backend::DataService for OpenObservePlugin {
    type Query = SearchQueryModel;
    type QueryError = QueryError;
    type Stream = backend::BoxDataResponseStream<Self::QueryError>;

    async fn query_data(
        &self,
        request: backend::QueryDataRequest<Self::Query, Self>,
    ) -> Self::Stream {
        let instance_settings = request.plugin_context.instance_settings;
        Box::pin(
            request
                .queries
                .into_iter()
                .map(|query| {
                    let plugin = self.clone();
                    let instance_settings = instance_settings.clone();
                    async move { plugin.run_query(instance_settings, query).await }
                })
                .collect::<FuturesOrdered<_>>(),
        )
    }
}

impl OpenObservePlugin {
    async fn run_query(
        &self,
        instance_settings: Option<
            backend::DataSourceInstanceSettings<OpenObserveJsonData, OpenObserveSecureJsonData>,
        >,
        query: DataQuery<SearchQueryModel>,
    ) -> Result<backend::DataResponse, QueryError> {
        let ref_id = query.ref_id.clone();
        debug!(%ref_id, query_type = %query.query_type, "handling data query");

        if !query.query.should_execute() {
            return Ok(backend::DataResponse::new(ref_id, vec![]));
        }
        query.query.validate().map_err(|source| QueryError::Invalid {
            source,
            ref_id: ref_id.clone(),
        })?;

        let instance_settings =
            instance_settings.ok_or_else(|| QueryError::MissingInstanceSettings {
                ref_id: ref_id.clone(),
            })?;
        let settings =
            DatasourceSettings::from_instance(&instance_settings).map_err(|source| {
                QueryError::Settings {
                    source,
                    ref_id: ref_id.clone(),
                }
            })?;
        let client = self.client(&settings);

        let frame = if SEARCH_QUERY_TYPES.contains(&query.query_type.as_str()) {
            search_query(&client, &settings.organization, &query).await?
        } else {
            fallback_query(&client, &settings.organization, &query).await?
        };
        let checked = frame.check().map_err(|source| QueryError::InvalidFrame {
            source,
            ref_id: ref_id.clone(),
        })?;
        Ok(backend::DataResponse::new(ref_id, vec![checked]))
    }
}

async fn search_query(
    client: &Client,
    organization: &str,
    query: &DataQuery<SearchQueryModel>,
) -> Result<Frame, QueryError> {
    let ref_id = &query.ref_id;
    let (params, request) = query.query.prepare(
        organization,
        query.time_range.from.timestamp_micros(),
        query.time_range.to.timestamp_micros(),
    );
    let columns = sql::select_columns(&request.query.sql).map_err(|source| QueryError::Sql {
        source,
        ref_id: ref_id.clone(),
    })?;
    let response = client
        .search(&params, &request)
        .await
        .map_err(|source| QueryError::Search {
            source,
            ref_id: ref_id.clone(),
        })?;
    frames::search_frame(&columns, &response).map_err(|source| QueryError::Frame {
        source,
        ref_id: ref_id.clone(),
    })
}

/// Queries without a registered type come from the variable editor: `\dt`
/// commands list streams, anything else is searched as usual.
async fn fallback_query(
    client: &Client,
    organization: &str,
    query: &DataQuery<SearchQueryModel>,
) -> Result<Frame, QueryError> {
    if query.query.raw_sql.starts_with(STREAM_LIST_PREFIX) {
        return stream_list_query(client, organization, query).await;
    }
    search_query(client, organization, query).await
}

async fn stream_list_query(
    client: &Client,
    organization: &str,
    query: &DataQuery<SearchQueryModel>,
) -> Result<Frame, QueryError> {
    let ref_id = &query.ref_id;
    let stream_type = parse_stream_list_command(&query.query.raw_sql).map_err(|reason| {
        QueryError::StreamListCommand {
            reason,
            ref_id: ref_id.clone(),
        }
    })?;
    let streams = client
        .list_streams(organization, stream_type)
        .await
        .map_err(|source| QueryError::Search {
            source,
            ref_id: ref_id.clone(),
        })?;
    Ok(frames::stream_list_frame(&streams))
}

/// Parses a `\dt <stream_type>` command into its stream type.
fn parse_stream_list_command(raw_sql: &str) -> Result<&str, String> {
    let parts: Vec<&str> = raw_sql.split(' ').collect();
    if parts.len() != 2 || parts[0] != STREAM_LIST_PREFIX {
        return Err(format!(
            "expected \\dt <stream_type>, got {raw_sql:?}"
        ));
    }
    let stream_type = parts[1];
    if !SEARCH_QUERY_TYPES.contains(&stream_type) {
        return Err(format!(
            "unknown stream type {stream_type:?}, expected one of logs, metrics, traces"
        ));
    }
    Ok(stream_type)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn stream_list_commands_name_a_stream_type() {
        assert_eq!(parse_stream_list_command("\\dt logs"), Ok("logs"));
        assert_eq!(parse_stream_list_command("\\dt traces"), Ok("traces"));
    }

    #[test]
    fn stream_list_commands_need_exactly_one_argument() {
        assert!(parse_stream_list_command("\\dt").is_err());
        assert!(parse_stream_list_command("\\dt logs extra").is_err());
    }

    #[test]
    fn unknown_stream_types_are_rejected() {
        assert!(parse_stream_list_command("\\dt events").is_err());
    }
}
