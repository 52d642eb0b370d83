//! The query model edited in the panel and its translation into search
//! requests.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::client::{SearchParams, SearchQuery, SearchRequest, SEARCH_TYPE_UI};
use crate::sql::{self, AdHocFilter};
use crate::variables;

/// Stream type assumed when a query does not name one.
pub const DEFAULT_STREAM_TYPE: &str = "logs";
/// Result-set size applied when a query does not set one.
pub const DEFAULT_SIZE: i64 = 200;
/// Server-side search timeout in seconds.
pub const SEARCH_TIMEOUT_SECS: i64 = 60;

/// A rejected query. Never produced today; [`SearchQueryModel::validate`]
/// is the extension point for future syntax checks.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("invalid query: {reason}")]
pub struct InvalidQuery {
    pub reason: String,
}

/// One query as the frontend serializes it. Absent fields decode to their
/// defaults and are merged with the fixed query defaults in [`prepare`].
///
/// [`prepare`]: SearchQueryModel::prepare
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchQueryModel {
    pub query_type: String,
    pub search_type: String,
    pub use_cache: Option<bool>,
    #[serde(rename = "enableSSE")]
    pub enable_sse: Option<bool>,
    pub raw_sql: String,
    pub from: i64,
    pub size: Option<i64>,
    pub adhoc_filters: Vec<AdHocFilter>,
}

impl SearchQueryModel {
    /// Whether this query is complete enough to execute. Empty SQL is not
    /// an error, execution is simply suppressed.
    pub fn should_execute(&self) -> bool {
        !self.raw_sql.is_empty()
    }

    pub fn validate(&self) -> Result<(), InvalidQuery> {
        Ok(())
    }

    /// Rewrites the SQL with the current variable bindings and attaches the
    /// dashboard's ad-hoc filters.
    pub fn apply_template_variables(
        mut self,
        bindings: &HashMap<String, Value>,
        filters: Vec<AdHocFilter>,
    ) -> Self {
        if let Some(sql) = variables::substitute(Some(&self.raw_sql), bindings) {
            self.raw_sql = sql;
        }
        self.adhoc_filters = filters;
        self
    }

    /// The stream type queried, defaulting to logs.
    pub fn stream_type(&self) -> &str {
        if self.query_type.is_empty() {
            DEFAULT_STREAM_TYPE
        } else {
            &self.query_type
        }
    }

    fn search_type(&self) -> &str {
        if self.search_type.is_empty() {
            SEARCH_TYPE_UI
        } else {
            &self.search_type
        }
    }

    /// Builds the request actually sent: defaults merged, the time range in
    /// microseconds, ad-hoc filters folded into the SQL. SQL the parser
    /// cannot handle is sent as written rather than failing the query.
    pub fn prepare(
        &self,
        organization: &str,
        start_time: i64,
        end_time: i64,
    ) -> (SearchParams, SearchRequest) {
        let sql = match sql::complete_sql_with_filters(&self.raw_sql, &self.adhoc_filters) {
            Ok(sql) => sql,
            Err(error) => {
                warn!(%error, sql = %self.raw_sql, "ad-hoc filter completion failed, sending raw SQL");
                self.raw_sql.clone()
            }
        };

        let params = SearchParams {
            organization: organization.to_string(),
            stream_type: self.stream_type().to_string(),
            search_type: self.search_type().to_string(),
            use_cache: self.use_cache.unwrap_or(true),
            enable_sse: self.enable_sse.unwrap_or(true),
        };
        let request = SearchRequest {
            query: SearchQuery {
                sql,
                start_time,
                end_time,
                from: self.from,
                size: self.size.unwrap_or(DEFAULT_SIZE),
            },
            search_type: params.search_type.clone(),
            timeout: SEARCH_TIMEOUT_SECS,
        };
        (params, request)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    const START: i64 = 1_700_000_000_000_000;
    const END: i64 = 1_700_000_060_000_000;

    #[test]
    fn decodes_the_frontend_shape() {
        let model: SearchQueryModel = serde_json::from_value(json!({
            "queryType": "logs",
            "searchType": "ui",
            "useCache": false,
            "enableSSE": true,
            "rawSql": "select * from http_logs",
            "from": 10,
            "size": 50,
            "adhocFilters": [{"key": "status", "value": "500", "operator": "="}],
        }))
        .unwrap();
        assert_eq!(model.query_type, "logs");
        assert_eq!(model.use_cache, Some(false));
        assert_eq!(model.enable_sse, Some(true));
        assert_eq!(model.from, 10);
        assert_eq!(model.size, Some(50));
        assert_eq!(model.adhoc_filters.len(), 1);
    }

    #[test]
    fn omitted_fields_take_defaults() {
        let model: SearchQueryModel =
            serde_json::from_value(json!({"rawSql": "select 1"})).unwrap();
        let (params, request) = model.prepare("default", START, END);
        assert_eq!(params.stream_type, "logs");
        assert_eq!(params.search_type, "ui");
        assert!(params.use_cache);
        assert!(params.enable_sse);
        assert_eq!(request.query.size, 200);
        assert_eq!(request.query.from, 0);
        assert_eq!(request.search_type, "ui");
        assert_eq!(request.timeout, 60);
    }

    #[test]
    fn explicit_values_survive_the_default_merge() {
        let model: SearchQueryModel = serde_json::from_value(json!({
            "queryType": "metrics",
            "useCache": false,
            "enableSSE": false,
            "rawSql": "select 1",
            "size": 50,
        }))
        .unwrap();
        let (params, request) = model.prepare("default", START, END);
        assert_eq!(params.stream_type, "metrics");
        assert!(!params.use_cache);
        assert!(!params.enable_sse);
        assert_eq!(request.query.size, 50);
    }

    #[test]
    fn time_range_lands_in_the_request_body() {
        let model = SearchQueryModel {
            raw_sql: "select 1".to_string(),
            ..Default::default()
        };
        let (_, request) = model.prepare("default", START, END);
        assert_eq!(request.query.start_time, START);
        assert_eq!(request.query.end_time, END);
    }

    #[test]
    fn empty_sql_suppresses_execution() {
        let empty = SearchQueryModel::default();
        assert!(!empty.should_execute());
        let model = SearchQueryModel {
            raw_sql: "select 1".to_string(),
            ..Default::default()
        };
        assert!(model.should_execute());
    }

    #[test]
    fn validation_is_an_open_extension_point() {
        assert_eq!(SearchQueryModel::default().validate(), Ok(()));
    }

    #[test]
    fn template_variables_rewrite_sql_and_attach_filters() {
        let model = SearchQueryModel {
            raw_sql: "select * from t where code in ($codes)".to_string(),
            ..Default::default()
        };
        let bindings = HashMap::from([("codes".to_string(), json!([500, 502]))]);
        let filters = vec![AdHocFilter {
            key: "k".to_string(),
            value: "v".to_string(),
            operator: "=".to_string(),
        }];
        let model = model.apply_template_variables(&bindings, filters.clone());
        assert_eq!(model.raw_sql, "select * from t where code in (500,502)");
        assert_eq!(model.adhoc_filters, filters);
    }

    #[test]
    fn no_supplied_filters_means_an_empty_list() {
        let model = SearchQueryModel {
            adhoc_filters: vec![AdHocFilter::default()],
            ..Default::default()
        };
        let model = model.apply_template_variables(&HashMap::new(), Vec::new());
        assert_eq!(model.adhoc_filters, Vec::new());
    }

    #[test]
    fn filters_are_folded_into_the_sql() {
        let model = SearchQueryModel {
            raw_sql: "select * from http_logs".to_string(),
            adhoc_filters: vec![AdHocFilter {
                key: "status".to_string(),
                value: "number(500)".to_string(),
                operator: "=".to_string(),
            }],
            ..Default::default()
        };
        let (_, request) = model.prepare("default", START, END);
        assert_eq!(request.query.sql, "SELECT * FROM http_logs WHERE status = 500");
    }

    #[test]
    fn unparseable_sql_is_sent_as_written() {
        let model = SearchQueryModel {
            raw_sql: "definitely not sql".to_string(),
            adhoc_filters: vec![AdHocFilter {
                key: "k".to_string(),
                value: "v".to_string(),
                operator: "=".to_string(),
            }],
            ..Default::default()
        };
        let (_, request) = model.prepare("default", START, END);
        assert_eq!(request.query.sql, "definitely not sql");
    }

    #[test]
    fn stream_list_commands_pass_through_untouched() {
        let model = SearchQueryModel {
            raw_sql: "\\dt logs".to_string(),
            adhoc_filters: vec![AdHocFilter {
                key: "k".to_string(),
                value: "v".to_string(),
                operator: "=".to_string(),
            }],
            ..Default::default()
        };
        let (_, request) = model.prepare("default", START, END);
        assert_eq!(request.query.sql, "\\dt logs");
    }
}
