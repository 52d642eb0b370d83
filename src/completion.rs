//! SQL completion metadata for the query editor.
//!
//! The editor asks for two kinds of candidates while the user types:
//! stream (table) names after `FROM`, and column names inside the select
//! list or `WHERE` clause. Both are resolved from a [`StreamMetadata`]
//! snapshot fetched for the active organization and stream type.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Stream and column names for one organization and stream type.
///
/// Keys are stream names; values are the stream's column names in schema
/// order. Keys are unique within one fetch. The map serializes to the
/// `{"stream": ["column", ...]}` shape served by the streams resource
/// endpoint.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamMetadata(BTreeMap<String, Vec<String>>);

impl StreamMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the column names for a stream, replacing any previous entry.
    pub fn insert(&mut self, stream: impl Into<String>, columns: Vec<String>) {
        self.0.insert(stream.into(), columns);
    }

    /// Stream names available for completion, sorted lexicographically.
    ///
    /// Keys are unique within one fetch, so no further deduplication is
    /// needed.
    pub fn resolve_tables(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    /// Column candidates for `table`, deduplicated by name and sorted.
    ///
    /// An absent table resolves to an empty list rather than an error; the
    /// editor shows no suggestions and the user keeps typing.
    pub fn resolve_columns(&self, table: &str) -> Vec<CompletionCandidate> {
        let Some(columns) = self.0.get(table) else {
            return Vec::new();
        };
        let names: BTreeSet<&str> = columns.iter().map(String::as_str).collect();
        names.into_iter().map(CompletionCandidate::column).collect()
    }
}

impl FromIterator<(String, Vec<String>)> for StreamMetadata {
    fn from_iter<I: IntoIterator<Item = (String, Vec<String>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A single autocomplete suggestion handed to the editor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionCandidate {
    pub name: String,
    pub label: String,
    pub value: String,
    #[serde(rename = "type")]
    pub value_type: String,
}

impl CompletionCandidate {
    fn column(name: &str) -> Self {
        Self {
            name: name.to_string(),
            label: name.to_string(),
            value: name.to_string(),
            value_type: "string".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn sample() -> StreamMetadata {
        [
            (
                "http_logs".to_string(),
                vec!["ts".to_string(), "status".to_string(), "body".to_string()],
            ),
            (
                "app_logs".to_string(),
                vec!["ts".to_string(), "level".to_string()],
            ),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn tables_are_sorted() {
        assert_eq!(sample().resolve_tables(), vec!["app_logs", "http_logs"]);
    }

    #[test]
    fn tables_of_empty_metadata() {
        assert_eq!(StreamMetadata::new().resolve_tables(), Vec::<String>::new());
    }

    #[test]
    fn columns_are_sorted_by_name() {
        let names: Vec<String> = sample()
            .resolve_columns("http_logs")
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["body", "status", "ts"]);
    }

    #[test]
    fn columns_of_absent_table_are_empty() {
        assert_eq!(sample().resolve_columns("nope"), Vec::new());
    }

    #[test]
    fn duplicate_columns_are_deduplicated() {
        let mut metadata = StreamMetadata::new();
        metadata.insert(
            "dupes",
            vec!["b".to_string(), "a".to_string(), "b".to_string()],
        );
        let names: Vec<String> = metadata
            .resolve_columns("dupes")
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn candidates_carry_editor_fields() {
        let mut metadata = StreamMetadata::new();
        metadata.insert("s", vec!["col".to_string()]);
        assert_eq!(
            metadata.resolve_columns("s"),
            vec![CompletionCandidate {
                name: "col".to_string(),
                label: "col".to_string(),
                value: "col".to_string(),
                value_type: "string".to_string(),
            }],
        );
    }

    #[test]
    fn metadata_round_trips_as_plain_object() {
        let decoded: StreamMetadata = serde_json::from_value(serde_json::json!({
            "http_logs": ["ts", "status", "body"],
            "app_logs": ["ts", "level"],
        }))
        .unwrap();
        assert_eq!(decoded, sample());
    }
}
