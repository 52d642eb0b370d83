//! Search responses shaped into Grafana data frames.
//!
//! Wildcard selects render as a logs frame (time, body, labels); explicit
//! select lists render as one field per selected column, in select-list
//! order. Column names containing `gf_time` are decoded as timestamps.

use chrono::{DateTime, NaiveDateTime, Utc};
use grafana_plugin_sdk::data::{Field, Frame, Metadata, VisType};
use grafana_plugin_sdk::prelude::*;
use serde_json::Value;
use thiserror::Error;

use crate::client::{ListStreamsResponse, SearchResponse};
use crate::sql::SelectColumns;

const FRAME_NAME: &str = "openobserve_data_frame";

/// Format of string-valued `gf_time` cells.
const TIME_CELL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("timestamp {micros}us is out of range")]
    OutOfRangeTimestamp { micros: i64 },
    #[error("cannot decode {value} in column {column} as a time")]
    InvalidTime { column: String, value: String },
    #[error("failed to encode hit as JSON: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Shapes a search result according to the query's select list.
pub fn search_frame(
    columns: &SelectColumns,
    response: &SearchResponse,
) -> Result<Frame, FrameError> {
    match columns {
        SelectColumns::All => log_frame(response),
        SelectColumns::Columns(columns) if columns.is_empty() => log_frame(response),
        SelectColumns::Columns(columns) => table_frame(columns, response),
    }
}

/// Shapes a stream listing as a single sorted `stream` field.
pub fn stream_list_frame(response: &ListStreamsResponse) -> Frame {
    let mut names: Vec<String> = response.list.iter().map(|s| s.name.clone()).collect();
    names.sort();
    Frame::new(FRAME_NAME).with_field(names.into_field("stream"))
}

fn log_frame(response: &SearchResponse) -> Result<Frame, FrameError> {
    let rows = log_rows(response)?;

    let mut times = Vec::with_capacity(rows.len());
    let mut bodies = Vec::with_capacity(rows.len());
    let mut labels = Vec::with_capacity(rows.len());
    for (micros, body) in rows {
        let time = DateTime::from_timestamp_micros(micros)
            .ok_or(FrameError::OutOfRangeTimestamp { micros })?;
        times.push(time);
        labels.push(body.clone());
        bodies.push(body);
    }

    let mut meta = Metadata::default();
    meta.preferred_visualisation = Some(VisType::Logs);
    Ok(Frame::new(FRAME_NAME)
        .with_metadata(meta)
        .with_field(times.into_field("time"))
        .with_field(bodies.into_field("body"))
        .with_field(labels.into_field("labels")))
}

/// Flattens hits into (timestamp, JSON body) rows, newest first. A hit
/// without a numeric `_timestamp` sorts as time zero.
fn log_rows(response: &SearchResponse) -> Result<Vec<(i64, String)>, FrameError> {
    let mut rows = Vec::with_capacity(response.hits.len());
    for hit in &response.hits {
        let micros = hit
            .get("_timestamp")
            .and_then(Value::as_f64)
            .map(|v| v as i64)
            .unwrap_or(0);
        // Map keys serialize in sorted order, keeping bodies stable across
        // responses that list the same fields differently.
        let body = serde_json::to_string(hit)?;
        rows.push((micros, body));
    }
    rows.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(rows)
}

fn table_frame(columns: &[String], response: &SearchResponse) -> Result<Frame, FrameError> {
    let mut frame = Frame::new(FRAME_NAME);
    if response.hits.is_empty() {
        return Ok(frame);
    }
    for column in columns {
        let cells: Vec<Option<&Value>> = response
            .hits
            .iter()
            .map(|hit| match hit.get(column) {
                Some(Value::Null) | None => None,
                Some(value) => Some(value),
            })
            .collect();
        let field = if column.contains("gf_time") {
            time_column(column, &cells)?.into_field(column.as_str())
        } else {
            shape_column(&cells).into_field(column.as_str())
        };
        frame = frame.with_field(field);
    }
    Ok(frame)
}

/// One table column, unified to a single element type.
enum ColumnCells {
    Numbers(Vec<f64>),
    Bools(Vec<bool>),
    Strings(Vec<String>),
}

impl ColumnCells {
    fn into_field(self, name: &str) -> Field {
        match self {
            Self::Numbers(values) => values.into_field(name),
            Self::Bools(values) => values.into_field(name),
            Self::Strings(values) => values.into_field(name),
        }
    }
}

/// The column's type follows its last present value; cells of any other
/// type (and absent cells) become that type's zero value, so every field
/// stays uniformly typed.
fn shape_column(cells: &[Option<&Value>]) -> ColumnCells {
    let last = cells.iter().rev().find_map(|cell| *cell);
    match last {
        Some(Value::Number(_)) => ColumnCells::Numbers(
            cells
                .iter()
                .map(|cell| cell.and_then(Value::as_f64).unwrap_or(0.0))
                .collect(),
        ),
        Some(Value::Bool(_)) => ColumnCells::Bools(
            cells
                .iter()
                .map(|cell| cell.and_then(Value::as_bool).unwrap_or(false))
                .collect(),
        ),
        Some(Value::Array(_)) | Some(Value::Object(_)) => ColumnCells::Strings(
            cells
                .iter()
                .map(|cell| match cell {
                    Some(value @ (Value::Array(_) | Value::Object(_))) => value.to_string(),
                    _ => String::new(),
                })
                .collect(),
        ),
        _ => ColumnCells::Strings(
            cells
                .iter()
                .map(|cell| {
                    cell.and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_default()
                })
                .collect(),
        ),
    }
}

/// Decodes a `gf_time` column: strings in [`TIME_CELL_FORMAT`], numbers as
/// microseconds since the epoch truncated to milliseconds.
fn time_column(
    column: &str,
    cells: &[Option<&Value>],
) -> Result<Vec<DateTime<Utc>>, FrameError> {
    cells
        .iter()
        .map(|cell| {
            let invalid = || FrameError::InvalidTime {
                column: column.to_string(),
                value: cell.map_or_else(|| "null".to_string(), Value::to_string),
            };
            match cell {
                Some(Value::String(s)) => NaiveDateTime::parse_from_str(s, TIME_CELL_FORMAT)
                    .map(|dt| dt.and_utc())
                    .map_err(|_| invalid()),
                Some(Value::Number(n)) => {
                    let micros = n.as_f64().ok_or_else(invalid)? as i64;
                    DateTime::from_timestamp_millis(micros / 1000).ok_or_else(invalid)
                }
                _ => Err(invalid()),
            }
        })
        .collect()
}
