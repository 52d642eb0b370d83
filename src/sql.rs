//! SQL statement helpers.
//!
//! Two jobs: folding dashboard-wide ad-hoc filters into a query's `WHERE`
//! clause, and inspecting the select list to decide how search hits should
//! be shaped into a frame.

use serde::Deserialize;
use sqlparser::ast::{BinaryOperator, Expr, Select, SelectItem, SetExpr, Statement};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::{Parser, ParserError};
use thiserror::Error;

/// Raw SQL starting with this prefix is a stream-listing command
/// (`\dt <stream type>`), not a statement to parse.
pub const STREAM_LIST_PREFIX: &str = "\\dt";

/// An ad-hoc filter applied dashboard-wide, independent of the query text.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct AdHocFilter {
    pub key: String,
    pub value: String,
    pub operator: String,
}

#[derive(Debug, Error)]
pub enum SqlError {
    #[error("unsupported filter operator: {0}")]
    UnsupportedOperator(String),
    #[error("failed to parse SQL: {0}")]
    Parse(#[from] ParserError),
    #[error("not a SELECT statement: {0}")]
    NotSelect(String),
}

/// Maps a dashboard filter operator to its SQL spelling.
fn sql_operator(operator: &str) -> Option<&'static str> {
    match operator {
        "=" => Some("="),
        "!=" => Some("<>"),
        "=~" => Some("~"),
        "!~" => Some("!~"),
        "<" => Some("<"),
        ">" => Some(">"),
        _ => None,
    }
}

/// Filter values wrapped as `number(N)` compare as bare numerics rather
/// than quoted strings.
fn numeric_value(value: &str) -> Option<&str> {
    value
        .strip_prefix("number(")
        .and_then(|v| v.strip_suffix(')'))
        .filter(|v| !v.is_empty())
}

fn render_predicate(filter: &AdHocFilter) -> Result<String, SqlError> {
    let operator = sql_operator(&filter.operator)
        .ok_or_else(|| SqlError::UnsupportedOperator(filter.operator.clone()))?;
    let value = match numeric_value(&filter.value) {
        Some(n) => n.to_string(),
        None => format!("'{}'", filter.value.replace('\'', "''")),
    };
    Ok(format!("{} {} {}", filter.key, operator, value))
}

fn parse_predicate(sql: &str) -> Result<Expr, SqlError> {
    let dialect = GenericDialect {};
    let mut parser = Parser::new(&dialect).try_with_sql(sql)?;
    Ok(parser.parse_expr()?)
}

fn select_mut(statement: &mut Statement) -> Result<&mut Select, SqlError> {
    let Statement::Query(query) = statement else {
        return Err(SqlError::NotSelect(statement.to_string()));
    };
    match query.body.as_mut() {
        SetExpr::Select(select) => Ok(select.as_mut()),
        other => Err(SqlError::NotSelect(other.to_string())),
    }
}

/// Appends every ad-hoc filter to the statement's `WHERE` clause with `AND`.
///
/// Stream-listing commands pass through untouched, as does SQL with no
/// filters to apply. Errors are reported to the caller, which falls back to
/// the raw SQL so that an unparseable query still reaches the backend
/// verbatim.
pub fn complete_sql_with_filters(
    raw_sql: &str,
    filters: &[AdHocFilter],
) -> Result<String, SqlError> {
    if raw_sql.starts_with(STREAM_LIST_PREFIX) || filters.is_empty() {
        return Ok(raw_sql.to_string());
    }

    let dialect = GenericDialect {};
    let mut statements = Parser::parse_sql(&dialect, raw_sql)?;
    let statement = statements
        .first_mut()
        .ok_or_else(|| SqlError::NotSelect(raw_sql.to_string()))?;
    let select = select_mut(statement)?;

    for filter in filters {
        let predicate = parse_predicate(&render_predicate(filter)?)?;
        select.selection = Some(match select.selection.take() {
            Some(existing) => Expr::BinaryOp {
                left: Box::new(existing),
                op: BinaryOperator::And,
                right: Box::new(predicate),
            },
            None => predicate,
        });
    }

    Ok(statement.to_string())
}

/// The select list of a query, as far as frame shaping is concerned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SelectColumns {
    /// `SELECT *`: hits are rendered whole, in log mode.
    All,
    /// An explicit column list, in select-list order. Aliased expressions
    /// appear under their alias, matching the keys of the returned hits.
    Columns(Vec<String>),
}

/// Extracts the selected column names from a SQL statement.
pub fn select_columns(raw_sql: &str) -> Result<SelectColumns, SqlError> {
    let dialect = GenericDialect {};
    let mut statements = Parser::parse_sql(&dialect, raw_sql)?;
    let statement = statements
        .first_mut()
        .ok_or_else(|| SqlError::NotSelect(raw_sql.to_string()))?;
    let select = select_mut(statement)?;

    let mut columns = Vec::with_capacity(select.projection.len());
    for item in &select.projection {
        match item {
            SelectItem::Wildcard(_) => columns.push("*".to_string()),
            SelectItem::QualifiedWildcard(..) => columns.push(item.to_string()),
            SelectItem::UnnamedExpr(expr) => columns.push(expr.to_string()),
            SelectItem::ExprWithAlias { alias, .. } => columns.push(alias.value.clone()),
        }
    }

    if columns == ["*"] {
        return Ok(SelectColumns::All);
    }
    Ok(SelectColumns::Columns(columns))
}
