use thiserror::Error;

use crate::row_key::{RowPredicate, SqlLiteral};
use crate::sort::SortSpec;

pub const BROWSE_ROW_LIMIT: usize = 200;

pub const SHOW_TABLES_SQL: &str = "SHOW TABLES";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SqlBuildError {
    #[error("table name cannot be empty")]
    EmptyTableName,
    #[error("column name cannot be empty")]
    EmptyColumnName,
}

/// Free-text WHERE fragment typed by the operator.
///
/// The text is spliced into the statement verbatim and never escaped. An
/// invalid fragment surfaces as a store error.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawFilter(String);

impl RawFilter {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

#[must_use]
pub fn quote_identifier(identifier: &str) -> String {
    format!("`{}`", identifier.replace('`', "``"))
}

pub(crate) fn quote_sql_string(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
}

fn table_sql(table: &str) -> Result<String, SqlBuildError> {
    if table.trim().is_empty() {
        return Err(SqlBuildError::EmptyTableName);
    }
    Ok(quote_identifier(table))
}

fn column_sql(column: &str) -> Result<String, SqlBuildError> {
    if column.trim().is_empty() {
        return Err(SqlBuildError::EmptyColumnName);
    }
    Ok(quote_identifier(column))
}

pub fn browse_sql(
    table: &str,
    filter: &RawFilter,
    sort: Option<&SortSpec>,
) -> Result<String, SqlBuildError> {
    let mut sql = format!("SELECT * FROM {}", table_sql(table)?);

    if !filter.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(filter.as_str().trim());
    }

    if let Some(sort) = sort {
        let direction = if sort.ascending { "ASC" } else { "DESC" };
        sql.push_str(&format!(" ORDER BY {} {direction}", column_sql(&sort.column)?));
    }

    sql.push_str(&format!(" LIMIT {BROWSE_ROW_LIMIT}"));
    Ok(sql)
}

pub fn describe_table_sql(table: &str) -> Result<String, SqlBuildError> {
    Ok(format!("DESCRIBE {}", table_sql(table)?))
}

pub fn show_index_sql(table: &str) -> Result<String, SqlBuildError> {
    Ok(format!("SHOW INDEX FROM {}", table_sql(table)?))
}

pub fn update_cell_sql(
    table: &str,
    column: &str,
    value: &SqlLiteral,
    predicate: &RowPredicate,
) -> Result<String, SqlBuildError> {
    Ok(format!(
        "UPDATE {} SET {} = {} WHERE {} LIMIT 1",
        table_sql(table)?,
        column_sql(column)?,
        value.as_sql(),
        predicate.as_sql()
    ))
}

pub fn delete_row_sql(table: &str, predicate: &RowPredicate) -> Result<String, SqlBuildError> {
    Ok(format!(
        "DELETE FROM {} WHERE {} LIMIT 1",
        table_sql(table)?,
        predicate.as_sql()
    ))
}
