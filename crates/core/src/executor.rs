use thiserror::Error;

use crate::connection::{LiveConnection, RawCell, ResultSet, StoreBackend, StoreError};
use crate::records::{CellValue, Record};
use crate::sql_builder::BROWSE_ROW_LIMIT;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{source}")]
pub struct QueryError {
    sql: String,
    #[source]
    source: StoreError,
}

impl QueryError {
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    #[must_use]
    pub fn message(&self) -> &str {
        self.source.message()
    }
}

pub struct RowExecutor<'a, B: StoreBackend> {
    connection: &'a mut LiveConnection<B>,
}

impl<'a, B: StoreBackend> RowExecutor<'a, B> {
    pub fn new(connection: &'a mut LiveConnection<B>) -> Self {
        Self { connection }
    }

    pub async fn execute(&mut self, sql: &str) -> Result<Vec<Record>, QueryError> {
        self.execute_capped(sql, BROWSE_ROW_LIMIT).await
    }

    pub async fn execute_capped(
        &mut self,
        sql: &str,
        max_rows: usize,
    ) -> Result<Vec<Record>, QueryError> {
        let result = self
            .connection
            .query(sql, max_rows)
            .await
            .map_err(|source| QueryError {
                sql: sql.to_string(),
                source,
            })?;

        let records = decode_records(result, max_rows);
        tracing::debug!(rows = records.len(), "decoded records");
        Ok(records)
    }

    pub async fn execute_statement(&mut self, sql: &str) -> Result<u64, QueryError> {
        self.connection
            .execute(sql)
            .await
            .map_err(|source| QueryError {
                sql: sql.to_string(),
                source,
            })
    }
}

/// Pairs each row's cells with the statement's column names by position.
/// Rows shorter than the header are padded with NULL; extra cells are dropped.
#[must_use]
pub fn decode_records(result: ResultSet, max_rows: usize) -> Vec<Record> {
    let ResultSet { columns, rows } = result;

    rows.into_iter()
        .take(max_rows)
        .map(|row| {
            let mut cells = row.into_iter();
            columns
                .iter()
                .map(|column| {
                    let value = cells.next().map_or(CellValue::Null, decode_cell);
                    (column.clone(), value)
                })
                .collect()
        })
        .collect()
}

fn decode_cell(cell: RawCell) -> CellValue {
    match cell {
        RawCell::Null => CellValue::Null,
        RawCell::Text(text) => CellValue::Text(text),
        RawCell::Bytes(bytes) => match String::from_utf8(bytes) {
            Ok(text) => CellValue::Text(text),
            Err(error) => CellValue::Text(String::from_utf8_lossy(error.as_bytes()).into_owned()),
        },
    }
}
