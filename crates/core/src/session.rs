use std::time::Duration;

use thiserror::Error;

use crate::connection::{
    ConnectionError, ConnectionStatus, LiveConnection, StoreBackend, StoreError,
};
use crate::connections::Connection;
use crate::executor::{QueryError, RowExecutor};
use crate::records::{CellValue, Record};
use crate::row_key::{typed_literal, EmptyRowIdentity, RowKeyResolver, ValueError};
use crate::schema::{Column, IndexRow, SchemaError, SchemaInspector};
use crate::sort::SortState;
use crate::sql_builder::{
    browse_sql, delete_row_sql, quote_identifier, update_cell_sql, RawFilter, SqlBuildError,
};

pub const STRUCTURE_HEADER: [&str; 6] = ["Field", "Type", "Null", "Key", "Default", "Extra"];

#[derive(Debug, Error)]
pub enum MutationError {
    #[error("row {row} is not displayed ({rows} rows)")]
    RowOutOfRange { row: usize, rows: usize },
    #[error("column {column} is not displayed ({columns} columns)")]
    ColumnOutOfRange { column: usize, columns: usize },
    #[error("refusing to modify `{table}`: {source}")]
    Refused {
        table: String,
        #[source]
        source: EmptyRowIdentity,
    },
    #[error(transparent)]
    InvalidValue(#[from] ValueError),
    #[error("{action} on `{table}` failed: {source}")]
    Store {
        table: String,
        action: &'static str,
        #[source]
        source: QueryError,
    },
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no table is selected")]
    NoTableSelected,
    #[error("`{table}` has no column `{column}`")]
    UnknownColumn { table: String, column: String },
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Mutation(#[from] MutationError),
    #[error(transparent)]
    Sql(#[from] SqlBuildError),
}

/// Which table is shown and how. Replaced as a whole, and only after the
/// store has answered for the new state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ViewState {
    pub table: Option<String>,
    pub filter: RawFilter,
    pub sort: SortState,
}

#[derive(Debug, Clone, Copy)]
pub struct RenderSnapshot<'a> {
    pub table: Option<&'a str>,
    pub columns: &'a [Column],
    pub records: &'a [Record],
    pub filter: &'a RawFilter,
    pub sort: &'a SortState,
    pub pending_delete: Option<usize>,
}

impl<'a> RenderSnapshot<'a> {
    #[must_use]
    pub fn header_labels(&self) -> Vec<String> {
        self.columns
            .iter()
            .map(|column| self.sort.header_label(&column.name))
            .collect()
    }

    #[must_use]
    pub fn cell(&self, row: usize, column: usize) -> Option<&'a CellValue> {
        self.records.get(row)?.value_at(column)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureView {
    pub columns: Vec<[String; 6]>,
    pub indexes: Vec<IndexRow>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    MarkedPending { row: usize },
    Deleted { affected_rows: u64 },
}

#[derive(Debug)]
pub struct BrowserSession<B: StoreBackend> {
    connection: LiveConnection<B>,
    resolver: RowKeyResolver,
    tables: Vec<String>,
    view: ViewState,
    columns: Vec<Column>,
    records: Vec<Record>,
    pending_delete: Option<PendingDelete>,
}

/// A marked row, held as its cells plus how many equal rows precede it so
/// that duplicates stay distinguishable.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingDelete {
    record: Record,
    occurrence: usize,
}

impl PendingDelete {
    fn at(records: &[Record], row: usize) -> Option<Self> {
        let record = records.get(row)?;
        let occurrence = records[..row]
            .iter()
            .filter(|earlier| *earlier == record)
            .count();
        Some(Self {
            record: record.clone(),
            occurrence,
        })
    }

    fn position(&self, records: &[Record]) -> Option<usize> {
        records
            .iter()
            .enumerate()
            .filter(|(_, record)| **record == self.record)
            .nth(self.occurrence)
            .map(|(index, _)| index)
    }
}

impl<B: StoreBackend> BrowserSession<B> {
    pub async fn open(backend: B, connection: Connection) -> Result<Self, ConnectionError> {
        let connection = LiveConnection::open(backend, connection).await?;
        Ok(Self::from_connection(connection))
    }

    #[must_use]
    pub fn from_connection(connection: LiveConnection<B>) -> Self {
        Self {
            connection,
            resolver: RowKeyResolver,
            tables: Vec::new(),
            view: ViewState::default(),
            columns: Vec::new(),
            records: Vec::new(),
            pending_delete: None,
        }
    }

    #[must_use]
    pub fn connection(&self) -> &Connection {
        self.connection.connection()
    }

    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    pub async fn health_check(&mut self) -> Result<Duration, StoreError> {
        self.connection.health_check().await
    }

    #[must_use]
    pub fn view(&self) -> &ViewState {
        &self.view
    }

    #[must_use]
    pub fn snapshot(&self) -> RenderSnapshot<'_> {
        RenderSnapshot {
            table: self.view.table.as_deref(),
            columns: &self.columns,
            records: &self.records,
            filter: &self.view.filter,
            sort: &self.view.sort,
            pending_delete: self.pending_delete_index(),
        }
    }

    #[must_use]
    pub fn pending_delete_index(&self) -> Option<usize> {
        self.pending_delete.as_ref()?.position(&self.records)
    }

    pub fn cancel_delete(&mut self) {
        self.pending_delete = None;
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn list_tables(&mut self) -> Result<&[String], SessionError> {
        self.tables = SchemaInspector::new(&mut self.connection)
            .list_tables()
            .await?;
        Ok(&self.tables)
    }

    #[must_use]
    pub fn table_names(&self, filter: &str) -> Vec<&str> {
        let needle = filter.trim().to_lowercase();
        let mut names = self
            .tables
            .iter()
            .map(String::as_str)
            .filter(|name| name.to_lowercase().contains(&needle))
            .collect::<Vec<_>>();
        names.sort_by_cached_key(|name| name.to_lowercase());
        names
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn select_table(&mut self, table: &str) -> Result<RenderSnapshot<'_>, SessionError> {
        let next = ViewState {
            table: Some(table.to_string()),
            ..ViewState::default()
        };
        self.render(next).await?;
        self.pending_delete = None;
        Ok(self.snapshot())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn apply_filter(&mut self, text: &str) -> Result<RenderSnapshot<'_>, SessionError> {
        self.require_table()?;
        let next = ViewState {
            filter: RawFilter::new(text),
            ..self.view.clone()
        };
        self.render(next).await?;
        Ok(self.snapshot())
    }

    pub async fn clear_filter(&mut self) -> Result<RenderSnapshot<'_>, SessionError> {
        self.apply_filter("").await
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn toggle_sort(&mut self, column: &str) -> Result<RenderSnapshot<'_>, SessionError> {
        let table = self.require_table()?;
        if !self.columns.iter().any(|candidate| candidate.name == column) {
            return Err(SessionError::UnknownColumn {
                table,
                column: column.to_string(),
            });
        }

        let next = ViewState {
            sort: self.view.sort.toggled(column),
            ..self.view.clone()
        };
        self.render(next).await?;
        Ok(self.snapshot())
    }

    pub async fn clear_sort(&mut self) -> Result<RenderSnapshot<'_>, SessionError> {
        self.require_table()?;
        let next = ViewState {
            sort: SortState::Unsorted,
            ..self.view.clone()
        };
        self.render(next).await?;
        Ok(self.snapshot())
    }

    pub async fn refresh(&mut self) -> Result<RenderSnapshot<'_>, SessionError> {
        self.require_table()?;
        self.render(self.view.clone()).await?;
        Ok(self.snapshot())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn update_cell(
        &mut self,
        row: usize,
        column: usize,
        value: CellValue,
    ) -> Result<u64, SessionError> {
        let table = self.require_table()?;
        let record = self.record_at(row)?;
        let target = self
            .columns
            .get(column)
            .ok_or(MutationError::ColumnOutOfRange {
                column,
                columns: self.columns.len(),
            })?;

        let predicate = self
            .resolver
            .resolve(&self.columns, record)
            .map_err(|source| MutationError::Refused {
                table: table.clone(),
                source,
            })?;
        let literal = typed_literal(target, &value).map_err(MutationError::from)?;
        let sql = update_cell_sql(&table, &target.name, &literal, &predicate)?;

        let affected_rows = RowExecutor::new(&mut self.connection)
            .execute_statement(&sql)
            .await
            .map_err(|source| MutationError::Store {
                table: table.clone(),
                action: "update",
                source,
            })?;
        tracing::info!(table = %table, affected_rows, "updated cell");

        self.pending_delete = None;
        self.render(self.view.clone()).await?;
        Ok(affected_rows)
    }

    /// Two-step delete. The first call marks the row and a second call on the
    /// marked row deletes it. Rows without an identity are refused before
    /// anything reaches the store.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn delete_row(&mut self, row: usize) -> Result<DeleteOutcome, SessionError> {
        let table = self.require_table()?;
        let record = self.record_at(row)?;

        let predicate = match self.resolver.resolve(&self.columns, record) {
            Ok(predicate) => predicate,
            Err(source) => {
                self.pending_delete = None;
                tracing::warn!(table = %table, row, "delete refused, row has no identity");
                return Err(MutationError::Refused { table, source }.into());
            }
        };

        if self.pending_delete_index() != Some(row) {
            self.pending_delete = PendingDelete::at(&self.records, row);
            return Ok(DeleteOutcome::MarkedPending { row });
        }

        let sql = delete_row_sql(&table, &predicate)?;
        let affected_rows = RowExecutor::new(&mut self.connection)
            .execute_statement(&sql)
            .await
            .map_err(|source| MutationError::Store {
                table: table.clone(),
                action: "delete",
                source,
            })?;
        tracing::info!(table = %table, affected_rows, "deleted row");

        self.pending_delete = None;
        self.render(self.view.clone()).await?;
        Ok(DeleteOutcome::Deleted { affected_rows })
    }

    pub async fn structure(&mut self, filter: &str) -> Result<StructureView, SessionError> {
        let table = self.require_table()?;
        let indexes = SchemaInspector::new(&mut self.connection)
            .get_indexes(&table)
            .await?;

        let needle = filter.trim().to_lowercase();
        let columns = self
            .columns
            .iter()
            .filter(|column| column.name.to_lowercase().contains(&needle))
            .map(Column::structure_cells)
            .collect();
        Ok(StructureView { columns, indexes })
    }

    #[must_use]
    pub fn filter_suggestions(&self, text: &str) -> Vec<&str> {
        let Some(last_word) = text.split_whitespace().last() else {
            return Vec::new();
        };
        let needle = last_word
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .collect::<String>()
            .to_lowercase();

        self.columns
            .iter()
            .map(|column| column.name.as_str())
            .filter(|name| name.to_lowercase().contains(&needle))
            .collect()
    }

    #[must_use]
    pub fn filter_template(&self, column: usize) -> Option<String> {
        self.columns
            .get(column)
            .map(|column| format!("{} = ", quote_identifier(&column.name)))
    }

    pub async fn close(self) -> Result<(), StoreError> {
        self.connection.close().await
    }

    fn require_table(&self) -> Result<String, SessionError> {
        self.view
            .table
            .clone()
            .ok_or(SessionError::NoTableSelected)
    }

    fn record_at(&self, row: usize) -> Result<&Record, MutationError> {
        self.records.get(row).ok_or(MutationError::RowOutOfRange {
            row,
            rows: self.records.len(),
        })
    }

    /// Fetches columns and records for `next` and commits all three together.
    /// On error the current view is left untouched.
    async fn render(&mut self, next: ViewState) -> Result<(), SessionError> {
        let table = next.table.as_deref().ok_or(SessionError::NoTableSelected)?;
        let columns = SchemaInspector::new(&mut self.connection)
            .get_columns(table)
            .await?;
        let sql = browse_sql(table, &next.filter, next.sort.spec().as_ref())?;
        let records = RowExecutor::new(&mut self.connection).execute(&sql).await?;
        tracing::debug!(table, rows = records.len(), "rendered table");

        self.view = next;
        self.columns = columns;
        self.records = records;
        Ok(())
    }
}

#[must_use]
pub fn apply_suggestion(text: &str, suggestion: &str) -> String {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut current_is_word = false;

    for ch in text.chars() {
        let is_word = ch.is_alphanumeric() || ch == '_';
        if ch.is_whitespace() || (!current.is_empty() && is_word != current_is_word) {
            if !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
            if ch.is_whitespace() {
                continue;
            }
        }
        current_is_word = is_word;
        current.push(ch);
    }
    if !current.is_empty() {
        parts.push(current);
    }

    let suggestion = suggestion.trim().to_string();
    match parts.last_mut() {
        Some(last) => *last = suggestion,
        None => parts.push(suggestion),
    }
    parts.join(" ")
}
