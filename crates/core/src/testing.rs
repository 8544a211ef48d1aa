use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::connection::{RawCell, ResultSet, StoreBackend, StoreError};
use crate::connections::Connection;
use crate::sql_builder::{describe_table_sql, show_index_sql, SHOW_TABLES_SQL};

pub(crate) fn row(cells: &[Option<&str>]) -> Vec<Option<String>> {
    cells
        .iter()
        .map(|cell| cell.map(ToString::to_string))
        .collect()
}

#[derive(Debug, Clone)]
struct FakeColumn {
    name: String,
    binary: bool,
}

#[derive(Debug, Default)]
struct FakeState {
    tables: Vec<String>,
    columns: HashMap<String, Vec<FakeColumn>>,
    results: HashMap<String, VecDeque<ResultSet>>,
    affected: HashMap<String, u64>,
    failures: HashMap<String, String>,
    statements: Vec<String>,
    fail_connect: bool,
    fail_ping: bool,
    connect_calls: usize,
    disconnect_calls: usize,
}

impl FakeState {
    fn result_set(&self, table: &str, rows: Vec<Vec<Option<String>>>) -> ResultSet {
        let columns = self.columns.get(table).cloned().unwrap_or_default();
        ResultSet {
            columns: columns.iter().map(|column| column.name.clone()).collect(),
            rows: rows
                .into_iter()
                .map(|row| {
                    columns
                        .iter()
                        .zip(row)
                        .map(|(column, cell)| match cell {
                            None => RawCell::Null,
                            Some(value) if column.binary => RawCell::Bytes(value.into_bytes()),
                            Some(value) => RawCell::Text(value),
                        })
                        .collect()
                })
                .collect(),
        }
    }

    fn queue(&mut self, sql: String, result: ResultSet) {
        self.results.entry(sql).or_default().push_back(result);
    }

    fn check(&mut self, sql: &str) -> Result<(), StoreError> {
        self.statements.push(sql.to_string());
        match self.failures.get(sql) {
            Some(message) => Err(StoreError::new(message.clone())),
            None => Ok(()),
        }
    }
}

/// Answers each statement with the responses queued for its exact text. A
/// statement with several queued results consumes them in order and then
/// keeps answering with the last one.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeBackend {
    state: Arc<Mutex<FakeState>>,
}

#[derive(Debug)]
pub(crate) struct FakeHandle;

impl FakeBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queues the metadata and plain browse results of a table. Columns are
    /// `(name, type, key flag)`.
    pub(crate) fn with_table(
        self,
        name: &str,
        columns: &[(&str, &str, &str)],
        rows: Vec<Vec<Option<String>>>,
    ) -> Self {
        {
            let mut state = self.lock();
            state.tables.push(name.to_string());
            state.columns.insert(
                name.to_string(),
                columns
                    .iter()
                    .map(|(column, data_type, _)| FakeColumn {
                        name: (*column).to_string(),
                        binary: data_type.contains("blob") || data_type.contains("binary"),
                    })
                    .collect(),
            );

            let tables = ResultSet {
                columns: vec!["Tables_in_fake".to_string()],
                rows: state
                    .tables
                    .iter()
                    .map(|table| vec![RawCell::Text(table.clone())])
                    .collect(),
            };
            state
                .results
                .insert(SHOW_TABLES_SQL.to_string(), VecDeque::from([tables]));

            let describe = describe_table_sql(name).expect("table name");
            state.queue(describe, describe_result(columns));
            let show_index = show_index_sql(name).expect("table name");
            state.queue(show_index, index_result(name, columns));
            let browse = state.result_set(name, rows);
            state.queue(format!("SELECT * FROM `{name}` LIMIT 200"), browse);
        }
        self
    }

    /// Queues a result for `sql`, shaped by the columns of `table`.
    pub(crate) fn respond(&self, sql: &str, table: &str, rows: Vec<Vec<Option<String>>>) {
        let mut state = self.lock();
        let result = state.result_set(table, rows);
        state.queue(sql.to_string(), result);
    }

    pub(crate) fn affect(&self, sql: &str, affected_rows: u64) {
        self.lock().affected.insert(sql.to_string(), affected_rows);
    }

    pub(crate) fn fail_statement(&self, sql: &str, message: &str) {
        self.lock()
            .failures
            .insert(sql.to_string(), message.to_string());
    }

    pub(crate) fn fail_connect(&self) {
        self.lock().fail_connect = true;
    }

    pub(crate) fn fail_ping(&self) {
        self.lock().fail_ping = true;
    }

    pub(crate) fn connect_calls(&self) -> usize {
        self.lock().connect_calls
    }

    pub(crate) fn disconnect_calls(&self) -> usize {
        self.lock().disconnect_calls
    }

    pub(crate) fn statements(&self) -> Vec<String> {
        self.lock().statements.clone()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake state poisoned")
    }
}

fn unexpected(sql: &str) -> StoreError {
    StoreError::new(format!("no response queued for `{sql}`"))
}

fn describe_result(columns: &[(&str, &str, &str)]) -> ResultSet {
    let rows = columns
        .iter()
        .map(|(name, data_type, key)| {
            let primary = *key == "PRI";
            let extra = if primary && data_type.contains("int") {
                "auto_increment"
            } else {
                ""
            };
            vec![
                RawCell::Text((*name).to_string()),
                RawCell::Text((*data_type).to_string()),
                RawCell::Text(if primary { "NO" } else { "YES" }.to_string()),
                RawCell::Text((*key).to_string()),
                RawCell::Null,
                RawCell::Text(extra.to_string()),
            ]
        })
        .collect();
    ResultSet {
        columns: ["Field", "Type", "Null", "Key", "Default", "Extra"]
            .map(ToString::to_string)
            .to_vec(),
        rows,
    }
}

fn index_result(table: &str, columns: &[(&str, &str, &str)]) -> ResultSet {
    let rows = columns
        .iter()
        .filter(|(_, _, key)| !key.is_empty())
        .map(|&(name, _, key)| {
            let key_name = if key == "PRI" { "PRIMARY" } else { name };
            let non_unique = if key == "MUL" { "1" } else { "0" };
            [table, non_unique, key_name, "1", name]
                .map(|cell| RawCell::Text(cell.to_string()))
                .to_vec()
        })
        .collect();
    ResultSet {
        columns: ["Table", "Non_unique", "Key_name", "Seq_in_index", "Column_name"]
            .map(ToString::to_string)
            .to_vec(),
        rows,
    }
}

#[async_trait]
impl StoreBackend for FakeBackend {
    type Handle = FakeHandle;

    async fn connect(&self, _connection: &Connection) -> Result<Self::Handle, StoreError> {
        let mut state = self.lock();
        state.connect_calls += 1;
        if state.fail_connect {
            return Err(StoreError::new("connection refused"));
        }
        Ok(FakeHandle)
    }

    async fn ping(&self, _handle: &mut Self::Handle) -> Result<(), StoreError> {
        if self.lock().fail_ping {
            return Err(StoreError::new("server has gone away"));
        }
        Ok(())
    }

    async fn query(
        &self,
        _handle: &mut Self::Handle,
        sql: &str,
        max_rows: usize,
    ) -> Result<ResultSet, StoreError> {
        let mut state = self.lock();
        state.check(sql)?;
        let queue = state.results.get_mut(sql).ok_or_else(|| unexpected(sql))?;
        let mut result = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
        .ok_or_else(|| unexpected(sql))?;
        result.rows.truncate(max_rows);
        Ok(result)
    }

    async fn execute(&self, _handle: &mut Self::Handle, sql: &str) -> Result<u64, StoreError> {
        let mut state = self.lock();
        state.check(sql)?;
        state.affected.get(sql).copied().ok_or_else(|| unexpected(sql))
    }

    async fn disconnect(&self, _handle: Self::Handle) -> Result<(), StoreError> {
        self.lock().disconnect_calls += 1;
        Ok(())
    }
}
