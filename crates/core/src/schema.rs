use thiserror::Error;

use crate::connection::{LiveConnection, StoreBackend};
use crate::executor::{QueryError, RowExecutor};
use crate::records::{CellValue, Record};
use crate::row_key::base_type;
use crate::sql_builder::{describe_table_sql, show_index_sql, SqlBuildError, SHOW_TABLES_SQL};

const METADATA_ROW_LIMIT: usize = usize::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyRole {
    Primary,
    Unique,
    Indexed,
    #[default]
    None,
}

impl KeyRole {
    #[must_use]
    pub fn from_flag(flag: &str) -> Self {
        match flag.trim().to_ascii_uppercase().as_str() {
            "PRI" => Self::Primary,
            "UNI" => Self::Unique,
            "MUL" => Self::Indexed,
            _ => Self::None,
        }
    }

    #[must_use]
    pub fn as_flag(self) -> &'static str {
        match self {
            Self::Primary => "PRI",
            Self::Unique => "UNI",
            Self::Indexed => "MUL",
            Self::None => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub key_role: KeyRole,
    pub default_value: Option<String>,
    pub extra: String,
}

impl Column {
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            key_role: KeyRole::None,
            default_value: None,
            extra: String::new(),
        }
    }

    #[must_use]
    pub fn with_key_role(mut self, key_role: KeyRole) -> Self {
        self.key_role = key_role;
        self
    }

    #[must_use]
    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    #[must_use]
    pub fn with_default(mut self, default_value: impl Into<String>) -> Self {
        self.default_value = Some(default_value.into());
        self
    }

    #[must_use]
    pub fn base_type(&self) -> String {
        base_type(&self.data_type)
    }

    #[must_use]
    pub fn structure_cells(&self) -> [String; 6] {
        let default_value = match (&self.default_value, self.nullable) {
            (Some(value), _) => value.clone(),
            (None, true) => "NULL".to_string(),
            (None, false) => String::new(),
        };

        [
            self.name.clone(),
            self.data_type.clone(),
            if self.nullable { "YES" } else { "NO" }.to_string(),
            self.key_role.as_flag().to_string(),
            default_value,
            self.extra.clone(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRow {
    pub cells: Vec<String>,
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to list tables: {source}")]
    StoreUnavailable {
        #[source]
        source: QueryError,
    },
    #[error("failed to describe `{table}`: {source}")]
    Describe {
        table: String,
        #[source]
        source: QueryError,
    },
    #[error("failed to read indexes of `{table}`: {source}")]
    Indexes {
        table: String,
        #[source]
        source: QueryError,
    },
    #[error("table `{table}` reported no columns")]
    NoColumns { table: String },
    #[error("column metadata for `{table}` is missing `{field}`")]
    MissingField { table: String, field: &'static str },
    #[error(transparent)]
    Sql(#[from] SqlBuildError),
}

pub struct SchemaInspector<'a, B: StoreBackend> {
    executor: RowExecutor<'a, B>,
}

impl<'a, B: StoreBackend> SchemaInspector<'a, B> {
    pub fn new(connection: &'a mut LiveConnection<B>) -> Self {
        Self {
            executor: RowExecutor::new(connection),
        }
    }

    pub async fn list_tables(&mut self) -> Result<Vec<String>, SchemaError> {
        let records = self
            .executor
            .execute_capped(SHOW_TABLES_SQL, METADATA_ROW_LIMIT)
            .await
            .map_err(|source| SchemaError::StoreUnavailable { source })?;

        Ok(records
            .iter()
            .filter_map(|record| record.value_at(0).and_then(CellValue::as_text))
            .map(ToString::to_string)
            .collect())
    }

    pub async fn get_columns(&mut self, table: &str) -> Result<Vec<Column>, SchemaError> {
        let sql = describe_table_sql(table)?;
        let records = self
            .executor
            .execute_capped(&sql, METADATA_ROW_LIMIT)
            .await
            .map_err(|source| SchemaError::Describe {
                table: table.to_string(),
                source,
            })?;

        if records.is_empty() {
            return Err(SchemaError::NoColumns {
                table: table.to_string(),
            });
        }

        records
            .iter()
            .map(|record| column_from_record(table, record))
            .collect()
    }

    pub async fn get_indexes(&mut self, table: &str) -> Result<Vec<IndexRow>, SchemaError> {
        let sql = show_index_sql(table)?;
        let records = self
            .executor
            .execute_capped(&sql, METADATA_ROW_LIMIT)
            .await
            .map_err(|source| SchemaError::Indexes {
                table: table.to_string(),
                source,
            })?;

        let Some(first) = records.first() else {
            return Ok(Vec::new());
        };

        let header = IndexRow {
            cells: first.column_names().map(ToString::to_string).collect(),
        };
        Ok(std::iter::once(header)
            .chain(records.iter().map(|record| IndexRow {
                cells: record
                    .iter()
                    .map(|(_, value)| value.display().to_string())
                    .collect(),
            }))
            .collect())
    }
}

fn column_from_record(table: &str, record: &Record) -> Result<Column, SchemaError> {
    let required = |field: &'static str| {
        record
            .get(field)
            .and_then(CellValue::as_text)
            .ok_or_else(|| SchemaError::MissingField {
                table: table.to_string(),
                field,
            })
    };
    let optional = |field: &'static str| {
        record
            .get(field)
            .and_then(CellValue::as_text)
            .unwrap_or_default()
    };

    Ok(Column {
        name: required("Field")?.to_string(),
        data_type: required("Type")?.to_string(),
        nullable: optional("Null").eq_ignore_ascii_case("YES"),
        key_role: KeyRole::from_flag(optional("Key")),
        default_value: record
            .get("Default")
            .and_then(CellValue::as_text)
            .map(ToString::to_string),
        extra: optional("Extra").to_string(),
    })
}
