use thiserror::Error;

use crate::records::{CellValue, Record};
use crate::schema::{Column, KeyRole};
use crate::sql_builder::{quote_identifier, quote_sql_string};

const OPAQUE_TYPES: &[&str] = &[
    "tinytext",
    "text",
    "mediumtext",
    "longtext",
    "tinyblob",
    "blob",
    "mediumblob",
    "longblob",
    "json",
    "datetime",
    "timestamp",
    "binary",
    "varbinary",
    "bit",
    "geometry",
    "point",
    "linestring",
    "polygon",
    "multipoint",
    "multilinestring",
    "multipolygon",
    "geometrycollection",
    "float",
    "double",
    "real",
];

const INTEGER_TYPES: &[&str] = &[
    "tinyint",
    "smallint",
    "mediumint",
    "int",
    "integer",
    "bigint",
    "year",
];

const DECIMAL_TYPES: &[&str] = &["decimal", "numeric", "dec", "fixed", "float", "double", "real"];

/// Whether equality on a column of this declared type reliably matches the
/// displayed text. Large, binary, spatial, approximate and timestamp-like
/// types are not.
#[must_use]
pub fn is_eligible(data_type: &str) -> bool {
    !OPAQUE_TYPES.contains(&base_type(data_type).as_str())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NumericKind {
    Integer,
    Decimal,
}

fn numeric_kind(data_type: &str) -> Option<NumericKind> {
    let base = base_type(data_type);
    if INTEGER_TYPES.contains(&base.as_str()) {
        Some(NumericKind::Integer)
    } else if DECIMAL_TYPES.contains(&base.as_str()) {
        Some(NumericKind::Decimal)
    } else {
        None
    }
}

pub(crate) fn base_type(data_type: &str) -> String {
    data_type
        .trim()
        .split(|ch: char| ch == '(' || ch.is_whitespace())
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

fn looks_integer(text: &str) -> bool {
    let digits = text.strip_prefix(['-', '+']).unwrap_or(text);
    !digits.is_empty() && digits.chars().all(|ch| ch.is_ascii_digit())
}

fn looks_numeric(text: &str) -> bool {
    let unsigned = text.strip_prefix(['-', '+']).unwrap_or(text);
    let (mantissa, exponent) = match unsigned.split_once(['e', 'E']) {
        Some((mantissa, exponent)) => (mantissa, Some(exponent)),
        None => (unsigned, None),
    };

    let mut parts = mantissa.splitn(2, '.');
    let whole = parts.next().unwrap_or_default();
    let fraction = parts.next().unwrap_or_default();
    let digits_only = |part: &str| part.chars().all(|ch| ch.is_ascii_digit());

    let mantissa_ok = !(whole.is_empty() && fraction.is_empty())
        && digits_only(whole)
        && digits_only(fraction);
    let exponent_ok = exponent.map_or(true, |exponent| {
        let exponent = exponent.strip_prefix(['-', '+']).unwrap_or(exponent);
        !exponent.is_empty() && digits_only(exponent)
    });

    mantissa_ok && exponent_ok
}

fn literal_for(data_type: &str, text: &str) -> String {
    if numeric_kind(data_type).is_some() && looks_numeric(text) {
        text.to_string()
    } else {
        quote_sql_string(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowIdentity {
    PrimaryKey,
    FullRow,
}

/// A conjunctive WHERE predicate that targets one displayed row.
///
/// Only [`RowKeyResolver`] builds these, so a predicate is never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowPredicate {
    sql: String,
    identity: RowIdentity,
    terms: usize,
}

impl RowPredicate {
    #[must_use]
    pub fn as_sql(&self) -> &str {
        &self.sql
    }

    #[must_use]
    pub fn identity(&self) -> RowIdentity {
        self.identity
    }

    #[must_use]
    pub fn term_count(&self) -> usize {
        self.terms
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlLiteral(String);

impl SqlLiteral {
    #[must_use]
    pub fn as_sql(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("row has no eligible non-blank column to identify it")]
pub struct EmptyRowIdentity;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("`{value}` does not fit column `{column}` of type {data_type}")]
    NotNumeric {
        column: String,
        data_type: String,
        value: String,
    },
    #[error("column `{column}` does not accept NULL")]
    NotNullable { column: String },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RowKeyResolver;

impl RowKeyResolver {
    pub fn resolve(
        &self,
        columns: &[Column],
        record: &Record,
    ) -> Result<RowPredicate, EmptyRowIdentity> {
        if let Some(terms) = primary_key_terms(columns, record) {
            return Ok(RowPredicate {
                terms: terms.len(),
                sql: terms.join(" AND "),
                identity: RowIdentity::PrimaryKey,
            });
        }

        let terms = columns
            .iter()
            .filter(|column| is_eligible(&column.data_type))
            .filter_map(|column| {
                let text = record.get(&column.name)?.as_text()?;
                (!text.is_empty()).then(|| equality_term(column, text))
            })
            .collect::<Vec<_>>();

        if terms.is_empty() {
            return Err(EmptyRowIdentity);
        }

        Ok(RowPredicate {
            terms: terms.len(),
            sql: terms.join(" AND "),
            identity: RowIdentity::FullRow,
        })
    }
}

fn primary_key_terms(columns: &[Column], record: &Record) -> Option<Vec<String>> {
    let keys = columns
        .iter()
        .filter(|column| column.key_role == KeyRole::Primary)
        .collect::<Vec<_>>();
    if keys.is_empty() {
        return None;
    }

    keys.into_iter()
        .map(|column| {
            if !is_eligible(&column.data_type) {
                return None;
            }
            let text = record.get(&column.name)?.as_text()?;
            (!text.is_empty()).then(|| equality_term(column, text))
        })
        .collect()
}

fn equality_term(column: &Column, text: &str) -> String {
    format!(
        "{} = {}",
        quote_identifier(&column.name),
        literal_for(&column.data_type, text)
    )
}

pub fn typed_literal(column: &Column, value: &CellValue) -> Result<SqlLiteral, ValueError> {
    match value {
        CellValue::Null if column.nullable => Ok(SqlLiteral("NULL".to_string())),
        CellValue::Null => Err(ValueError::NotNullable {
            column: column.name.clone(),
        }),
        CellValue::Text(text) => match numeric_kind(&column.data_type) {
            None => Ok(SqlLiteral(quote_sql_string(text))),
            Some(kind) => {
                let trimmed = text.trim();
                let accepted = match kind {
                    NumericKind::Integer => looks_integer(trimmed),
                    NumericKind::Decimal => looks_numeric(trimmed),
                };
                if accepted {
                    Ok(SqlLiteral(trimmed.to_string()))
                } else {
                    Err(ValueError::NotNumeric {
                        column: column.name.clone(),
                        data_type: column.data_type.clone(),
                        value: text.clone(),
                    })
                }
            }
        },
    }
}
