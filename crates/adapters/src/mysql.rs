use std::path::PathBuf;

use async_trait::async_trait;
use lazytab_core::connection::{RawCell, ResultSet, StoreBackend, StoreError};
use lazytab_core::connections::{Connection, PasswordSource, TlsMode};
use mysql_async::prelude::Queryable;
use mysql_async::{Column, Conn, OptsBuilder, SslOpts, Value};

pub const PASSWORD_ENV: &str = "LAZYTAB_DB_PASSWORD";
pub const KEYRING_SERVICE: &str = "lazytab";

// Every distinct filter and sort is its own prepared statement.
const STATEMENT_CACHE_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlBackend;

#[async_trait]
impl StoreBackend for MysqlBackend {
    type Handle = Conn;

    async fn connect(&self, connection: &Connection) -> Result<Self::Handle, StoreError> {
        Conn::new(opts_from_connection(connection))
            .await
            .map_err(to_store_error)
    }

    async fn ping(&self, handle: &mut Self::Handle) -> Result<(), StoreError> {
        handle.ping().await.map_err(to_store_error)
    }

    async fn query(
        &self,
        handle: &mut Self::Handle,
        sql: &str,
        max_rows: usize,
    ) -> Result<ResultSet, StoreError> {
        if !is_browse_statement(sql) {
            let mut result = handle.query_iter(sql).await.map_err(to_store_error)?;
            let columns = column_names(result.columns_ref());
            let mut rows = Vec::new();
            while rows.len() < max_rows {
                let Some(row) = result.next().await.map_err(to_store_error)? else {
                    break;
                };
                rows.push(row.unwrap().into_iter().map(raw_cell).collect());
            }
            result.drop_result().await.map_err(to_store_error)?;
            return Ok(ResultSet { columns, rows });
        }

        // Prepared statements hold exactly one statement.
        let mut result = handle.exec_iter(sql, ()).await.map_err(to_store_error)?;
        let columns = column_names(result.columns_ref());
        let mut rows = Vec::new();
        while rows.len() < max_rows {
            let Some(row) = result.next().await.map_err(to_store_error)? else {
                break;
            };
            rows.push(row.unwrap().into_iter().map(raw_cell).collect());
        }
        result.drop_result().await.map_err(to_store_error)?;

        Ok(ResultSet { columns, rows })
    }

    async fn execute(&self, handle: &mut Self::Handle, sql: &str) -> Result<u64, StoreError> {
        handle.query_drop(sql).await.map_err(to_store_error)?;
        Ok(handle.affected_rows())
    }

    async fn disconnect(&self, handle: Self::Handle) -> Result<(), StoreError> {
        handle.disconnect().await.map_err(to_store_error)
    }
}

/// Browse statements carry operator filter text; metadata statements are
/// built from quoted identifiers only.
fn is_browse_statement(sql: &str) -> bool {
    sql.trim_start()
        .get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("SELECT"))
}

fn column_names(columns: &[Column]) -> Vec<String> {
    columns
        .iter()
        .map(|column| column.name_str().into_owned())
        .collect()
}

fn opts_from_connection(connection: &Connection) -> OptsBuilder {
    OptsBuilder::default()
        .ip_or_hostname(connection.host.clone())
        .tcp_port(connection.port)
        .user(Some(connection.user.clone()))
        .pass(resolve_password(connection))
        .db_name(non_empty(connection.database.as_deref()).map(str::to_string))
        .ssl_opts(ssl_opts_from_connection(connection))
        .stmt_cache_size(STATEMENT_CACHE_SIZE)
}

fn resolve_password(connection: &Connection) -> Option<String> {
    let env_password = std::env::var(PASSWORD_ENV)
        .ok()
        .filter(|pw| !pw.is_empty());

    match connection.password_source {
        PasswordSource::Inline => connection.password.clone(),
        PasswordSource::EnvVar => env_password,
        PasswordSource::Keyring => secrets::load(&connection.name).or_else(|| {
            let password = env_password?;
            secrets::store(&connection.name, &password);
            Some(password)
        }),
    }
}

fn ssl_opts_from_connection(connection: &Connection) -> Option<SslOpts> {
    if !connection_requests_tls(connection) {
        return None;
    }

    let mut ssl_opts = SslOpts::default();
    if let Some(ca_cert_path) = non_empty(connection.tls_ca_cert_path.as_deref()) {
        ssl_opts = ssl_opts.with_root_certs(vec![PathBuf::from(ca_cert_path).into()]);
    }
    Some(ssl_opts)
}

/// `prefer` only turns TLS on when a CA certificate is configured.
fn connection_requests_tls(connection: &Connection) -> bool {
    match connection.tls_mode {
        TlsMode::Disabled => false,
        TlsMode::Prefer => non_empty(connection.tls_ca_cert_path.as_deref()).is_some(),
        TlsMode::Require => true,
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.and_then(|raw| {
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    })
}

#[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
mod secrets {
    use super::KEYRING_SERVICE;

    pub(super) fn load(account: &str) -> Option<String> {
        let entry = keyring::Entry::new(KEYRING_SERVICE, account).ok()?;
        entry.get_password().ok().filter(|pw| !pw.is_empty())
    }

    pub(super) fn store(account: &str, password: &str) {
        let result = keyring::Entry::new(KEYRING_SERVICE, account)
            .and_then(|entry| entry.set_password(password));
        if let Err(error) = result {
            tracing::warn!(account, %error, "failed to store password in keyring");
        }
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
mod secrets {
    pub(super) fn load(_account: &str) -> Option<String> {
        None
    }

    pub(super) fn store(_account: &str, _password: &str) {}
}

/// Text-protocol rows arrive as bytes and the core decodes those. Prepared
/// browse statements return typed values, rendered here the way the server
/// prints them.
fn raw_cell(value: Value) -> RawCell {
    match value {
        Value::NULL => RawCell::Null,
        Value::Bytes(bytes) => RawCell::Bytes(bytes),
        Value::Int(value) => RawCell::Text(value.to_string()),
        Value::UInt(value) => RawCell::Text(value.to_string()),
        Value::Float(value) => RawCell::Text(value.to_string()),
        Value::Double(value) => RawCell::Text(value.to_string()),
        Value::Date(year, month, day, hour, minute, second, micros) => {
            let date = format!("{year:04}-{month:02}-{day:02}");
            RawCell::Text(match (hour, minute, second, micros) {
                (0, 0, 0, 0) => date,
                (_, _, _, 0) => format!("{date} {hour:02}:{minute:02}:{second:02}"),
                _ => format!("{date} {hour:02}:{minute:02}:{second:02}.{micros:06}"),
            })
        }
        Value::Time(is_negative, days, hours, minutes, seconds, micros) => {
            let sign = if is_negative { "-" } else { "" };
            let hours = u32::from(hours) + days * 24;
            RawCell::Text(if micros == 0 {
                format!("{sign}{hours:02}:{minutes:02}:{seconds:02}")
            } else {
                format!("{sign}{hours:02}:{minutes:02}:{seconds:02}.{micros:06}")
            })
        }
    }
}

fn to_store_error(error: mysql_async::Error) -> StoreError {
    StoreError::new(error.to_string())
}
