use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use thiserror::Error;

use crate::connections::Connection;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct StoreError {
    message: String,
}

impl StoreError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawCell {
    Null,
    Bytes(Vec<u8>),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<RawCell>>,
}

#[async_trait]
pub trait StoreBackend: Send + Sync {
    type Handle: Send + std::fmt::Debug;

    async fn connect(&self, connection: &Connection) -> Result<Self::Handle, StoreError>;
    async fn ping(&self, handle: &mut Self::Handle) -> Result<(), StoreError>;

    /// Runs a row-returning statement and reads at most `max_rows` rows from it.
    async fn query(
        &self,
        handle: &mut Self::Handle,
        sql: &str,
        max_rows: usize,
    ) -> Result<ResultSet, StoreError>;

    async fn execute(&self, handle: &mut Self::Handle, sql: &str) -> Result<u64, StoreError>;

    async fn disconnect(&self, handle: Self::Handle) -> Result<(), StoreError>;
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed to connect to `{name}`: {source}")]
    Connect {
        name: String,
        #[source]
        source: StoreError,
    },
    #[error("failed to ping `{name}`: {source}")]
    Ping {
        name: String,
        #[source]
        source: StoreError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub connection_name: String,
    pub last_latency: Duration,
    pub last_health_check_at: SystemTime,
}

#[derive(Debug)]
pub struct LiveConnection<B: StoreBackend> {
    backend: B,
    connection: Connection,
    handle: B::Handle,
    last_latency: Duration,
    last_health_check_at: SystemTime,
}

impl<B: StoreBackend> LiveConnection<B> {
    pub async fn open(backend: B, connection: Connection) -> Result<Self, ConnectionError> {
        tracing::debug!(descriptor = %connection.redacted_descriptor(), "opening connection");
        let started_at = Instant::now();
        let mut handle =
            backend
                .connect(&connection)
                .await
                .map_err(|source| ConnectionError::Connect {
                    name: connection.name.clone(),
                    source,
                })?;

        if let Err(source) = backend.ping(&mut handle).await {
            if let Err(error) = backend.disconnect(handle).await {
                tracing::warn!(connection = %connection.name, %error, "disconnect after failed ping");
            }
            return Err(ConnectionError::Ping {
                name: connection.name.clone(),
                source,
            });
        }

        let latency = started_at.elapsed();
        tracing::info!(
            connection = %connection.name,
            latency_ms = latency.as_millis(),
            "connected"
        );

        Ok(Self {
            backend,
            connection,
            handle,
            last_latency: latency,
            last_health_check_at: SystemTime::now(),
        })
    }

    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            connection_name: self.connection.name.clone(),
            last_latency: self.last_latency,
            last_health_check_at: self.last_health_check_at,
        }
    }

    pub async fn health_check(&mut self) -> Result<Duration, StoreError> {
        let started_at = Instant::now();
        self.backend.ping(&mut self.handle).await?;

        let latency = started_at.elapsed();
        self.last_latency = latency;
        self.last_health_check_at = SystemTime::now();
        Ok(latency)
    }

    pub(crate) async fn query(&mut self, sql: &str, max_rows: usize) -> Result<ResultSet, StoreError> {
        tracing::debug!(connection = %self.connection.name, sql, "query");
        let result = self.backend.query(&mut self.handle, sql, max_rows).await;
        if let Err(error) = &result {
            tracing::warn!(connection = %self.connection.name, sql, %error, "query failed");
        }
        result
    }

    pub(crate) async fn execute(&mut self, sql: &str) -> Result<u64, StoreError> {
        tracing::debug!(connection = %self.connection.name, sql, "execute");
        let result = self.backend.execute(&mut self.handle, sql).await;
        if let Err(error) = &result {
            tracing::warn!(connection = %self.connection.name, sql, %error, "statement failed");
        }
        result
    }

    pub async fn close(self) -> Result<(), StoreError> {
        tracing::info!(connection = %self.connection.name, "closing connection");
        self.backend.disconnect(self.handle).await
    }
}

#[cfg(test)]
mod tests {
    use super::{ConnectionError, LiveConnection};
    use crate::connections::Connection;
    use crate::testing::FakeBackend;

    fn sample_connection() -> Connection {
        Connection::new("local", "127.0.0.1", "root")
    }

    #[tokio::test]
    async fn open_records_status_for_connection() {
        let backend = FakeBackend::new();
        let live = LiveConnection::open(backend, sample_connection())
            .await
            .expect("open should succeed");

        let status = live.status();
        assert_eq!(status.connection_name, "local");
        assert_eq!(live.connection().user, "root");
    }

    #[tokio::test]
    async fn failed_connect_is_a_connection_error() {
        let backend = FakeBackend::new();
        backend.fail_connect();

        let err = LiveConnection::open(backend, sample_connection())
            .await
            .expect_err("connect should fail");
        assert!(matches!(err, ConnectionError::Connect { ref name, .. } if name == "local"));
    }

    #[tokio::test]
    async fn failed_ping_disconnects_and_reports() {
        let backend = FakeBackend::new();
        backend.fail_ping();

        let err = LiveConnection::open(backend.clone(), sample_connection())
            .await
            .expect_err("ping should fail");
        assert!(matches!(err, ConnectionError::Ping { .. }));
        assert_eq!(backend.disconnect_calls(), 1);
    }

    #[tokio::test]
    async fn health_check_and_close_reach_backend() {
        let backend = FakeBackend::new();
        let mut live = LiveConnection::open(backend.clone(), sample_connection())
            .await
            .expect("open should succeed");

        live.health_check().await.expect("health check should succeed");
        live.close().await.expect("close should succeed");
        assert_eq!(backend.disconnect_calls(), 1);
    }
}
