use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 3306;
pub const CONFIG_DIR_ENV: &str = "LAZYTAB_CONFIG_DIR";

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TlsMode {
    Disabled,
    #[default]
    Prefer,
    Require,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PasswordSource {
    #[default]
    Inline,
    EnvVar,
    Keyring,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub database: Option<String>,
    pub password_source: PasswordSource,
    pub tls_mode: TlsMode,
    pub tls_ca_cert_path: Option<String>,
}

impl Connection {
    #[must_use]
    pub fn new(name: impl Into<String>, host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port: DEFAULT_PORT,
            user: user.into(),
            password: None,
            database: None,
            password_source: PasswordSource::Inline,
            tls_mode: TlsMode::Prefer,
            tls_ca_cert_path: None,
        }
    }

    #[must_use]
    pub fn descriptor(&self) -> String {
        self.render_descriptor(self.password.as_deref())
    }

    #[must_use]
    pub fn redacted_descriptor(&self) -> String {
        self.render_descriptor(self.password.as_ref().map(|_| "***"))
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        self.database
            .as_deref()
            .filter(|database| !database.is_empty())
            .unwrap_or(&self.name)
    }

    fn render_descriptor(&self, password: Option<&str>) -> String {
        let credentials = match password {
            Some(password) => format!("{}:{password}", self.user),
            None => self.user.clone(),
        };
        format!(
            "{credentials}@{}:{}/{}",
            self.host,
            self.port,
            self.database.as_deref().unwrap_or_default()
        )
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config directory is unavailable for this platform")]
    ConfigDirUnavailable,
    #[error("failed to read connections file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse connections file at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

#[derive(Debug, Deserialize)]
struct ConnectionEntry {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    user: String,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    database: Option<String>,
    #[serde(default)]
    password_source: PasswordSource,
    #[serde(default)]
    tls_mode: TlsMode,
    #[serde(default)]
    tls_ca_cert_path: Option<String>,
}

impl ConnectionEntry {
    fn into_connection(self, name: String) -> Connection {
        Connection {
            name,
            host: self.host,
            port: self.port,
            user: self.user,
            password: self.password,
            database: self.database,
            password_source: self.password_source,
            tls_mode: self.tls_mode,
            tls_ca_cert_path: self.tls_ca_cert_path,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConnectionsDocument {
    #[serde(default)]
    connections: BTreeMap<String, ConnectionEntry>,
}

#[derive(Debug, Clone)]
pub struct ConnectionsFile {
    path: PathBuf,
    connections: Vec<Connection>,
}

impl ConnectionsFile {
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_connections_path()?;
        Self::load_from_path(path)
    }

    pub fn load_from_path(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "connections file not found");
            return Ok(Self {
                path,
                connections: Vec::new(),
            });
        }

        let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        Self::parse(path, &raw)
    }

    fn parse(path: PathBuf, raw: &str) -> Result<Self, ConfigError> {
        if raw.trim().is_empty() {
            return Ok(Self {
                path,
                connections: Vec::new(),
            });
        }

        let doc: ConnectionsDocument =
            toml::from_str(raw).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?;
        let connections = doc
            .connections
            .into_iter()
            .map(|(name, entry)| entry.into_connection(name))
            .collect::<Vec<_>>();
        tracing::debug!(path = %path.display(), count = connections.len(), "loaded connections");

        Ok(Self { path, connections })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    #[must_use]
    pub fn connection(&self, name: &str) -> Option<&Connection> {
        self.connections
            .iter()
            .find(|connection| connection.name == name)
    }
}

/// `LAZYTAB_CONFIG_DIR` names the directory itself; the platform locations
/// get a `lazytab` subdirectory.
pub fn default_config_dir() -> Result<PathBuf, ConfigError> {
    if let Some(custom) = env::var_os(CONFIG_DIR_ENV).filter(|dir| !dir.is_empty()) {
        return Ok(PathBuf::from(custom));
    }

    platform_config_home()
        .map(|base| base.join("lazytab"))
        .ok_or(ConfigError::ConfigDirUnavailable)
}

fn platform_config_home() -> Option<PathBuf> {
    if cfg!(target_os = "windows") {
        return env::var_os("APPDATA").map(PathBuf::from);
    }

    env::var_os("XDG_CONFIG_HOME")
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .or_else(|| env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
}

pub fn default_connections_path() -> Result<PathBuf, ConfigError> {
    Ok(default_config_dir()?.join("connections.toml"))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use tempfile::TempDir;

    use super::{
        default_config_dir, default_connections_path, ConfigError, Connection, ConnectionsFile,
        PasswordSource, TlsMode, CONFIG_DIR_ENV,
    };

    const SAMPLE: &str = r#"
[connections.staging]
host = "db.internal"
port = 3307
user = "reader"
password_source = "env_var"
tls_mode = "require"

[connections.local]
user = "root"
password = "root"
database = "shop"
"#;

    #[test]
    fn config_dir_override_is_used_as_is() {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        std::env::set_var(CONFIG_DIR_ENV, temp_dir.path());
        let dir = default_config_dir();
        let path = default_connections_path();
        std::env::remove_var(CONFIG_DIR_ENV);

        assert_eq!(dir.expect("config dir"), temp_dir.path());
        assert_eq!(
            path.expect("connections path"),
            temp_dir.path().join("connections.toml")
        );
    }

    #[test]
    fn missing_connections_file_loads_empty_list() {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let path = temp_dir.path().join("connections.toml");

        let file = ConnectionsFile::load_from_path(path).expect("failed to load file");
        assert!(file.connections().is_empty());
    }

    #[test]
    fn blank_connections_file_loads_empty_list() {
        let file = ConnectionsFile::parse(PathBuf::from("connections.toml"), "  \n")
            .expect("blank file should parse");
        assert!(file.connections().is_empty());
    }

    #[test]
    fn parses_named_entries_sorted_with_defaults() {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let path = temp_dir.path().join("connections.toml");
        std::fs::write(&path, SAMPLE).expect("failed to write sample");

        let file = ConnectionsFile::load_from_path(&path).expect("failed to load file");
        let names = file
            .connections()
            .iter()
            .map(|connection| connection.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["local", "staging"]);

        let local = file.connection("local").expect("missing local entry");
        assert_eq!(local.host, "127.0.0.1");
        assert_eq!(local.port, 3306);
        assert_eq!(local.password.as_deref(), Some("root"));
        assert_eq!(local.password_source, PasswordSource::Inline);
        assert_eq!(local.tls_mode, TlsMode::Prefer);

        let staging = file.connection("staging").expect("missing staging entry");
        assert_eq!(staging.port, 3307);
        assert_eq!(staging.password_source, PasswordSource::EnvVar);
        assert_eq!(staging.tls_mode, TlsMode::Require);
        assert!(staging.database.is_none());
    }

    #[test]
    fn malformed_file_reports_parse_error() {
        let err = ConnectionsFile::parse(PathBuf::from("bad.toml"), "[connections.local]\nport = \"x\"")
            .expect_err("invalid entry should fail");
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn descriptor_renders_credentials_and_target() {
        let mut connection = Connection::new("local", "127.0.0.1", "root");
        connection.password = Some("secret".to_string());
        connection.database = Some("shop".to_string());

        assert_eq!(connection.descriptor(), "root:secret@127.0.0.1:3306/shop");
        assert_eq!(
            connection.redacted_descriptor(),
            "root:***@127.0.0.1:3306/shop"
        );
        assert_eq!(connection.display_name(), "shop");

        connection.password = None;
        connection.database = None;
        assert_eq!(connection.descriptor(), "root@127.0.0.1:3306/");
        assert_eq!(connection.display_name(), "local");
    }
}
