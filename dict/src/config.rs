//! Database connection configuration.
//!
//! Defines the YAML-serializable settings a connection is constructed from.
//! The configuration is an explicit value handed to the connection; nothing
//! is kept in process-wide state.
//!
//! # Example YAML
//!
//! ```yaml
//! host: db.example.org
//! port: 3306
//! database: epg
//! user: epg
//! password: secret
//! encoding: utf8mb4
//! ```

use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default MySQL port.
pub const DEFAULT_PORT: u16 = 3306;

/// Settings for connecting to the database server.
///
/// # Examples
///
/// ```
/// use rowbind_dict::ConnectionConfig;
///
/// let config = ConnectionConfig::new("epg")
///     .with_host("db.local")
///     .with_credentials("epg", "secret");
/// assert_eq!(config.port, 3306);
/// assert_eq!(config.address(), "db.local:3306");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Server host name or address.
    #[serde(default = "default_host")]
    pub host: String,
    /// Server TCP port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Database (schema) name.
    pub database: String,
    /// User name.
    #[serde(default)]
    pub user: String,
    /// Password.
    #[serde(default)]
    pub password: String,
    /// Character set issued with `SET NAMES` after connecting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl ConnectionConfig {
    /// Creates a configuration for `database` on `localhost:3306`.
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            host: default_host(),
            port: DEFAULT_PORT,
            database: database.into(),
            user: String::new(),
            password: String::new(),
            encoding: None,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    /// `host:port`, as used in log lines.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](crate::DictionaryError::IoError) if the file cannot
    /// be read, or [`YamlError`](crate::DictionaryError::YamlError) if parsing
    /// fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let config = serde_yaml::from_reader(reader)?;
        Ok(config)
    }

    /// Saves the configuration as YAML.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](crate::DictionaryError::IoError) if the file cannot
    /// be written, or [`YamlError`](crate::DictionaryError::YamlError) if
    /// serialization fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }
}
