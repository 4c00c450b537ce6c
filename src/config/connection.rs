//! Database connection configuration.
//!
//! A connection is a dialect plus a driver-specific data source string. It is
//! supplied once per connection-initialization event, either by the editor in
//! the LSP `initializationOptions` or from the environment:
//! - `SCHEMALENS_DB_DRIVER`: Database driver (sqlite, mysql, postgres, mssql)
//! - `SCHEMALENS_DB_SOURCE`: Data source name (file path, URL, ...)

use std::env;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Error type for connection configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Unsupported driver: {0}. Supported: sqlite, mysql, postgres, mssql")]
    UnsupportedDriver(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// SQL dialects a connection can name.
///
/// Only [`Driver::Sqlite`] has an introspection backend in this crate; the
/// others are recognised so that configuration errors and "unsupported
/// dialect" failures can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Driver {
    /// SQLite (file or in-memory)
    Sqlite,
    /// MySQL / MariaDB
    MySql,
    /// PostgreSQL
    Postgres,
    /// Microsoft SQL Server
    MsSql,
}

impl Driver {
    /// Parse driver from string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, ConnectionError> {
        match s.to_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Driver::Sqlite),
            "mysql" | "mariadb" => Ok(Driver::MySql),
            "postgres" | "postgresql" | "pg" => Ok(Driver::Postgres),
            "mssql" | "sqlserver" | "sql_server" => Ok(Driver::MsSql),
            other => Err(ConnectionError::UnsupportedDriver(other.to_string())),
        }
    }

    /// Canonical driver name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Driver::Sqlite => "sqlite",
            Driver::MySql => "mysql",
            Driver::Postgres => "postgres",
            Driver::MsSql => "mssql",
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Driver {
    type Error = ConnectionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Driver::from_str(&value)
    }
}

impl From<Driver> for String {
    fn from(driver: Driver) -> Self {
        driver.as_str().to_string()
    }
}

/// Database connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    /// Database driver.
    pub driver: Driver,
    /// Driver-specific data source name.
    pub data_source_name: String,
}

impl ConnectionConfig {
    /// Create a connection config.
    pub fn new(driver: Driver, data_source_name: impl Into<String>) -> Self {
        Self {
            driver,
            data_source_name: data_source_name.into(),
        }
    }

    /// Create a connection config for SQLite.
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self::new(Driver::Sqlite, path)
    }

    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `SCHEMALENS_DB_DRIVER`
    ///
    /// Optional:
    /// - `SCHEMALENS_DB_SOURCE`: required for every driver except SQLite,
    ///   which falls back to an in-memory database
    pub fn from_env() -> Result<Self, ConnectionError> {
        let driver_str = env::var("SCHEMALENS_DB_DRIVER")
            .map_err(|_| ConnectionError::MissingEnvVar("SCHEMALENS_DB_DRIVER".to_string()))?;

        let driver = Driver::from_str(&driver_str)?;

        let data_source_name = match driver {
            Driver::Sqlite => {
                env::var("SCHEMALENS_DB_SOURCE").unwrap_or_else(|_| ":memory:".to_string())
            }
            _ => env::var("SCHEMALENS_DB_SOURCE")
                .map_err(|_| ConnectionError::MissingEnvVar("SCHEMALENS_DB_SOURCE".to_string()))?,
        };

        let config = Self::new(driver, data_source_name);
        config.validate()?;
        Ok(config)
    }

    /// Check the config is usable before a repository is built from it.
    pub fn validate(&self) -> Result<(), ConnectionError> {
        if self.driver != Driver::Sqlite && self.data_source_name.trim().is_empty() {
            return Err(ConnectionError::InvalidConfig(format!(
                "{} connection needs a data source name",
                self.driver
            )));
        }
        Ok(())
    }

    /// Get the driver name.
    pub fn driver_name(&self) -> &'static str {
        self.driver.as_str()
    }
}
