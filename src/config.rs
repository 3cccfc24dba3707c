//! TOML service definitions.
//!
//! ```toml
//! [[services]]
//! name = "accounts-db"
//! kind = "postgres"
//! listen = "127.0.0.1:15432"
//!
//! [services.auth]
//! database = "accounts"
//! users = { app = "secret" }
//!
//! [[services.tables]]
//! name = "user"
//! row_count = 5
//! seed = 42
//! columns = [
//!     { name = "id", type = "uuid", primary_key = true },
//!     { name = "name", type = "string", values = ["Alice", "Bob"], indexed = true },
//! ]
//!
//! [[services.queries]]
//! pattern = "select * from users where name = *"
//! from_table = "users"
//! where = "name = '${2}'"
//! ```

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("service {service}: {message}")]
    Invalid { service: String, message: String },
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    pub listen: String,
    #[serde(default)]
    pub auth: AuthConfig,
    pub tls: Option<TlsConfig>,
    #[serde(default)]
    pub tables: Vec<TableConfig>,
    #[serde(default)]
    pub queries: Vec<QueryConfig>,
}

/// Credentials. No users means trust mode.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub users: HashMap<String, String>,
    pub database: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    pub cert: PathBuf,
    pub key: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableConfig {
    pub name: String,
    #[serde(default)]
    pub row_count: usize,
    #[serde(default)]
    pub seed: u64,
    pub columns: Vec<ColumnConfig>,
}

impl TableConfig {
    /// Index of the primary-key column: the one marked `primary_key`, else
    /// the column named `id`, else the first column.
    pub fn primary_key_index(&self) -> usize {
        self.columns
            .iter()
            .position(|c| c.primary_key)
            .or_else(|| self.columns.iter().position(|c| c.name.eq_ignore_ascii_case("id")))
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ColumnConfig {
    pub name: String,
    #[serde(rename = "type", default = "default_column_type")]
    pub ty: String,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub indexed: bool,
    /// Generated values are drawn from this list when it is non-empty.
    #[serde(default)]
    pub values: Vec<String>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    pub pattern: String,
    pub from_table: String,
    #[serde(rename = "where", default)]
    pub where_clause: Option<String>,
}

fn default_kind() -> String {
    "postgres".to_string()
}

fn default_column_type() -> String {
    "string".to_string()
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        content.parse()
    }

    /// Checks what the types alone cannot: unique names and sane tables.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for service in &self.services {
            let invalid = |message: String| ConfigError::Invalid {
                service: service.name.clone(),
                message,
            };

            if !names.insert(service.name.as_str()) {
                return Err(invalid("duplicate service name".to_string()));
            }

            let mut tables = HashSet::new();
            for table in &service.tables {
                if !tables.insert(table.name.to_ascii_lowercase()) {
                    return Err(invalid(format!("duplicate table {}", table.name)));
                }
                if table.columns.is_empty() {
                    return Err(invalid(format!("table {} has no columns", table.name)));
                }
                if table.columns.iter().filter(|c| c.primary_key).count() > 1 {
                    return Err(invalid(format!(
                        "table {} has more than one primary key",
                        table.name
                    )));
                }
                for column in &table.columns {
                    if let (Some(min), Some(max)) = (column.min, column.max)
                        && min > max
                    {
                        return Err(invalid(format!(
                            "column {}.{} has min greater than max",
                            table.name, column.name
                        )));
                    }
                }
            }

            for query in &service.queries {
                let references_captures = query
                    .where_clause
                    .as_deref()
                    .is_some_and(|w| w.contains("${"));
                if !query.pattern.contains('*') && references_captures {
                    return Err(invalid(format!(
                        "query {:?} references captures but has no wildcards",
                        query.pattern
                    )));
                }
            }
        }
        Ok(())
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}
