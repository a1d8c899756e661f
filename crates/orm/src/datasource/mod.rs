//! Datasource backends
//!
//! A [`Datasource`] owns one live database handle and executes SQL carrying
//! named placeholders (`:b0`). The [`crate::Connection`] drives it; dialect
//! differences (placeholder rewriting, last-insert-id retrieval) stay inside
//! the backend.

pub mod postgres;
pub mod sqlite;

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use crate::error::DatasourceError;

pub use postgres::PostgresDatasource;
pub use sqlite::SqliteDatasource;

/// One result row: positional values plus the column names the driver
/// reported, in select order. Positional access is what lets joined selects
/// carry the same column name for several tables.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub columns: Vec<String>,
    pub values: Vec<Value>,
}

impl Row {
    /// First value under a column name, for simple single-table reads.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
    }
}

/// Object-safe async interface over one database handle.
#[async_trait]
pub trait Datasource: Send + Sync {
    /// Run a statement returning rows.
    async fn query(
        &self,
        sql: &str,
        params: &[(String, Value)],
    ) -> Result<Vec<Row>, DatasourceError>;

    /// Run a statement returning an affected-row count.
    async fn execute(&self, sql: &str, params: &[(String, Value)])
        -> Result<u64, DatasourceError>;

    /// Id generated by the most recent insert on this handle, if any.
    async fn last_insert_id(&self) -> Result<Option<i64>, DatasourceError>;

    fn dialect(&self) -> &'static str;
}

/// Parsed datasource location.
#[derive(Debug, Clone)]
pub struct DatasourceConfig {
    url: Url,
}

impl DatasourceConfig {
    pub fn from_url(raw: &str) -> Result<Self, DatasourceError> {
        let url = Url::parse(raw)
            .map_err(|e| DatasourceError::Connection(format!("invalid url '{}': {}", raw, e)))?;
        match url.scheme() {
            "postgres" | "postgresql" | "sqlite" => Ok(DatasourceConfig { url }),
            other => Err(DatasourceError::UnsupportedScheme(other.to_string())),
        }
    }

    /// Read `DATABASE_URL` from the environment.
    pub fn from_env() -> Result<Self, DatasourceError> {
        let raw = std::env::var("DATABASE_URL")
            .map_err(|_| DatasourceError::Connection("DATABASE_URL is not set".to_string()))?;
        Self::from_url(&raw)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Open the backend this config points at.
    pub async fn connect(&self) -> Result<Box<dyn Datasource>, DatasourceError> {
        match self.url.scheme() {
            "postgres" | "postgresql" => {
                let ds = PostgresDatasource::connect(self.url.as_str()).await?;
                Ok(Box::new(ds))
            }
            "sqlite" => {
                let path = self.url.path();
                let ds = if path.is_empty() || path == ":memory:" {
                    SqliteDatasource::in_memory()?
                } else {
                    SqliteDatasource::open(path)?
                };
                Ok(Box::new(ds))
            }
            other => Err(DatasourceError::UnsupportedScheme(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn row_lookup_by_column() {
        let row = Row {
            columns: vec!["id".to_string(), "title".to_string()],
            values: vec![json!(1), json!("news")],
        };
        assert_eq!(row.get("title"), Some(&json!("news")));
        assert_eq!(row.get("missing"), None);
    }

    #[test]
    fn config_accepts_known_schemes() {
        assert!(DatasourceConfig::from_url("postgres://localhost/app").is_ok());
        assert!(DatasourceConfig::from_url("sqlite::memory:").is_ok());
        assert!(matches!(
            DatasourceConfig::from_url("mysql://localhost/app"),
            Err(DatasourceError::UnsupportedScheme(_))
        ));
    }
}
