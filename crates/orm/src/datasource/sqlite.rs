//! SQLite backend over rusqlite
//!
//! Used for local development and the test suite. SQLite understands the
//! builder's `:name` placeholders natively, so no rewriting is needed.

use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::types::{Value as SqliteValue, ValueRef};
use serde_json::Value;

use crate::error::DatasourceError;

use super::{Datasource, Row};

pub struct SqliteDatasource {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteDatasource {
    pub fn in_memory() -> Result<Self, DatasourceError> {
        let conn = rusqlite::Connection::open_in_memory()
            .map_err(|e| DatasourceError::Connection(e.to_string()))?;
        Ok(SqliteDatasource {
            conn: Mutex::new(conn),
        })
    }

    pub fn open(path: &str) -> Result<Self, DatasourceError> {
        let conn = rusqlite::Connection::open(path)
            .map_err(|e| DatasourceError::Connection(e.to_string()))?;
        Ok(SqliteDatasource {
            conn: Mutex::new(conn),
        })
    }

    fn to_sqlite(value: &Value) -> SqliteValue {
        match value {
            Value::Null => SqliteValue::Null,
            Value::Bool(b) => SqliteValue::Integer(*b as i64),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    SqliteValue::Integer(i)
                } else {
                    SqliteValue::Real(n.as_f64().unwrap_or(0.0))
                }
            }
            Value::String(s) => SqliteValue::Text(s.clone()),
            other => SqliteValue::Text(other.to_string()),
        }
    }

    fn from_sqlite(value: ValueRef<'_>) -> Value {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::from(i),
            ValueRef::Real(f) => Value::from(f),
            ValueRef::Text(t) => Value::from(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Value::from(String::from_utf8_lossy(b).into_owned()),
        }
    }

    fn statement_error(sql: &str, err: rusqlite::Error) -> DatasourceError {
        DatasourceError::Statement {
            sql: sql.to_string(),
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl Datasource for SqliteDatasource {
    async fn query(
        &self,
        sql: &str,
        params: &[(String, Value)],
    ) -> Result<Vec<Row>, DatasourceError> {
        let conn = self.conn.lock().expect("sqlite handle poisoned");
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| Self::statement_error(sql, e))?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

        let owned: Vec<(String, SqliteValue)> = params
            .iter()
            .map(|(name, value)| (format!(":{}", name), Self::to_sqlite(value)))
            .collect();
        let bound: Vec<(&str, &dyn rusqlite::types::ToSql)> = owned
            .iter()
            .map(|(name, value)| (name.as_str(), value as &dyn rusqlite::types::ToSql))
            .collect();

        let mut rows = stmt
            .query(&bound[..])
            .map_err(|e| Self::statement_error(sql, e))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|e| Self::statement_error(sql, e))? {
            let mut values = Vec::with_capacity(columns.len());
            for index in 0..columns.len() {
                let value = row
                    .get_ref(index)
                    .map_err(|e| Self::statement_error(sql, e))?;
                values.push(Self::from_sqlite(value));
            }
            out.push(Row {
                columns: columns.clone(),
                values,
            });
        }
        Ok(out)
    }

    async fn execute(
        &self,
        sql: &str,
        params: &[(String, Value)],
    ) -> Result<u64, DatasourceError> {
        let conn = self.conn.lock().expect("sqlite handle poisoned");
        let owned: Vec<(String, SqliteValue)> = params
            .iter()
            .map(|(name, value)| (format!(":{}", name), Self::to_sqlite(value)))
            .collect();
        let bound: Vec<(&str, &dyn rusqlite::types::ToSql)> = owned
            .iter()
            .map(|(name, value)| (name.as_str(), value as &dyn rusqlite::types::ToSql))
            .collect();
        let affected = conn
            .execute(sql, &bound[..])
            .map_err(|e| Self::statement_error(sql, e))?;
        Ok(affected as u64)
    }

    async fn last_insert_id(&self) -> Result<Option<i64>, DatasourceError> {
        let conn = self.conn.lock().expect("sqlite handle poisoned");
        let id = conn.last_insert_rowid();
        Ok((id != 0).then_some(id))
    }

    fn dialect(&self) -> &'static str {
        "sqlite"
    }
}
