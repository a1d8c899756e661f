//! PostgreSQL backend over sqlx
//!
//! Owns a single `PgConnection` - the ORM's Connection layer is
//! single-handle, transactions included, so pooling stays out of scope.
//! Named placeholders are rewritten to positional `$n` binds; `::` casts are
//! left untouched.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{Column, ConnectOptions, Executor, Row as _, TypeInfo};
use tokio::sync::Mutex;

use crate::error::DatasourceError;

use super::{Datasource, Row};

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":([A-Za-z][A-Za-z0-9_]*)").expect("placeholder regex"));

pub struct PostgresDatasource {
    conn: Mutex<sqlx::PgConnection>,
}

impl PostgresDatasource {
    pub async fn connect(url: &str) -> Result<Self, DatasourceError> {
        let options: sqlx::postgres::PgConnectOptions = url
            .parse()
            .map_err(|e: sqlx::Error| DatasourceError::Connection(e.to_string()))?;
        let conn = options
            .connect()
            .await
            .map_err(|e| DatasourceError::Connection(e.to_string()))?;
        Ok(PostgresDatasource {
            conn: Mutex::new(conn),
        })
    }

    /// Rewrite `:name` placeholders to `$n` and order the bind values to
    /// match. Unknown names bind NULL.
    fn positional(sql: &str, params: &[(String, Value)]) -> (String, Vec<Value>) {
        let mut ordered = Vec::new();
        let mut out = String::with_capacity(sql.len());
        let mut last = 0;
        for captures in PLACEHOLDER.captures_iter(sql) {
            let matched = captures.get(0).expect("whole match");
            // a preceding ':' means this is a `::type` cast, not a placeholder
            if matched.start() > 0 && sql.as_bytes()[matched.start() - 1] == b':' {
                continue;
            }
            out.push_str(&sql[last..matched.start()]);
            let name = &captures[1];
            let value = params
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone())
                .unwrap_or(Value::Null);
            ordered.push(value);
            out.push_str(&format!("${}", ordered.len()));
            last = matched.end();
        }
        out.push_str(&sql[last..]);
        (out, ordered)
    }

    fn bind_all<'q>(
        sql: &'q str,
        values: &'q [Value],
    ) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
        let mut query = sqlx::query(sql);
        for value in values {
            query = match value {
                Value::Null => query.bind(None::<String>),
                Value::Bool(b) => query.bind(*b),
                Value::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        query.bind(i)
                    } else {
                        query.bind(n.as_f64())
                    }
                }
                Value::String(s) => query.bind(s.as_str()),
                other => query.bind(other.clone()),
            };
        }
        query
    }

    fn decode_column(row: &PgRow, index: usize) -> Value {
        let type_name = row.column(index).type_info().name().to_uppercase();
        match type_name.as_str() {
            "BOOL" => row
                .try_get::<Option<bool>, _>(index)
                .ok()
                .flatten()
                .map(Value::from)
                .unwrap_or(Value::Null),
            "INT2" | "INT4" | "INT8" => row
                .try_get::<Option<i64>, _>(index)
                .ok()
                .flatten()
                .map(Value::from)
                .unwrap_or(Value::Null),
            "FLOAT4" | "FLOAT8" => row
                .try_get::<Option<f64>, _>(index)
                .ok()
                .flatten()
                .map(Value::from)
                .unwrap_or(Value::Null),
            "JSON" | "JSONB" => row
                .try_get::<Option<Value>, _>(index)
                .ok()
                .flatten()
                .unwrap_or(Value::Null),
            "UUID" => row
                .try_get::<Option<uuid::Uuid>, _>(index)
                .ok()
                .flatten()
                .map(|u| Value::from(u.to_string()))
                .unwrap_or(Value::Null),
            "TIMESTAMP" => row
                .try_get::<Option<chrono::NaiveDateTime>, _>(index)
                .ok()
                .flatten()
                .map(|t| Value::from(t.to_string()))
                .unwrap_or(Value::Null),
            "TIMESTAMPTZ" => row
                .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index)
                .ok()
                .flatten()
                .map(|t| Value::from(t.to_rfc3339()))
                .unwrap_or(Value::Null),
            _ => row
                .try_get::<Option<String>, _>(index)
                .ok()
                .flatten()
                .map(Value::from)
                .unwrap_or(Value::Null),
        }
    }

    fn statement_error(sql: &str, err: sqlx::Error) -> DatasourceError {
        DatasourceError::Statement {
            sql: sql.to_string(),
            message: err.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl Datasource for PostgresDatasource {
    async fn query(
        &self,
        sql: &str,
        params: &[(String, Value)],
    ) -> Result<Vec<Row>, DatasourceError> {
        let (rewritten, ordered) = Self::positional(sql, params);
        let mut conn = self.conn.lock().await;
        let rows = (&mut *conn)
            .fetch_all(Self::bind_all(&rewritten, &ordered))
            .await
            .map_err(|e| Self::statement_error(sql, e))?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let columns: Vec<String> = row
                .columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect();
            let values = (0..columns.len())
                .map(|i| Self::decode_column(&row, i))
                .collect();
            out.push(Row { columns, values });
        }
        Ok(out)
    }

    async fn execute(
        &self,
        sql: &str,
        params: &[(String, Value)],
    ) -> Result<u64, DatasourceError> {
        let (rewritten, ordered) = Self::positional(sql, params);
        let mut conn = self.conn.lock().await;
        let result = (&mut *conn)
            .execute(Self::bind_all(&rewritten, &ordered))
            .await
            .map_err(|e| Self::statement_error(sql, e))?;
        Ok(result.rows_affected())
    }

    async fn last_insert_id(&self) -> Result<Option<i64>, DatasourceError> {
        let mut conn = self.conn.lock().await;
        // LASTVAL errors when no sequence has fired on this session yet
        match sqlx::query_scalar::<_, i64>("SELECT LASTVAL()")
            .fetch_one(&mut *conn)
            .await
        {
            Ok(id) => Ok(Some(id)),
            Err(_) => Ok(None),
        }
    }

    fn dialect(&self) -> &'static str {
        "postgres"
    }
}
