//! Connection - statement execution, transactions, query log
//!
//! Wraps a [`Datasource`] handle. Transactions are connection-scoped and
//! non-reentrant: a single `transaction_started` flag guards them, `begin`
//! inside an open transaction is a no-op returning `false`, and a statement
//! failure rolls back any open transaction before the error propagates, so
//! callers never observe a dangling transaction.

pub mod mapping;

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, warn};

use crate::datasource::{Datasource, DatasourceConfig, Row};
use crate::error::OrmResult;
use crate::query::QueryBuilder;

pub use mapping::RowMode;

/// Debug query log retention. Oldest entries are evicted past this.
pub const QUERY_LOG_LIMIT: usize = 200;

/// One logged statement.
#[derive(Debug, Clone)]
pub struct QueryLog {
    pub sql: String,
    pub params: Vec<(String, Value)>,
    pub took: Duration,
}

pub struct Connection {
    datasource: Box<dyn Datasource>,
    transaction_started: Mutex<bool>,
    log: Mutex<VecDeque<QueryLog>>,
}

impl Connection {
    pub fn new(datasource: Box<dyn Datasource>) -> Self {
        Connection {
            datasource,
            transaction_started: Mutex::new(false),
            log: Mutex::new(VecDeque::new()),
        }
    }

    /// Open the datasource a config points at and wrap it.
    pub async fn connect(config: &DatasourceConfig) -> OrmResult<Self> {
        let datasource = config.connect().await?;
        Ok(Self::new(datasource))
    }

    pub fn dialect(&self) -> &'static str {
        self.datasource.dialect()
    }

    /// Execute a write statement. `Ok(true)` even when zero rows were
    /// affected; driver errors roll back any open transaction first.
    pub async fn execute(&self, sql: &str, params: &[(String, Value)]) -> OrmResult<bool> {
        self.write(sql, params).await.map(|_| true)
    }

    /// Execute a write statement and report the affected-row count.
    pub async fn write(&self, sql: &str, params: &[(String, Value)]) -> OrmResult<u64> {
        let started = Instant::now();
        let result = self.datasource.execute(sql, params).await;
        self.record(sql, params, started.elapsed());
        match result {
            Ok(affected) => Ok(affected),
            Err(err) => {
                self.rollback_after_failure().await;
                Err(err.into())
            }
        }
    }

    /// Run a row-returning statement.
    pub async fn select(&self, sql: &str, params: &[(String, Value)]) -> OrmResult<Vec<Row>> {
        let started = Instant::now();
        let result = self.datasource.query(sql, params).await;
        self.record(sql, params, started.elapsed());
        match result {
            Ok(rows) => Ok(rows),
            Err(err) => {
                self.rollback_after_failure().await;
                Err(err.into())
            }
        }
    }

    pub async fn last_insert_id(&self) -> OrmResult<Option<i64>> {
        Ok(self.datasource.last_insert_id().await?)
    }

    /// Begin a transaction. Returns `false` without touching the database
    /// when one is already open - there are no savepoints here.
    pub async fn begin(&self) -> OrmResult<bool> {
        if self.transaction_started() {
            return Ok(false);
        }
        debug!("begin transaction");
        self.datasource.execute("BEGIN", &[]).await?;
        *self.transaction_started.lock().expect("transaction flag") = true;
        Ok(true)
    }

    /// Commit the open transaction; `false` when none is open.
    pub async fn commit(&self) -> OrmResult<bool> {
        if !self.transaction_started() {
            return Ok(false);
        }
        debug!("commit transaction");
        self.datasource.execute("COMMIT", &[]).await?;
        *self.transaction_started.lock().expect("transaction flag") = false;
        Ok(true)
    }

    /// Roll back the open transaction; `false` when none is open.
    pub async fn rollback(&self) -> OrmResult<bool> {
        if !self.transaction_started() {
            return Ok(false);
        }
        debug!("rollback transaction");
        self.datasource.execute("ROLLBACK", &[]).await?;
        *self.transaction_started.lock().expect("transaction flag") = false;
        Ok(true)
    }

    pub fn transaction_started(&self) -> bool {
        *self.transaction_started.lock().expect("transaction flag")
    }

    /// Best-effort rollback after a failed statement.
    async fn rollback_after_failure(&self) {
        if !self.transaction_started() {
            return;
        }
        warn!("statement failed inside a transaction, rolling back");
        if let Err(err) = self.datasource.execute("ROLLBACK", &[]).await {
            warn!(error = %err, "rollback after failed statement also failed");
        }
        *self.transaction_started.lock().expect("transaction flag") = false;
    }

    /// Insert a row, columns in data order.
    pub async fn insert(&self, table: &str, data: &[(String, Value)]) -> OrmResult<bool> {
        let mut builder = QueryBuilder::new(table, None);
        let sql = builder.insert_statement(data)?;
        self.execute(&sql, builder.values()).await
    }

    /// Update rows matching a conditions tree.
    pub async fn update(
        &self,
        table: &str,
        data: &[(String, Value)],
        conditions: &Value,
    ) -> OrmResult<bool> {
        let mut builder = QueryBuilder::new(table, None);
        let sql = builder.update_statement(data, conditions)?;
        self.execute(&sql, builder.values()).await
    }

    /// Delete rows matching a conditions tree; returns the affected count.
    pub async fn delete(&self, table: &str, conditions: &Value) -> OrmResult<u64> {
        let mut builder = QueryBuilder::new(table, None);
        let sql = builder.delete_statement(conditions)?;
        self.write(&sql, builder.values()).await
    }

    /// Snapshot of the capped statement log, oldest first.
    pub fn log(&self) -> Vec<QueryLog> {
        self.log
            .lock()
            .expect("query log")
            .iter()
            .cloned()
            .collect()
    }

    fn record(&self, sql: &str, params: &[(String, Value)], took: Duration) {
        debug!(sql, ?took, "statement");
        let mut log = self.log.lock().expect("query log");
        log.push_back(QueryLog {
            sql: sql.to_string(),
            params: params.to_vec(),
            took,
        });
        while log.len() > QUERY_LOG_LIMIT {
            log.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::SqliteDatasource;
    use serde_json::json;

    async fn connection() -> Connection {
        Connection::new(Box::new(SqliteDatasource::in_memory().unwrap()))
    }

    #[tokio::test]
    async fn begin_is_idempotent_and_commit_requires_a_transaction() {
        let conn = connection().await;
        assert!(!conn.transaction_started());
        assert!(conn.begin().await.unwrap());
        assert!(!conn.begin().await.unwrap());
        assert!(conn.transaction_started());

        assert!(conn.commit().await.unwrap());
        assert!(!conn.commit().await.unwrap());
        assert!(!conn.rollback().await.unwrap());
    }

    #[tokio::test]
    async fn failed_statement_rolls_back_open_transaction() {
        let conn = connection().await;
        conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY)", &[])
            .await
            .unwrap();
        conn.begin().await.unwrap();
        assert!(conn.execute("INSERT INTO nope VALUES (1)", &[]).await.is_err());
        assert!(!conn.transaction_started());
    }

    #[tokio::test]
    async fn insert_update_delete_helpers() {
        let conn = connection().await;
        conn.execute(
            "CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT)",
            &[],
        )
        .await
        .unwrap();

        conn.insert("notes", &[("body".to_string(), json!("a"))])
            .await
            .unwrap();
        assert_eq!(conn.last_insert_id().await.unwrap(), Some(1));

        conn.update(
            "notes",
            &[("body".to_string(), json!("b"))],
            &json!({"id": 1}),
        )
        .await
        .unwrap();

        let rows = conn
            .select("SELECT body FROM notes WHERE id = :n0", &[("n0".into(), json!(1))])
            .await
            .unwrap();
        assert_eq!(rows[0].values[0], json!("b"));

        let affected = conn.delete("notes", &json!({"id": 1})).await.unwrap();
        assert_eq!(affected, 1);
    }

    #[tokio::test]
    async fn query_log_caps_at_limit() {
        let conn = connection().await;
        conn.execute("CREATE TABLE t (id INTEGER)", &[]).await.unwrap();
        for i in 0..(QUERY_LOG_LIMIT + 10) {
            conn.execute(
                "INSERT INTO t (id) VALUES (:t0)",
                &[("t0".to_string(), json!(i))],
            )
            .await
            .unwrap();
        }
        let log = conn.log();
        assert_eq!(log.len(), QUERY_LOG_LIMIT);
        // oldest entries (CREATE TABLE and the first ten inserts) were evicted
        assert_eq!(log[0].params[0].1, json!(10));
    }

    #[tokio::test]
    async fn execute_is_true_for_zero_affected_rows() {
        let conn = connection().await;
        conn.execute("CREATE TABLE t (id INTEGER)", &[]).await.unwrap();
        assert!(conn
            .execute("DELETE FROM t WHERE id = 99", &[])
            .await
            .unwrap());
    }
}
