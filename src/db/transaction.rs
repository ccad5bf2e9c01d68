use std::time::Duration;

use tracing::{debug, warn};

use super::dialect::{Engine, Statement};
use super::error::QueryError;
use super::executor::{QueryOutput, TransactionExecutor};
use super::value::Value;

/// Scoped transaction bound to a single connection.
///
/// Statements need `&mut self`, so one caller at a time drives it. Dropping an
/// unfinished transaction rolls it back.
pub struct Transaction {
    inner: Option<Box<dyn TransactionExecutor>>,
    engine: Engine,
    query_timeout: Duration,
}

impl Transaction {
    pub(crate) fn new(
        inner: Box<dyn TransactionExecutor>,
        engine: Engine,
        query_timeout: Duration,
    ) -> Self {
        Self {
            inner: Some(inner),
            engine,
            query_timeout,
        }
    }

    pub fn engine(&self) -> Engine {
        self.engine
    }

    pub async fn query(
        &mut self,
        sql: &str,
        params: Vec<Value>,
    ) -> Result<QueryOutput, QueryError> {
        let stmt = Statement::prepare(self.engine, sql, params)?;
        let Some(inner) = self.inner.as_mut() else {
            return Err(QueryError::TransactionClosed {
                sql: stmt.template,
            });
        };

        debug!(
            engine = %self.engine,
            kind = ?stmt.kind,
            params = stmt.params.len(),
            "executing statement in transaction"
        );
        match tokio::time::timeout(self.query_timeout, inner.run(&stmt)).await {
            Ok(result) => result,
            Err(_) => {
                // The connection is mid-statement; it cannot carry on this transaction.
                if let Some(inner) = self.inner.take() {
                    inner.abandon();
                }
                warn!(engine = %self.engine, sql = %stmt.template, "statement timed out; transaction abandoned");
                Err(QueryError::Timeout {
                    sql: stmt.template,
                    timeout: self.query_timeout,
                })
            }
        }
    }

    pub async fn commit(mut self) -> Result<(), QueryError> {
        match self.inner.take() {
            Some(inner) => inner.commit().await,
            None => Err(QueryError::TransactionClosed {
                sql: "COMMIT".to_string(),
            }),
        }
    }

    pub async fn rollback(mut self) -> Result<(), QueryError> {
        match self.inner.take() {
            Some(inner) => inner.rollback().await,
            None => Ok(()),
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            debug!(engine = %self.engine, "transaction dropped without commit; rolling back");
            inner.abandon();
        }
    }
}
