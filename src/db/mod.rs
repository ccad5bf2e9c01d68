//! Database access shim: one query interface over MySQL or SQL Server.
//!
//! Layout:
//! - `dialect.rs`: engine enum, `?` placeholder rewrite, statement classification
//! - `value.rs`: engine-neutral parameter/cell values and result rows
//! - `executor.rs`: the `QueryExecutor` strategy trait and normalized output
//! - `mysql.rs` / `mssql.rs`: the two engine implementations
//! - `transaction.rs`: scoped transaction handle
//! - `schema.rs`: DDL per engine

pub mod dialect;
pub mod error;
pub mod executor;
pub mod mssql;
pub mod mysql;
pub mod schema;
pub mod transaction;
pub mod value;

use std::sync::Arc;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use tracing::{debug, info, warn};

use crate::config::DatabaseConfig;

pub use dialect::{Engine, Statement, StatementKind};
pub use error::{QueryError, StartupConnectivityError};
pub use executor::{QueryExecutor, QueryOutput, TransactionExecutor};
pub use transaction::Transaction;
pub use value::{Row, Value};

/// Statement used to prove the engine answers queries.
pub const PING_SQL: &str = "SELECT 1 + 1 AS solution";

fn startup_retry_policy() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(500))
        .with_max_delay(Duration::from_secs(2))
        .with_max_times(2)
}

/// Owned handle to the configured engine. Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct Database {
    executor: Arc<dyn QueryExecutor>,
    query_timeout: Duration,
}

impl Database {
    /// Build the pool for the configured engine. Connections open lazily;
    /// call [`Database::verify_connectivity`] to fail fast at startup.
    pub fn connect(cfg: &DatabaseConfig) -> Self {
        let executor: Arc<dyn QueryExecutor> = match cfg.engine {
            Engine::MySql => Arc::new(mysql::MySqlExecutor::connect_lazy(cfg)),
            Engine::MsSql => Arc::new(mssql::MsSqlExecutor::connect_lazy(cfg)),
        };
        info!(
            engine = %cfg.engine,
            target = %executor.target(),
            pool_size = cfg.pool_size,
            "database pool configured"
        );
        Self::with_executor(executor, cfg.query_timeout())
    }

    pub fn with_executor(executor: Arc<dyn QueryExecutor>, query_timeout: Duration) -> Self {
        Self {
            executor,
            query_timeout,
        }
    }

    pub fn engine(&self) -> Engine {
        self.executor.engine()
    }

    /// Run a `?`-parameterized template on the shared pool (auto-commit).
    pub async fn query(&self, sql: &str, params: Vec<Value>) -> Result<QueryOutput, QueryError> {
        let stmt = Statement::prepare(self.engine(), sql, params)?;
        debug!(
            engine = %self.engine(),
            kind = ?stmt.kind,
            params = stmt.params.len(),
            "executing statement"
        );

        let result = tokio::time::timeout(self.query_timeout, self.executor.run(&stmt))
            .await
            .unwrap_or_else(|_| {
                Err(QueryError::Timeout {
                    sql: stmt.template.clone(),
                    timeout: self.query_timeout,
                })
            });
        if let Err(e) = &result {
            warn!(engine = %self.engine(), error = %e, "statement failed");
        }
        result
    }

    /// Shorthand for reads: only the rows.
    pub async fn fetch(&self, sql: &str, params: Vec<Value>) -> Result<Vec<Row>, QueryError> {
        Ok(self.query(sql, params).await?.into_rows())
    }

    /// Begin a transaction on a dedicated connection.
    pub async fn transaction(&self) -> Result<Transaction, QueryError> {
        let inner = tokio::time::timeout(self.query_timeout, self.executor.begin())
            .await
            .unwrap_or_else(|_| {
                Err(QueryError::Timeout {
                    sql: "BEGIN".to_string(),
                    timeout: self.query_timeout,
                })
            })?;
        Ok(Transaction::new(inner, self.engine(), self.query_timeout))
    }

    /// Run a DDL batch verbatim; no placeholder translation.
    pub async fn execute_script(&self, script: &str) -> Result<(), QueryError> {
        self.executor.run_script(script).await
    }

    /// Create the delivery tables if they are missing.
    pub async fn init_schema(&self) -> Result<(), QueryError> {
        self.execute_script(schema::init_script(self.engine())).await?;
        info!(engine = %self.engine(), "schema initialized");
        Ok(())
    }

    /// Prove the engine is reachable, retrying briefly before giving up.
    pub async fn verify_connectivity(&self) -> Result<(), StartupConnectivityError> {
        let attempt = || async {
            let rows = self.fetch(PING_SQL, Vec::new()).await?;
            debug!(solution = ?rows.first().and_then(|r| r.get("solution")), "ping answered");
            Ok::<_, QueryError>(())
        };

        attempt
            .retry(startup_retry_policy())
            .notify(|err: &QueryError, dur: Duration| {
                warn!(error = %err, retry_in = ?dur, "database not reachable yet");
            })
            .await
            .map_err(|source| StartupConnectivityError {
                engine: self.engine(),
                target: self.executor.target(),
                source,
            })?;

        info!(engine = %self.engine(), target = %self.executor.target(), "database connection verified");
        Ok(())
    }
}
