use std::fmt::Display;
use std::time::Duration;

use thiserror::Error as ThisError;

use super::dialect::{Engine, Statement};

/// Failure of a single statement. Always names the template it came from.
#[derive(Debug, ThisError)]
pub enum QueryError {
    #[error("{engine} query failed: {message} (sql: {sql}, params: {param_count})")]
    Driver {
        engine: Engine,
        message: String,
        sql: String,
        param_count: usize,
    },

    #[error("statement has {expected} placeholders but {got} params were supplied (sql: {sql})")]
    ParamCountMismatch {
        expected: usize,
        got: usize,
        sql: String,
    },

    #[error("query timed out after {timeout:?} (sql: {sql})")]
    Timeout { sql: String, timeout: Duration },

    /// Every pooled connection stayed busy for the whole acquire timeout.
    #[error("{engine} pool exhausted: no connection free within {waited:?} (sql: {sql})")]
    PoolExhausted {
        engine: Engine,
        sql: String,
        waited: Duration,
    },

    #[error("transaction is no longer usable (sql: {sql})")]
    TransactionClosed { sql: String },
}

impl QueryError {
    pub fn driver(engine: Engine, stmt: &Statement, err: impl Display) -> Self {
        QueryError::Driver {
            engine,
            message: err.to_string(),
            sql: stmt.template.clone(),
            param_count: stmt.params.len(),
        }
    }

    /// Driver failure for control statements such as `BEGIN` or DDL scripts.
    pub fn control(engine: Engine, sql: &str, err: impl Display) -> Self {
        QueryError::Driver {
            engine,
            message: err.to_string(),
            sql: sql.to_string(),
            param_count: 0,
        }
    }

    pub fn sql(&self) -> &str {
        match self {
            QueryError::Driver { sql, .. }
            | QueryError::ParamCountMismatch { sql, .. }
            | QueryError::Timeout { sql, .. }
            | QueryError::PoolExhausted { sql, .. }
            | QueryError::TransactionClosed { sql } => sql,
        }
    }
}

/// The configured engine could not be reached while the process was starting.
#[derive(Debug, ThisError)]
#[error("cannot reach {engine} database at {target}: {source}")]
pub struct StartupConnectivityError {
    pub engine: Engine,
    pub target: String,
    #[source]
    pub source: QueryError,
}
