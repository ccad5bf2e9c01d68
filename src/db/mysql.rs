//! MySQL engine on a sqlx connection pool.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use sqlx::mysql::{
    MySql, MySqlArguments, MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow,
    MySqlSslMode,
};
use sqlx::query::Query;
use sqlx::{Column, Executor, Row as _, TypeInfo, ValueRef};
use tracing::warn;

use super::dialect::{Engine, Statement, StatementKind};
use super::error::QueryError;
use super::executor::{QueryExecutor, QueryOutput, TransactionExecutor};
use super::value::{Row, Value};
use crate::config::{DatabaseConfig, TlsMode};

pub struct MySqlExecutor {
    pool: MySqlPool,
    target: String,
    acquire_timeout: Duration,
}

impl MySqlExecutor {
    /// Build the pool without connecting; connections open on first use.
    pub fn connect_lazy(cfg: &DatabaseConfig) -> Self {
        let ssl_mode = match cfg.tls {
            TlsMode::Disabled => MySqlSslMode::Disabled,
            TlsMode::Preferred => MySqlSslMode::Preferred,
            TlsMode::Required => MySqlSslMode::Required,
        };
        let port = cfg.port_or_default();
        let options = MySqlConnectOptions::new()
            .host(&cfg.host)
            .port(port)
            .username(&cfg.user)
            .password(&cfg.password)
            .database(&cfg.name)
            .ssl_mode(ssl_mode);

        let pool = MySqlPoolOptions::new()
            .max_connections(cfg.pool_size.max(1))
            .acquire_timeout(cfg.acquire_timeout())
            .connect_lazy_with(options);

        Self {
            pool,
            target: format!("{}@{}:{}/{}", cfg.user, cfg.host, port, cfg.name),
            acquire_timeout: cfg.acquire_timeout(),
        }
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

#[async_trait]
impl QueryExecutor for MySqlExecutor {
    fn engine(&self) -> Engine {
        Engine::MySql
    }

    fn target(&self) -> String {
        self.target.clone()
    }

    async fn run(&self, stmt: &Statement) -> Result<QueryOutput, QueryError> {
        run_with(&self.pool, stmt).await.map_err(|e| {
            pool_exhausted(&e, &stmt.template, self.acquire_timeout)
                .unwrap_or_else(|| QueryError::driver(Engine::MySql, stmt, e))
        })
    }

    async fn run_script(&self, script: &str) -> Result<(), QueryError> {
        sqlx::raw_sql(script)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                pool_exhausted(&e, script, self.acquire_timeout)
                    .unwrap_or_else(|| QueryError::control(Engine::MySql, script, e))
            })?;
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn TransactionExecutor>, QueryError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| {
                pool_exhausted(&e, "BEGIN", self.acquire_timeout)
                    .unwrap_or_else(|| QueryError::control(Engine::MySql, "BEGIN", e))
            })?;
        Ok(Box::new(MySqlTransaction { tx }))
    }
}

struct MySqlTransaction {
    tx: sqlx::Transaction<'static, MySql>,
}

#[async_trait]
impl TransactionExecutor for MySqlTransaction {
    async fn run(&mut self, stmt: &Statement) -> Result<QueryOutput, QueryError> {
        run_with(&mut *self.tx, stmt)
            .await
            .map_err(|e| QueryError::driver(Engine::MySql, stmt, e))
    }

    async fn commit(self: Box<Self>) -> Result<(), QueryError> {
        self.tx
            .commit()
            .await
            .map_err(|e| QueryError::control(Engine::MySql, "COMMIT", e))
    }

    async fn rollback(self: Box<Self>) -> Result<(), QueryError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| QueryError::control(Engine::MySql, "ROLLBACK", e))
    }

    fn abandon(self: Box<Self>) {
        // sqlx queues a ROLLBACK when an open transaction is dropped.
        drop(self.tx);
    }
}

/// sqlx reports a full pool as `PoolTimedOut` once `acquire_timeout` elapses.
fn pool_exhausted(err: &sqlx::Error, sql: &str, waited: Duration) -> Option<QueryError> {
    matches!(err, sqlx::Error::PoolTimedOut).then(|| QueryError::PoolExhausted {
        engine: Engine::MySql,
        sql: sql.to_string(),
        waited,
    })
}

async fn run_with<'c, E>(executor: E, stmt: &Statement) -> Result<QueryOutput, sqlx::Error>
where
    E: Executor<'c, Database = MySql>,
{
    let query = bind_params(sqlx::query(&stmt.sql), &stmt.params);
    match stmt.kind {
        StatementKind::Read => {
            let rows = query.fetch_all(executor).await?;
            let rows = rows.iter().map(decode_row).collect::<Result<Vec<_>, _>>()?;
            Ok(QueryOutput::from_rows(rows))
        }
        StatementKind::Insert => {
            let done = query.execute(executor).await?;
            Ok(QueryOutput::written(
                done.rows_affected(),
                Some(done.last_insert_id()),
            ))
        }
        StatementKind::Write => {
            let done = query.execute(executor).await?;
            Ok(QueryOutput::written(done.rows_affected(), None))
        }
    }
}

fn bind_params<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    params: &'q [Value],
) -> Query<'q, MySql, MySqlArguments> {
    for param in params {
        query = match param {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Int(i) => query.bind(*i),
            Value::Float(f) => query.bind(*f),
            Value::Decimal(s) | Value::Text(s) => query.bind(s.as_str()),
            Value::Bytes(b) => query.bind(b.as_slice()),
            Value::Date(d) => query.bind(*d),
            Value::DateTime(dt) => query.bind(*dt),
        };
    }
    query
}

fn decode_row(row: &MySqlRow) -> Result<Row, sqlx::Error> {
    row.columns()
        .iter()
        .map(|col| {
            let idx = col.ordinal();
            let value = if row.try_get_raw(idx)?.is_null() {
                Value::Null
            } else {
                decode_cell(row, idx, col.type_info().name())?
            };
            Ok((col.name().to_string(), value))
        })
        .collect()
}

fn decode_cell(row: &MySqlRow, idx: usize, type_name: &str) -> Result<Value, sqlx::Error> {
    let value = match type_name {
        "BOOLEAN" => Value::Bool(row.try_get(idx)?),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => Value::Int(row.try_get(idx)?),
        name if name.ends_with("UNSIGNED") => Value::from(row.try_get::<u64, _>(idx)?),
        "YEAR" => Value::Int(row.try_get_unchecked(idx)?),
        "FLOAT" => Value::Float(f64::from(row.try_get::<f32, _>(idx)?)),
        "DOUBLE" => Value::Float(row.try_get(idx)?),
        "DECIMAL" => Value::Decimal(row.try_get_unchecked(idx)?),
        "DATE" => Value::Date(row.try_get::<NaiveDate, _>(idx)?),
        "DATETIME" | "TIMESTAMP" => Value::DateTime(row.try_get::<NaiveDateTime, _>(idx)?),
        "TIME" => Value::Text(row.try_get::<NaiveTime, _>(idx)?.to_string()),
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
            Value::Bytes(row.try_get(idx)?)
        }
        other => match row.try_get_unchecked::<String, _>(idx) {
            Ok(text) => Value::Text(text),
            Err(e) => {
                warn!(column_type = other, error = %e, "undecodable column; returning raw bytes");
                Value::Bytes(row.try_get_unchecked(idx)?)
            }
        },
    };
    Ok(value)
}
