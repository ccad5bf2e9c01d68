//! SQL Server engine: tiberius clients pooled with bb8.
//!
//! Inserts carry their own identity fetch (see
//! [`MSSQL_IDENTITY_SUFFIX`](super::dialect::MSSQL_IDENTITY_SUFFIX)), and
//! transactions pin one pooled client for their whole scope.

use std::time::Duration;

use async_trait::async_trait;
use bb8::{ManageConnection, Pool, PooledConnection, RunError};
use bb8_tiberius::ConnectionManager;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use tiberius::{AuthMethod, ColumnData, EncryptionLevel, FromSql, Query};
use tracing::{error, warn};

use super::dialect::{Engine, Statement, StatementKind};
use super::error::QueryError;
use super::executor::{QueryExecutor, QueryOutput, TransactionExecutor};
use super::value::{Row, Value};
use crate::config::{DatabaseConfig, TlsMode};

type MsSqlClient = <ConnectionManager as ManageConnection>::Connection;
type MsSqlConnection = PooledConnection<'static, ConnectionManager>;

pub struct MsSqlExecutor {
    pool: Pool<ConnectionManager>,
    target: String,
    acquire_timeout: Duration,
}

impl MsSqlExecutor {
    /// Build the pool without connecting; clients open on first checkout.
    pub fn connect_lazy(cfg: &DatabaseConfig) -> Self {
        let port = cfg.port_or_default();
        let mut config = tiberius::Config::new();
        config.host(&cfg.host);
        config.port(port);
        config.database(&cfg.name);
        config.authentication(AuthMethod::sql_server(&cfg.user, &cfg.password));
        config.encryption(match cfg.tls {
            TlsMode::Disabled => EncryptionLevel::NotSupported,
            TlsMode::Preferred => EncryptionLevel::Off,
            TlsMode::Required => EncryptionLevel::Required,
        });
        if cfg.trust_cert {
            config.trust_cert();
        }

        let pool = Pool::builder()
            .max_size(cfg.pool_size.max(1))
            .connection_timeout(cfg.acquire_timeout())
            .build_unchecked(ConnectionManager::new(config));

        Self {
            pool,
            target: format!("{}@{}:{}/{}", cfg.user, cfg.host, port, cfg.name),
            acquire_timeout: cfg.acquire_timeout(),
        }
    }

    async fn checkout(&self, sql: &str) -> Result<MsSqlConnection, QueryError> {
        self.pool
            .get_owned()
            .await
            .map_err(|e| checkout_error(sql, self.acquire_timeout, e))
    }
}

fn checkout_error(sql: &str, waited: Duration, err: RunError<bb8_tiberius::Error>) -> QueryError {
    match err {
        RunError::TimedOut => QueryError::PoolExhausted {
            engine: Engine::MsSql,
            sql: sql.to_string(),
            waited,
        },
        RunError::User(e) => QueryError::control(Engine::MsSql, sql, e),
    }
}

#[async_trait]
impl QueryExecutor for MsSqlExecutor {
    fn engine(&self) -> Engine {
        Engine::MsSql
    }

    fn target(&self) -> String {
        self.target.clone()
    }

    async fn run(&self, stmt: &Statement) -> Result<QueryOutput, QueryError> {
        let mut conn = self.checkout(&stmt.template).await?;
        run_on(&mut conn, stmt)
            .await
            .map_err(|e| QueryError::driver(Engine::MsSql, stmt, e))
    }

    async fn run_script(&self, script: &str) -> Result<(), QueryError> {
        let mut conn = self.checkout(script).await?;
        conn.simple_query(script)
            .await
            .map_err(|e| QueryError::control(Engine::MsSql, script, e))?
            .into_results()
            .await
            .map_err(|e| QueryError::control(Engine::MsSql, script, e))?;
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn TransactionExecutor>, QueryError> {
        let mut conn = self.checkout("BEGIN TRANSACTION").await?;
        control(&mut conn, "BEGIN TRANSACTION").await?;
        Ok(Box::new(MsSqlTransaction { conn: Some(conn) }))
    }
}

/// Open transaction holding its client until commit, rollback or abandon.
struct MsSqlTransaction {
    conn: Option<MsSqlConnection>,
}

impl MsSqlTransaction {
    fn conn(&mut self, sql: &str) -> Result<&mut MsSqlConnection, QueryError> {
        self.conn.as_mut().ok_or_else(|| QueryError::TransactionClosed {
            sql: sql.to_string(),
        })
    }

    async fn finish(mut self: Box<Self>, sql: &'static str) -> Result<(), QueryError> {
        let mut conn = self.conn.take().ok_or(QueryError::TransactionClosed {
            sql: sql.to_string(),
        })?;
        control(&mut conn, sql).await
    }
}

#[async_trait]
impl TransactionExecutor for MsSqlTransaction {
    async fn run(&mut self, stmt: &Statement) -> Result<QueryOutput, QueryError> {
        let conn = self.conn(&stmt.template)?;
        run_on(conn, stmt)
            .await
            .map_err(|e| QueryError::driver(Engine::MsSql, stmt, e))
    }

    async fn commit(self: Box<Self>) -> Result<(), QueryError> {
        self.finish("COMMIT TRANSACTION").await
    }

    async fn rollback(self: Box<Self>) -> Result<(), QueryError> {
        self.finish("ROLLBACK TRANSACTION").await
    }

    fn abandon(mut self: Box<Self>) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let sql = "IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION";
                    if let Err(e) = control(&mut conn, sql).await {
                        warn!(error = %e, "rollback of abandoned transaction failed");
                    }
                });
            }
            Err(_) => {
                error!("transaction abandoned outside a runtime; connection returned without rollback");
            }
        }
    }
}

async fn control(client: &mut MsSqlClient, sql: &str) -> Result<(), QueryError> {
    client
        .simple_query(sql)
        .await
        .map_err(|e| QueryError::control(Engine::MsSql, sql, e))?
        .into_results()
        .await
        .map_err(|e| QueryError::control(Engine::MsSql, sql, e))?;
    Ok(())
}

async fn run_on(
    client: &mut MsSqlClient,
    stmt: &Statement,
) -> Result<QueryOutput, tiberius::error::Error> {
    let mut query = Query::new(stmt.sql.as_str());
    for param in &stmt.params {
        bind_param(&mut query, param);
    }

    match stmt.kind {
        StatementKind::Read => {
            let rows = query.query(client).await?.into_first_result().await?;
            let rows = rows.into_iter().map(decode_row).collect::<Result<Vec<_>, _>>()?;
            Ok(QueryOutput::from_rows(rows))
        }
        StatementKind::Insert => {
            let sets = query.query(client).await?.into_results().await?;
            let sets = sets
                .into_iter()
                .map(|set| set.into_iter().map(decode_row).collect::<Result<Vec<_>, _>>())
                .collect::<Result<Vec<_>, _>>()?;
            let (affected_rows, insert_id) = identity_metadata(&sets);
            Ok(QueryOutput::written(affected_rows, insert_id))
        }
        StatementKind::Write => {
            let done = query.execute(client).await?;
            Ok(QueryOutput::written(done.total(), None))
        }
    }
}

/// Read `affected_rows` / `insert_id` from the trailing identity result set.
pub fn identity_metadata(sets: &[Vec<Row>]) -> (u64, Option<u64>) {
    let Some(meta) = sets.last().and_then(|set| set.first()) else {
        return (0, None);
    };
    let affected = meta
        .get("affected_rows")
        .and_then(Value::as_i64)
        .and_then(|n| u64::try_from(n).ok())
        .unwrap_or(0);
    let insert_id = meta
        .get("insert_id")
        .and_then(Value::as_i64)
        .and_then(|n| u64::try_from(n).ok())
        .filter(|id| *id != 0);
    (affected, insert_id)
}

fn bind_param<'a>(query: &mut Query<'a>, param: &'a Value) {
    match param {
        Value::Null => query.bind(Option::<&str>::None),
        Value::Bool(b) => query.bind(*b),
        Value::Int(i) => query.bind(*i),
        Value::Float(f) => query.bind(*f),
        Value::Decimal(s) | Value::Text(s) => query.bind(s.as_str()),
        Value::Bytes(b) => query.bind(b.as_slice()),
        Value::Date(d) => query.bind(*d),
        Value::DateTime(dt) => query.bind(*dt),
    }
}

fn decode_row(row: tiberius::Row) -> Result<Row, tiberius::error::Error> {
    let names: Vec<String> = row.columns().iter().map(|c| c.name().to_string()).collect();
    names
        .into_iter()
        .zip(row)
        .map(|(name, data)| Ok((name, decode_cell(&data)?)))
        .collect()
}

fn decode_cell(data: &ColumnData<'static>) -> Result<Value, tiberius::error::Error> {
    let value = match data {
        ColumnData::U8(v) => v.map(|n| Value::Int(i64::from(n))),
        ColumnData::I16(v) => v.map(|n| Value::Int(i64::from(n))),
        ColumnData::I32(v) => v.map(|n| Value::Int(i64::from(n))),
        ColumnData::I64(v) => v.map(Value::Int),
        ColumnData::F32(v) => v.map(|n| Value::Float(f64::from(n))),
        ColumnData::F64(v) => v.map(Value::Float),
        ColumnData::Bit(v) => v.map(Value::Bool),
        ColumnData::String(v) => v.as_ref().map(|s| Value::Text(s.to_string())),
        ColumnData::Guid(v) => v.as_ref().map(|g| Value::Text(g.to_string())),
        ColumnData::Binary(v) => v.as_ref().map(|b| Value::Bytes(b.to_vec())),
        ColumnData::Numeric(v) => v.as_ref().map(|n| Value::Decimal(n.to_string())),
        ColumnData::Xml(v) => v
            .as_ref()
            .map(|x| Value::Text(x.clone().into_owned().into_string())),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            NaiveDateTime::from_sql(data)?.map(Value::DateTime)
        }
        ColumnData::Date(_) => NaiveDate::from_sql(data)?.map(Value::Date),
        ColumnData::Time(_) => NaiveTime::from_sql(data)?.map(|t| Value::Text(t.to_string())),
        ColumnData::DateTimeOffset(_) => {
            DateTime::<Utc>::from_sql(data)?.map(|dt| Value::DateTime(dt.naive_utc()))
        }
    };
    Ok(value.unwrap_or(Value::Null))
}
