use async_trait::async_trait;
use serde::Serialize;

use super::dialect::{Engine, Statement};
use super::error::QueryError;
use super::value::Row;

/// Normalized result of one statement, identical for every engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryOutput {
    /// Result records for reads; empty (never absent) when nothing matched.
    pub rows: Vec<Row>,
    pub affected_rows: u64,
    /// Identity generated by an `INSERT`; `None` when the table has none.
    pub insert_id: Option<u64>,
}

impl QueryOutput {
    pub fn from_rows(rows: Vec<Row>) -> Self {
        Self {
            rows,
            ..Default::default()
        }
    }

    pub fn written(affected_rows: u64, insert_id: Option<u64>) -> Self {
        Self {
            rows: Vec::new(),
            affected_rows,
            insert_id: insert_id.filter(|id| *id != 0),
        }
    }

    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

/// One engine behind the shim. Chosen once when the `Database` is built.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    fn engine(&self) -> Engine;

    /// Human-readable connection target for diagnostics, without secrets.
    fn target(&self) -> String;

    /// Run one prepared statement on a pooled connection (auto-commit).
    async fn run(&self, stmt: &Statement) -> Result<QueryOutput, QueryError>;

    /// Run an untranslated, unparameterized batch such as DDL.
    async fn run_script(&self, script: &str) -> Result<(), QueryError>;

    /// Check out a dedicated connection and start a transaction on it.
    async fn begin(&self) -> Result<Box<dyn TransactionExecutor>, QueryError>;
}

/// An open engine transaction pinned to one connection.
#[async_trait]
pub trait TransactionExecutor: Send {
    async fn run(&mut self, stmt: &Statement) -> Result<QueryOutput, QueryError>;

    async fn commit(self: Box<Self>) -> Result<(), QueryError>;

    async fn rollback(self: Box<Self>) -> Result<(), QueryError>;

    /// Called when the owning handle is dropped without commit or rollback.
    /// Must not block; the connection may only return to the pool rolled back.
    fn abandon(self: Box<Self>);
}
