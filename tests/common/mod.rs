#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};

use entregas::db::dialect::{MSSQL_IDENTITY_SUFFIX, count_placeholders};
use entregas::db::mssql::identity_metadata;
use entregas::db::{
    Database, Engine, QueryError, QueryExecutor, QueryOutput, Row, Statement, StatementKind,
    TransactionExecutor, Value,
};

pub const TEST_KEY: &str = "test-key";

/// In-memory `entregas` table that understands the statement shapes the
/// delivery service sends. It checks that every statement reaches it in the
/// engine's native dialect, the way a real driver would reject foreign SQL.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub rows: Vec<Row>,
    pub next_id: i64,
}

#[derive(Default)]
struct Shared {
    table: Table,
    log: Vec<Statement>,
}

#[derive(Clone)]
pub struct MemoryExecutor {
    engine: Engine,
    shared: Arc<Mutex<Shared>>,
}

impl MemoryExecutor {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            shared: Arc::new(Mutex::new(Shared::default())),
        }
    }

    /// Native SQL of every statement seen so far, including transactional ones.
    pub fn executed(&self) -> Vec<Statement> {
        self.shared.lock().unwrap().log.clone()
    }

    pub fn row_count(&self) -> usize {
        self.shared.lock().unwrap().table.rows.len()
    }

    pub fn database(&self) -> Database {
        Database::with_executor(Arc::new(self.clone()), Duration::from_secs(5))
    }
}

#[async_trait]
impl QueryExecutor for MemoryExecutor {
    fn engine(&self) -> Engine {
        self.engine
    }

    fn target(&self) -> String {
        format!("memory/{}", self.engine)
    }

    async fn run(&self, stmt: &Statement) -> Result<QueryOutput, QueryError> {
        let mut shared = self.shared.lock().unwrap();
        shared.log.push(stmt.clone());
        apply(self.engine, &mut shared.table, stmt)
    }

    async fn run_script(&self, _script: &str) -> Result<(), QueryError> {
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn TransactionExecutor>, QueryError> {
        let snapshot = self.shared.lock().unwrap().table.clone();
        Ok(Box::new(MemoryTransaction {
            engine: self.engine,
            shared: self.shared.clone(),
            working: snapshot,
        }))
    }
}

struct MemoryTransaction {
    engine: Engine,
    shared: Arc<Mutex<Shared>>,
    working: Table,
}

#[async_trait]
impl TransactionExecutor for MemoryTransaction {
    async fn run(&mut self, stmt: &Statement) -> Result<QueryOutput, QueryError> {
        self.shared.lock().unwrap().log.push(stmt.clone());
        apply(self.engine, &mut self.working, stmt)
    }

    async fn commit(self: Box<Self>) -> Result<(), QueryError> {
        let MemoryTransaction {
            shared, working, ..
        } = *self;
        let mut shared = shared.lock().unwrap();
        for row in working.rows {
            let id = row_id(&row);
            match shared.table.rows.iter_mut().find(|r| row_id(r) == id) {
                Some(slot) => *slot = row,
                None => shared.table.rows.push(row),
            }
        }
        shared.table.next_id = shared.table.next_id.max(working.next_id);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), QueryError> {
        Ok(())
    }

    fn abandon(self: Box<Self>) {}
}

fn row_id(row: &Row) -> Option<i64> {
    row.get("id").and_then(Value::as_i64)
}

fn unsupported(engine: Engine, stmt: &Statement, why: &str) -> QueryError {
    QueryError::driver(engine, stmt, why)
}

fn check_native(engine: Engine, stmt: &Statement) -> Result<(), QueryError> {
    match engine {
        Engine::MySql => {
            if stmt.sql.contains("@P") || count_placeholders(&stmt.sql) != stmt.params.len() {
                return Err(unsupported(engine, stmt, "expected ? placeholders"));
            }
        }
        Engine::MsSql => {
            if stmt.sql.contains('?') || stmt.sql.contains("NOW()") {
                return Err(unsupported(engine, stmt, "untranslated SQL"));
            }
            for n in 1..=stmt.params.len() {
                if !stmt.sql.contains(&format!("@P{n}")) {
                    return Err(unsupported(engine, stmt, "missing named parameter"));
                }
            }
            if stmt.kind == StatementKind::Insert && !stmt.sql.ends_with(MSSQL_IDENTITY_SUFFIX) {
                return Err(unsupported(engine, stmt, "insert without identity query"));
            }
        }
    }
    Ok(())
}

fn now() -> NaiveDateTime {
    chrono::Utc::now().naive_utc()
}

fn apply(engine: Engine, table: &mut Table, stmt: &Statement) -> Result<QueryOutput, QueryError> {
    check_native(engine, stmt)?;
    let template = stmt.template.trim();
    let id_param = || stmt.params.last().and_then(Value::as_i64);

    if template.starts_with("SELECT 1 + 1") {
        return Ok(QueryOutput::from_rows(vec![Row::new().with("solution", 2)]));
    }

    if template.starts_with("INSERT INTO entregas") {
        let open = template.find('(').unwrap_or_default();
        let close = template.find(')').unwrap_or_default();
        let columns: Vec<&str> = template[open + 1..close].split(',').map(str::trim).collect();

        table.next_id += 1;
        let id = table.next_id;
        let mut row = Row::new().with("id", id);
        for (col, value) in columns.iter().zip(&stmt.params) {
            row.push(*col, value.clone());
        }
        row.push("fecha_creacion", Value::DateTime(now()));
        row.push("fecha_actualizacion", Value::Null);
        table.rows.push(row);

        return Ok(match engine {
            Engine::MySql => QueryOutput::written(1, u64::try_from(id).ok()),
            Engine::MsSql => {
                let meta = Row::new().with("affected_rows", 1).with("insert_id", id);
                let (affected, insert_id) = identity_metadata(&[Vec::new(), vec![meta]]);
                QueryOutput::written(affected, insert_id)
            }
        });
    }

    if template.starts_with("SELECT * FROM entregas WHERE id = ?")
        || template.starts_with("SELECT id FROM entregas WHERE id = ?")
    {
        let id = id_param();
        let rows = table
            .rows
            .iter()
            .filter(|r| row_id(r) == id)
            .cloned()
            .collect();
        return Ok(QueryOutput::from_rows(rows));
    }

    if template.starts_with("SELECT * FROM entregas WHERE 1=1") {
        return Ok(QueryOutput::from_rows(list(table, template, &stmt.params)));
    }

    if template.starts_with("UPDATE entregas SET") {
        let id = id_param();
        let Some(row) = table.rows.iter_mut().find(|r| row_id(r) == id) else {
            return Ok(QueryOutput::written(0, None));
        };
        let columns: Vec<&str> = template
            .split("COALESCE(?, ")
            .skip(1)
            .filter_map(|part| part.split(')').next())
            .collect();
        let mut updated = Row::new();
        for (col, value) in row.iter() {
            let next = match columns.iter().position(|c| *c == col) {
                Some(i) if !stmt.params[i].is_null() => stmt.params[i].clone(),
                _ if col == "fecha_actualizacion" => Value::DateTime(now()),
                _ => value.clone(),
            };
            updated.push(col, next);
        }
        *row = updated;
        return Ok(QueryOutput::written(1, None));
    }

    if template.starts_with("DELETE FROM entregas WHERE id = ?") {
        let id = id_param();
        let before = table.rows.len();
        table.rows.retain(|r| row_id(r) != id);
        return Ok(QueryOutput::written((before - table.rows.len()) as u64, None));
    }

    if template.starts_with("SELECT c.id, c.nombre") {
        return Ok(QueryOutput::from_rows(vec![
            Row::new()
                .with("id", 1)
                .with("nombre", "Providencia")
                .with("region_nombre", "Metropolitana"),
            Row::new()
                .with("id", 2)
                .with("nombre", "Valparaíso")
                .with("region_nombre", "Valparaíso"),
        ]));
    }

    Err(unsupported(engine, stmt, "statement not understood by memory table"))
}

/// Exact `col = ?` and `col LIKE ?` filters; other clauses consume their
/// parameters without filtering. Newest first.
fn list(table: &Table, template: &str, params: &[Value]) -> Vec<Row> {
    let where_part = template
        .split(" ORDER BY ")
        .next()
        .unwrap_or_default()
        .trim_start_matches("SELECT * FROM entregas WHERE 1=1");

    let mut rows: Vec<Row> = table.rows.clone();
    let mut next = 0;
    for clause in where_part.split(" AND ").map(str::trim).filter(|c| !c.is_empty()) {
        let needed = count_placeholders(clause);
        let args = &params[next..next + needed];
        next += needed;

        if let Some(col) = clause.strip_suffix(" = ?") {
            let want = args[0].clone();
            rows.retain(|r| r.get(col) == Some(&want));
        } else if let Some(col) = clause.strip_suffix(" LIKE ?") {
            let needle = args[0].as_str().unwrap_or_default().trim_matches('%').to_lowercase();
            rows.retain(|r| {
                r.get(col)
                    .and_then(Value::as_str)
                    .is_some_and(|v| v.to_lowercase().contains(&needle))
            });
        }
    }

    rows.sort_by_key(|r| std::cmp::Reverse(row_id(r)));
    rows
}

/// Executor whose statements never finish in time.
pub struct StalledExecutor(pub Engine);

#[async_trait]
impl QueryExecutor for StalledExecutor {
    fn engine(&self) -> Engine {
        self.0
    }

    fn target(&self) -> String {
        "stalled".to_string()
    }

    async fn run(&self, _stmt: &Statement) -> Result<QueryOutput, QueryError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(QueryOutput::default())
    }

    async fn run_script(&self, _script: &str) -> Result<(), QueryError> {
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn TransactionExecutor>, QueryError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Err(QueryError::TransactionClosed {
            sql: "BEGIN".to_string(),
        })
    }
}

/// Executor that refuses every connection attempt.
pub struct UnreachableExecutor;

#[async_trait]
impl QueryExecutor for UnreachableExecutor {
    fn engine(&self) -> Engine {
        Engine::MySql
    }

    fn target(&self) -> String {
        "root@db.invalid:3306/registro_entregas".to_string()
    }

    async fn run(&self, stmt: &Statement) -> Result<QueryOutput, QueryError> {
        Err(QueryError::driver(Engine::MySql, stmt, "connection refused"))
    }

    async fn run_script(&self, script: &str) -> Result<(), QueryError> {
        Err(QueryError::control(Engine::MySql, script, "connection refused"))
    }

    async fn begin(&self) -> Result<Box<dyn TransactionExecutor>, QueryError> {
        Err(QueryError::control(Engine::MySql, "BEGIN", "connection refused"))
    }
}

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Executor whose pool never frees a connection.
pub struct ExhaustedExecutor(pub Engine);

impl ExhaustedExecutor {
    pub const WAITED: Duration = Duration::from_secs(30);

    fn exhausted(&self, sql: &str) -> QueryError {
        QueryError::PoolExhausted {
            engine: self.0,
            sql: sql.to_string(),
            waited: Self::WAITED,
        }
    }
}

#[async_trait]
impl QueryExecutor for ExhaustedExecutor {
    fn engine(&self) -> Engine {
        self.0
    }

    fn target(&self) -> String {
        "exhausted".to_string()
    }

    async fn run(&self, stmt: &Statement) -> Result<QueryOutput, QueryError> {
        Err(self.exhausted(&stmt.template))
    }

    async fn run_script(&self, script: &str) -> Result<(), QueryError> {
        Err(self.exhausted(script))
    }

    async fn begin(&self) -> Result<Box<dyn TransactionExecutor>, QueryError> {
        Err(self.exhausted("BEGIN"))
    }
}
