//! In-memory engine for session manager tests
//!
//! Implements the `Connector` / `Connection` traits over shared in-memory
//! tables with just enough transaction behaviour to exercise the manager:
//! - READ UNCOMMITTED / READ COMMITTED read the latest committed rows
//! - REPEATABLE READ / SERIALIZABLE read a snapshot taken at BEGIN
//! - a transaction sees its own writes; COMMIT publishes them
//! - an error inside a transaction aborts it until ROLLBACK
//!
//! Statements other than transaction control and `SELECT * FROM <table>` are
//! scripted with [`MemoryEngine::on`]. Locks and write conflicts are not modelled.

use async_trait::async_trait;
use isoscope::engine::row_id;
use isoscope::{
    ColumnInfo, Connection, Connector, EngineError, IsolationLevel, QueryResult, Row,
    TrackedTable,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Table name to (row id to row)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryTables {
    tables: BTreeMap<String, BTreeMap<String, Row>>,
}

impl MemoryTables {
    pub fn create(&mut self, table: &str) {
        self.tables.entry(table.to_string()).or_default();
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn row(&self, table: &str, id: &str) -> Option<&Row> {
        self.tables.get(table)?.get(id)
    }

    pub fn row_mut(&mut self, table: &str, id: &str) -> Option<&mut Row> {
        self.tables.get_mut(table)?.get_mut(id)
    }

    /// Insert a row keyed by its `id` column; fails like a primary key would
    pub fn insert(&mut self, table: &str, row: Row) -> Result<(), EngineError> {
        let id = row_id(&row, "id")
            .ok_or_else(|| EngineError::new("null value in column \"id\"").with_code("23502"))?;
        let rows = self
            .tables
            .get_mut(table)
            .ok_or_else(|| relation_missing(table))?;
        if rows.contains_key(&id) {
            return Err(EngineError::new(format!(
                "duplicate key value violates unique constraint \"{}_pkey\"",
                table
            ))
            .with_code("23505")
            .with_detail(format!("Key (id)=({}) already exists.", id)));
        }
        rows.insert(id, row);
        Ok(())
    }

    pub fn delete(&mut self, table: &str, id: &str) -> Option<Row> {
        self.tables.get_mut(table)?.remove(id)
    }

    /// Add `delta` to a numeric column
    pub fn add(&mut self, table: &str, id: &str, column: &str, delta: i64) -> Result<u64, EngineError> {
        let Some(row) = self.row_mut(table, id) else {
            return Ok(0);
        };
        let current = row.get(column).and_then(|v| v.as_i64()).unwrap_or(0);
        row.insert(column.to_string(), serde_json::json!(current + delta));
        Ok(1)
    }

    /// Rows of `self` that differ from `base`, as writes (None = deleted)
    fn writes_against(&self, base: &MemoryTables) -> BTreeMap<String, BTreeMap<String, Option<Row>>> {
        let mut writes: BTreeMap<String, BTreeMap<String, Option<Row>>> = BTreeMap::new();
        for (table, rows) in &self.tables {
            let base_rows = base.tables.get(table);
            for (id, row) in rows {
                if base_rows.and_then(|b| b.get(id)) != Some(row) {
                    writes
                        .entry(table.clone())
                        .or_default()
                        .insert(id.clone(), Some(row.clone()));
                }
            }
            if let Some(base_rows) = base_rows {
                for id in base_rows.keys() {
                    if !rows.contains_key(id) {
                        writes.entry(table.clone()).or_default().insert(id.clone(), None);
                    }
                }
            }
        }
        writes
    }

    fn apply(&mut self, writes: &BTreeMap<String, BTreeMap<String, Option<Row>>>) {
        for (table, rows) in writes {
            let target = self.tables.entry(table.clone()).or_default();
            for (id, row) in rows {
                match row {
                    Some(row) => {
                        target.insert(id.clone(), row.clone());
                    }
                    None => {
                        target.remove(id);
                    }
                }
            }
        }
    }
}

fn relation_missing(table: &str) -> EngineError {
    EngineError::new(format!("relation \"{}\" does not exist", table)).with_code("42P01")
}

fn aborted() -> EngineError {
    EngineError::new("current transaction is aborted, commands ignored until end of transaction block")
        .with_code("25P02")
}

type Handler = Arc<dyn Fn(&mut MemoryTables) -> Result<QueryResult, EngineError> + Send + Sync>;

#[derive(Default)]
struct EngineState {
    committed: MemoryTables,
    handlers: HashMap<String, Handler>,
    failing_connects: usize,
    fail_close: bool,
    fail_rollback: bool,
    opened: usize,
    closed: usize,
    statements: Vec<String>,
}

/// Shared in-memory database; clones share state
#[derive(Clone, Default)]
pub struct MemoryEngine {
    state: Arc<Mutex<EngineState>>,
}

fn normalize(sql: &str) -> String {
    let trimmed = sql.trim();
    trimmed
        .strip_suffix(';')
        .unwrap_or(trimmed)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table (if needed) and add committed rows to it
    pub fn seed(&self, table: &str, rows: Vec<serde_json::Value>) {
        let mut state = self.state.lock();
        state.committed.create(table);
        for row in rows {
            let row = row.as_object().cloned().expect("seed rows are JSON objects");
            state
                .committed
                .insert(table, row)
                .expect("seed rows have unique ids");
        }
    }

    /// Script the effect of a statement
    pub fn on<F>(&self, sql: &str, handler: F)
    where
        F: Fn(&mut MemoryTables) -> Result<QueryResult, EngineError> + Send + Sync + 'static,
    {
        self.state
            .lock()
            .handlers
            .insert(normalize(sql).to_uppercase(), Arc::new(handler));
    }

    pub fn committed(&self) -> MemoryTables {
        self.state.lock().committed.clone()
    }

    pub fn committed_row(&self, table: &str, id: &str) -> Option<Row> {
        self.state.lock().committed.row(table, id).cloned()
    }

    pub fn fail_next_connects(&self, count: usize) {
        self.state.lock().failing_connects = count;
    }

    pub fn fail_closes(&self, fail: bool) {
        self.state.lock().fail_close = fail;
    }

    /// Make ROLLBACK fail as if the connection had dropped
    pub fn fail_rollbacks(&self, fail: bool) {
        self.state.lock().fail_rollback = fail;
    }

    pub fn opened_connections(&self) -> usize {
        self.state.lock().opened
    }

    pub fn closed_connections(&self) -> usize {
        self.state.lock().closed
    }

    /// Every statement received, in order
    pub fn statements(&self) -> Vec<String> {
        self.state.lock().statements.clone()
    }
}

#[async_trait]
impl Connector for MemoryEngine {
    async fn connect(&self) -> Result<Box<dyn Connection>, EngineError> {
        let mut state = self.state.lock();
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(EngineError::new("connection refused").with_code("08001"));
        }
        state.opened += 1;
        Ok(Box::new(MemoryConnection {
            engine: self.clone(),
            txn: Mutex::new(None),
        }))
    }
}

struct MemoryTxn {
    /// Snapshot taken at BEGIN for snapshot isolation levels
    snapshot: Option<MemoryTables>,
    writes: BTreeMap<String, BTreeMap<String, Option<Row>>>,
    aborted: bool,
}

pub struct MemoryConnection {
    engine: MemoryEngine,
    txn: Mutex<Option<MemoryTxn>>,
}

impl MemoryConnection {
    fn visible(&self, committed: &MemoryTables, txn: Option<&MemoryTxn>) -> MemoryTables {
        match txn {
            Some(txn) => {
                let mut view = txn.snapshot.clone().unwrap_or_else(|| committed.clone());
                view.apply(&txn.writes);
                view
            }
            None => committed.clone(),
        }
    }

    fn run(&self, statement: &str) -> Result<QueryResult, EngineError> {
        let normalized = normalize(statement);
        let upper = normalized.to_uppercase();
        let mut state = self.engine.state.lock();
        state.statements.push(normalized.clone());
        let mut txn = self.txn.lock();

        if let Some(level) = upper.strip_prefix("BEGIN ISOLATION LEVEL ") {
            let level: IsolationLevel = level.parse().map_err(EngineError::new)?;
            if txn.is_none() {
                *txn = Some(MemoryTxn {
                    snapshot: level
                        .uses_transaction_snapshot()
                        .then(|| state.committed.clone()),
                    writes: BTreeMap::new(),
                    aborted: false,
                });
            }
            return Ok(QueryResult::new());
        }
        if upper == "BEGIN" {
            if txn.is_none() {
                *txn = Some(MemoryTxn {
                    snapshot: None,
                    writes: BTreeMap::new(),
                    aborted: false,
                });
            }
            return Ok(QueryResult::new());
        }
        if upper == "COMMIT" {
            if let Some(finished) = txn.take() {
                if !finished.aborted {
                    state.committed.apply(&finished.writes);
                }
            }
            return Ok(QueryResult::new());
        }
        if upper == "ROLLBACK" {
            if state.fail_rollback {
                return Err(EngineError::new("terminating connection due to administrator command")
                    .with_code("57P01"));
            }
            *txn = None;
            return Ok(QueryResult::new());
        }

        if txn.as_ref().is_some_and(|t| t.aborted) {
            return Err(aborted());
        }

        let outcome = if let Some(table) = upper.strip_prefix("SELECT * FROM ") {
            let table = table.to_lowercase();
            let view = self.visible(&state.committed, txn.as_ref());
            if view.has_table(&table) {
                let rows = view.rows(&table);
                let columns = rows
                    .first()
                    .map(|r| r.keys().map(|k| ColumnInfo { name: k.clone() }).collect())
                    .unwrap_or_default();
                Ok(QueryResult {
                    row_count: rows.len() as u64,
                    rows,
                    columns,
                    duration_ms: 0,
                })
            } else {
                Err(relation_missing(&table))
            }
        } else if let Some(handler) = state.handlers.get(&upper).cloned() {
            let base = self.visible(&state.committed, txn.as_ref());
            let mut working = base.clone();
            handler(&mut working).map(|result| {
                let writes = working.writes_against(&base);
                match txn.as_mut() {
                    Some(t) => {
                        for (table, rows) in writes {
                            t.writes.entry(table).or_default().extend(rows);
                        }
                    }
                    None => state.committed.apply(&writes),
                }
                result
            })
        } else {
            let near = normalized.split_whitespace().next().unwrap_or("");
            Err(EngineError::new(format!("syntax error at or near \"{}\"", near)).with_code("42601"))
        };

        if outcome.is_err() {
            if let Some(t) = txn.as_mut() {
                t.aborted = true;
            }
        }
        outcome
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn execute(&self, sql: &str) -> Result<QueryResult, EngineError> {
        self.run(sql)
    }

    async fn batch_execute(&self, sql: &str) -> Result<(), EngineError> {
        for statement in sql.split(';').filter(|s| !s.trim().is_empty()) {
            self.run(statement)?;
        }
        Ok(())
    }

    async fn read_table(&self, table: &TrackedTable) -> Result<Vec<Row>, EngineError> {
        let state = self.engine.state.lock();
        let mut txn = self.txn.lock();
        if txn.as_ref().is_some_and(|t| t.aborted) {
            return Err(aborted());
        }
        let view = self.visible(&state.committed, txn.as_ref());
        if !view.has_table(&table.name) {
            if let Some(t) = txn.as_mut() {
                t.aborted = true;
            }
            return Err(relation_missing(&table.name));
        }
        Ok(view.rows(&table.name))
    }

    async fn close(self: Box<Self>) -> Result<(), EngineError> {
        let mut state = self.engine.state.lock();
        if state.fail_close {
            return Err(EngineError::new("connection reset by peer"));
        }
        state.closed += 1;
        Ok(())
    }
}
