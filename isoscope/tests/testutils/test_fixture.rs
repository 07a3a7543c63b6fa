//! Test fixture for session manager integration tests
//!
//! Provides a manager wired to a fresh in-memory engine seeded with a small
//! `accounts` table, plus the statements the scenarios use.

use super::memory_engine::MemoryEngine;
use isoscope::{
    IsolationLevel, ManagerConfig, OperationResponse, QueryResult, SessionDescriptor,
    SessionManager,
};
use serde_json::json;
use std::sync::Arc;

pub const DEPOSIT_100: &str = "UPDATE accounts SET balance = balance + 100 WHERE id = 1";
pub const SET_BALANCE_1500: &str = "UPDATE accounts SET balance = 1500 WHERE id = 1";
pub const READ_ACCOUNT_1: &str = "SELECT balance FROM accounts WHERE id = 1";
pub const INSERT_ACCOUNT_3: &str = "INSERT INTO accounts (id, owner, balance) VALUES (3, 'carol', 50)";
pub const INSERT_DUPLICATE_1: &str =
    "INSERT INTO accounts (id, owner, balance) VALUES (1, 'mallory', 0)";
pub const DELETE_ACCOUNT_2: &str = "DELETE FROM accounts WHERE id = 2";

/// Manager over an isolated in-memory engine
pub struct TestFixture {
    pub engine: MemoryEngine,
    pub manager: Arc<SessionManager>,
}

impl TestFixture {
    /// Accounts 1 (alice, 1000) and 2 (bob, 500), default configuration
    pub async fn new() -> Self {
        Self::with_config(ManagerConfig::default()).await
    }

    pub async fn with_config(config: ManagerConfig) -> Self {
        let engine = MemoryEngine::new();
        engine.seed(
            "accounts",
            vec![
                json!({"id": 1, "owner": "alice", "balance": 1000}),
                json!({"id": 2, "owner": "bob", "balance": 500}),
            ],
        );
        script_accounts(&engine);

        let manager = SessionManager::connect(Arc::new(engine.clone()), config)
            .await
            .expect("Failed to connect manager");

        Self {
            engine,
            manager: Arc::new(manager),
        }
    }

    pub async fn open(&self, terminal: &str, level: IsolationLevel) -> SessionDescriptor {
        self.manager
            .open(terminal, Some(level))
            .await
            .expect("Failed to open session")
    }

    /// Execute and require the lookup to succeed
    pub async fn exec(&self, session_id: &str, sql: &str) -> OperationResponse<QueryResult> {
        self.manager
            .execute(session_id, sql)
            .await
            .expect("Session lookup failed")
    }

    /// Execute and require the statement itself to succeed
    pub async fn exec_ok(&self, session_id: &str, sql: &str) -> OperationResponse<QueryResult> {
        let response = self.exec(session_id, sql).await;
        if let Err(e) = &response.outcome {
            panic!("'{}' failed: {}", sql, e);
        }
        response
    }

    /// Committed balance of an account
    pub async fn committed_balance(&self, id: &str) -> Option<i64> {
        self.manager
            .read_committed_table("accounts")
            .await
            .expect("Committed read failed")
            .into_iter()
            .find(|row| isoscope::engine::row_id(row, "id").as_deref() == Some(id))
            .and_then(|row| row.get("balance").and_then(|v| v.as_i64()))
    }
}

fn script_accounts(engine: &MemoryEngine) {
    engine.on(DEPOSIT_100, |t| {
        let affected = t.add("accounts", "1", "balance", 100)?;
        Ok(QueryResult::affected(affected))
    });
    engine.on(SET_BALANCE_1500, |t| {
        let Some(row) = t.row_mut("accounts", "1") else {
            return Ok(QueryResult::affected(0));
        };
        row.insert("balance".to_string(), json!(1500));
        Ok(QueryResult::affected(1))
    });
    engine.on(READ_ACCOUNT_1, |t| {
        let rows: Vec<_> = t
            .row("accounts", "1")
            .and_then(|row| row.get("balance").cloned())
            .map(|balance| {
                let mut projected = isoscope::Row::new();
                projected.insert("balance".to_string(), balance);
                projected
            })
            .into_iter()
            .collect();
        Ok(QueryResult {
            row_count: rows.len() as u64,
            rows,
            columns: vec![isoscope::ColumnInfo {
                name: "balance".to_string(),
            }],
            duration_ms: 0,
        })
    });
    engine.on(INSERT_ACCOUNT_3, |t| {
        t.insert(
            "accounts",
            json!({"id": 3, "owner": "carol", "balance": 50})
                .as_object()
                .cloned()
                .unwrap_or_default(),
        )?;
        Ok(QueryResult::affected(1))
    });
    engine.on(INSERT_DUPLICATE_1, |t| {
        t.insert(
            "accounts",
            json!({"id": 1, "owner": "mallory", "balance": 0})
                .as_object()
                .cloned()
                .unwrap_or_default(),
        )?;
        Ok(QueryResult::affected(1))
    });
    engine.on(DELETE_ACCOUNT_2, |t| {
        let affected = t.delete("accounts", "2").map_or(0, |_| 1);
        Ok(QueryResult::affected(affected))
    });
}
