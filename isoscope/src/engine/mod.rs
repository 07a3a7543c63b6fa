// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Engine abstraction
//!
//! Isolation semantics are delegated entirely to the relational engine behind
//! these traits. A [`Connector`] hands out dedicated connections; each
//! [`Connection`] is owned by exactly one session (or by the committed reader)
//! for its whole lifetime.

pub mod postgres;

use crate::config::TrackedTable;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One row, column name to JSON value
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Error reported by the engine, passed through verbatim
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct EngineError {
    pub message: String,
    /// SQLSTATE code, when available
    pub code: Option<String>,
    pub detail: Option<String>,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            detail: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Result column metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
}

/// Result of one statement
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryResult {
    pub rows: Vec<Row>,
    /// Rows returned or affected, as reported by the engine
    pub row_count: u64,
    pub columns: Vec<ColumnInfo>,
    pub duration_ms: u64,
}

impl QueryResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Result of a statement that returns no rows
    pub fn affected(row_count: u64) -> Self {
        Self {
            row_count,
            ..Self::default()
        }
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Stable identity of a row: its key column rendered as text
///
/// Strings are taken verbatim, every other JSON value in its canonical text
/// form, so an integer key `1` has identity `"1"`. Rows with a missing or null
/// key have no identity.
pub fn row_id(row: &Row, key_column: &str) -> Option<String> {
    match row.get(key_column)? {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// A dedicated engine connection
#[async_trait]
pub trait Connection: Send + Sync {
    /// Execute a single statement and return its rows
    async fn execute(&self, sql: &str) -> Result<QueryResult, EngineError>;

    /// Execute one or more statements, discarding any rows
    async fn batch_execute(&self, sql: &str) -> Result<(), EngineError>;

    /// Read every row of a table, ordered by its key column
    async fn read_table(&self, table: &TrackedTable) -> Result<Vec<Row>, EngineError>;

    /// Release the connection
    async fn close(self: Box<Self>) -> Result<(), EngineError>;
}

/// Source of dedicated connections
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Connection>, EngineError>;
}
