// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! PostgreSQL engine backend
//!
//! Every connection is a dedicated `tokio-postgres` client with its own
//! background connection task. Ordinary statements go through the simple-query
//! protocol so any statement kind is accepted and values come back as text.
//! Tracked tables are read with `row_to_json` so each column keeps its JSON type.

use super::{ColumnInfo, Connection, Connector, EngineError, QueryResult, Row};
use crate::config::TrackedTable;
use crate::error::SessionError;
use async_trait::async_trait;
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio_postgres::{Client, Config, NoTls, SimpleQueryMessage};

/// Connector that opens a fresh PostgreSQL connection per call
#[derive(Clone)]
pub struct PostgresConnector {
    config: Config,
}

impl PostgresConnector {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Build a connector from a `postgres://` URL or key=value connection string
    pub fn from_url(url: &str) -> Result<Self, SessionError> {
        let config = url
            .parse::<Config>()
            .map_err(|e| SessionError::Config(format!("Invalid connection string: {}", e)))?;
        Ok(Self::new(config))
    }
}

#[async_trait]
impl Connector for PostgresConnector {
    async fn connect(&self) -> Result<Box<dyn Connection>, EngineError> {
        let (client, connection) = self.config.connect(NoTls).await.map_err(engine_error)?;

        let task = tokio::spawn(async move {
            if let Err(e) = connection.await {
                log::error!("PostgreSQL connection task failed: {}", e);
            }
        });

        Ok(Box::new(PostgresConnection { client, task }))
    }
}

/// One dedicated PostgreSQL client
pub struct PostgresConnection {
    client: Client,
    task: JoinHandle<()>,
}

#[async_trait]
impl Connection for PostgresConnection {
    async fn execute(&self, sql: &str) -> Result<QueryResult, EngineError> {
        let started = Instant::now();
        let messages = self.client.simple_query(sql).await.map_err(engine_error)?;

        let mut result = QueryResult::new();
        for message in messages {
            match message {
                SimpleQueryMessage::RowDescription(columns) => {
                    result.columns = columns
                        .iter()
                        .map(|c| ColumnInfo {
                            name: c.name().to_string(),
                        })
                        .collect();
                }
                SimpleQueryMessage::Row(row) => {
                    if result.columns.is_empty() {
                        result.columns = row
                            .columns()
                            .iter()
                            .map(|c| ColumnInfo {
                                name: c.name().to_string(),
                            })
                            .collect();
                    }
                    let mut values = Row::new();
                    for (idx, column) in row.columns().iter().enumerate() {
                        let value = match row.get(idx) {
                            Some(text) => serde_json::Value::String(text.to_string()),
                            None => serde_json::Value::Null,
                        };
                        values.insert(column.name().to_string(), value);
                    }
                    result.rows.push(values);
                }
                SimpleQueryMessage::CommandComplete(count) => {
                    result.row_count = count;
                }
                _ => {}
            }
        }

        result.duration_ms = started.elapsed().as_millis() as u64;
        Ok(result)
    }

    async fn batch_execute(&self, sql: &str) -> Result<(), EngineError> {
        self.client.batch_execute(sql).await.map_err(engine_error)
    }

    async fn read_table(&self, table: &TrackedTable) -> Result<Vec<Row>, EngineError> {
        let sql = format!(
            "SELECT row_to_json(t)::text FROM {} t ORDER BY t.{}",
            quote_qualified(&table.name),
            quote_ident(&table.key_column)
        );

        let messages = self.client.simple_query(&sql).await.map_err(engine_error)?;
        let mut rows = Vec::new();
        for message in messages {
            if let SimpleQueryMessage::Row(row) = message {
                let text = row.get(0).unwrap_or("null");
                match serde_json::from_str::<serde_json::Value>(text) {
                    Ok(serde_json::Value::Object(map)) => rows.push(map),
                    Ok(other) => {
                        return Err(EngineError::new(format!(
                            "Expected a JSON object for a row of {}, got {}",
                            table.name, other
                        )))
                    }
                    Err(e) => {
                        return Err(EngineError::new(format!(
                            "Malformed row JSON from {}: {}",
                            table.name, e
                        )))
                    }
                }
            }
        }
        Ok(rows)
    }

    async fn close(self: Box<Self>) -> Result<(), EngineError> {
        let PostgresConnection { client, task } = *self;
        drop(client);
        task.await
            .map_err(|e| EngineError::new(format!("Connection task did not shut down: {}", e)))
    }
}

/// Carry the server's message, SQLSTATE and detail through unchanged
fn engine_error(error: tokio_postgres::Error) -> EngineError {
    match error.as_db_error() {
        Some(db) => EngineError {
            message: db.message().to_string(),
            code: Some(db.code().code().to_string()),
            detail: db.detail().map(str::to_string),
        },
        None => EngineError::new(error.to_string()),
    }
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote `schema.table` part by part
fn quote_qualified(name: &str) -> String {
    name.split('.').map(quote_ident).collect::<Vec<_>>().join(".")
}
