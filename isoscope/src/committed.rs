// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Committed reader
//!
//! A long-lived connection of its own that never opens a transaction, so
//! every read observes only durably committed data regardless of what any
//! session has in flight.

use crate::config::TrackedTable;
use crate::engine::{Connection, Connector, Row};
use crate::error::SessionError;
use std::collections::BTreeMap;

pub struct CommittedReader {
    connection: Box<dyn Connection>,
    tables: Vec<TrackedTable>,
}

impl CommittedReader {
    pub fn new(connection: Box<dyn Connection>, tables: Vec<TrackedTable>) -> Self {
        Self { connection, tables }
    }

    /// Open the reader's dedicated connection
    pub async fn connect(
        connector: &dyn Connector,
        tables: Vec<TrackedTable>,
    ) -> Result<Self, SessionError> {
        let connection = connector.connect().await.map_err(|e| {
            log::error!("Failed to connect committed reader: {}", e);
            SessionError::ConnectionFailure(e.message)
        })?;
        Ok(Self::new(connection, tables))
    }

    /// Committed rows of a tracked table; empty for a table that is not tracked
    pub async fn read_table(&self, name: &str) -> Result<Vec<Row>, SessionError> {
        let Some(table) = self.tables.iter().find(|t| t.name == name) else {
            log::debug!("Committed read of untracked table '{}'", name);
            return Ok(Vec::new());
        };
        Ok(self.connection.read_table(table).await?)
    }

    /// Committed rows of every tracked table
    pub async fn read_all(&self) -> Result<BTreeMap<String, Vec<Row>>, SessionError> {
        let mut tables = BTreeMap::new();
        for table in &self.tables {
            let rows = self.connection.read_table(table).await?;
            tables.insert(table.name.clone(), rows);
        }
        Ok(tables)
    }

    /// Run a schema or seed script
    pub async fn apply_setup_script(&self, sql: &str) -> Result<(), SessionError> {
        self.connection.batch_execute(sql).await?;
        log::info!("Applied setup script ({} bytes)", sql.len());
        Ok(())
    }

    pub async fn close(self) -> Result<(), SessionError> {
        self.connection
            .close()
            .await
            .map_err(|e| SessionError::ConnectionFailure(e.message))
    }
}
