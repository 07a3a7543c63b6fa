// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Uncommitted views
//!
//! The tables are read through the session's own connection, so they show
//! exactly what that session would see next, including its own uncommitted
//! writes. What a session sees and what it wrote are kept apart: a row can
//! differ from committed state purely because of isolation-level visibility,
//! and only rows in `modified_row_ids` belong to the session as pending changes.

use super::differ::{SnapshotDiffer, TableSnapshot};
use crate::engine::{EngineError, Row};
use crate::session::{ModifiedRows, Session};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A session's in-progress picture of the tracked tables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UncommittedSnapshot {
    pub terminal_identity: String,
    pub tables: BTreeMap<String, Vec<Row>>,
    pub modified_row_ids: ModifiedRows,
}

impl UncommittedSnapshot {
    /// Pair tables already read through the session's connection with its
    /// accumulated writes; None outside a transaction
    pub fn assemble(session: &Session, tables: TableSnapshot) -> Option<Self> {
        if !session.in_transaction() {
            return None;
        }
        Some(Self {
            terminal_identity: session.terminal_identity().to_string(),
            tables: tables.into_tables(),
            modified_row_ids: session.modified_row_ids().clone(),
        })
    }

    /// Rows of a table with a flag telling whether this session wrote them
    pub fn rows_with_ownership<'a>(
        &'a self,
        table: &'a str,
        key_column: &'a str,
    ) -> impl Iterator<Item = (&'a Row, bool)> + 'a {
        self.tables
            .get(table)
            .into_iter()
            .flatten()
            .map(move |row| {
                let owned = crate::engine::row_id(row, key_column)
                    .is_some_and(|id| self.modified_row_ids.contains(table, &id));
                (row, owned)
            })
    }
}

/// Read the session's current view; None when no transaction is open
pub async fn build_view(
    session: &Session,
    differ: &SnapshotDiffer,
) -> Result<Option<UncommittedSnapshot>, EngineError> {
    if !session.in_transaction() {
        return Ok(None);
    }
    let Some(connection) = session.connection() else {
        return Ok(None);
    };
    let tables = differ.capture(connection).await?;
    Ok(UncommittedSnapshot::assemble(session, tables))
}
