// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Snapshot differencing
//!
//! Detects the rows a statement wrote by reading every tracked table in full
//! before and after it runs, through the session's own connection, and
//! comparing the two reads by row identity. No triggers or engine hooks are
//! involved; the cost is two full-table reads per statement, which only suits
//! small datasets. A trigger- or log-based change capture would replace
//! [`SnapshotDiffer::capture`] and [`SnapshotDiffer::diff`] as a pair.

use crate::config::TrackedTable;
use crate::engine::{row_id, Connection, EngineError, Row};
use crate::session::ModifiedRows;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Full contents of every tracked table as seen by one connection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableSnapshot {
    tables: BTreeMap<String, Vec<Row>>,
}

impl TableSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, table: impl Into<String>, rows: Vec<Row>) {
        self.tables.insert(table.into(), rows);
    }

    pub fn rows(&self, table: &str) -> Option<&[Row]> {
        self.tables.get(table).map(Vec::as_slice)
    }

    pub fn into_tables(self) -> BTreeMap<String, Vec<Row>> {
        self.tables
    }
}

/// Captures table snapshots and derives modified row identities
#[derive(Debug, Clone)]
pub struct SnapshotDiffer {
    tables: Vec<TrackedTable>,
}

impl SnapshotDiffer {
    pub fn new(tables: Vec<TrackedTable>) -> Self {
        Self { tables }
    }

    /// Read every tracked table through `connection`
    pub async fn capture(&self, connection: &dyn Connection) -> Result<TableSnapshot, EngineError> {
        let mut snapshot = TableSnapshot::new();
        for table in &self.tables {
            let rows = connection.read_table(table).await?;
            snapshot.insert(table.name.clone(), rows);
        }
        Ok(snapshot)
    }

    /// Rows inserted, deleted or updated between two snapshots
    pub fn diff(&self, before: &TableSnapshot, after: &TableSnapshot) -> ModifiedRows {
        let mut modified = ModifiedRows::new();
        for table in &self.tables {
            let before_rows = before.rows(&table.name).unwrap_or(&[]);
            let after_rows = after.rows(&table.name).unwrap_or(&[]);
            for id in diff_rows(before_rows, after_rows, &table.key_column) {
                modified.insert(&table.name, id);
            }
        }

        if !modified.is_empty() {
            log::debug!("Snapshot diff found {} modified rows", modified.len());
        }
        modified
    }
}

fn index_by_id<'a>(rows: &'a [Row], key_column: &str) -> HashMap<String, &'a Row> {
    let mut index = HashMap::with_capacity(rows.len());
    for row in rows {
        match row_id(row, key_column) {
            Some(id) => {
                index.insert(id, row);
            }
            None => log::debug!("Skipping row without a '{}' value", key_column),
        }
    }
    index
}

/// Identities of rows that differ between two reads of one table
///
/// Present only before: deleted. Present only after: inserted. Present in
/// both with any column value different: updated.
pub fn diff_rows(before: &[Row], after: &[Row], key_column: &str) -> BTreeSet<String> {
    let before_index = index_by_id(before, key_column);
    let after_index = index_by_id(after, key_column);

    let mut changed = BTreeSet::new();
    for (id, row) in &before_index {
        match after_index.get(id) {
            None => {
                changed.insert(id.clone());
            }
            Some(after_row) if *after_row != *row => {
                changed.insert(id.clone());
            }
            Some(_) => {}
        }
    }
    for id in after_index.keys() {
        if !before_index.contains_key(id) {
            changed.insert(id.clone());
        }
    }
    changed
}
