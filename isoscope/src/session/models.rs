// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Session models
//!
//! A [`Session`] is one logical terminal: its exclusive engine connection plus
//! the transaction state the manager keeps for it.

use crate::engine::Connection;
use crate::error::SessionError;
use crate::snapshot::UncommittedSnapshot;
use crate::txn::IsolationLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Opaque session handle
pub type SessionId = String;

/// Row identities written by a session, per table
///
/// Only tables with at least one modified row have an entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModifiedRows(BTreeMap<String, BTreeSet<String>>);

impl ModifiedRows {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, table: &str, row_id: impl Into<String>) {
        self.0
            .entry(table.to_string())
            .or_default()
            .insert(row_id.into());
    }

    /// Add every row of `other`; the set never shrinks
    pub fn merge(&mut self, other: ModifiedRows) {
        for (table, ids) in other.0 {
            if ids.is_empty() {
                continue;
            }
            self.0.entry(table).or_default().extend(ids);
        }
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(|ids| ids.is_empty())
    }

    pub fn contains(&self, table: &str, row_id: &str) -> bool {
        self.0.get(table).is_some_and(|ids| ids.contains(row_id))
    }

    pub fn table(&self, table: &str) -> Option<&BTreeSet<String>> {
        self.0.get(table)
    }

    /// Total number of modified rows across tables
    pub fn len(&self) -> usize {
        self.0.values().map(BTreeSet::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.0.iter()
    }
}

/// Snapshot of a session's state, safe to hand to any observer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDescriptor {
    pub session_id: SessionId,
    pub terminal_identity: String,
    pub isolation_level: IsolationLevel,
    pub in_transaction: bool,
    pub created_at: DateTime<Utc>,
    pub modified_row_ids: ModifiedRows,
}

/// Outcome of an operation addressed to an existing session
///
/// The session's descriptor after the operation accompanies every outcome,
/// including failures. `snapshot` is only present while a transaction is open.
#[derive(Debug, Clone)]
pub struct OperationResponse<T> {
    pub outcome: Result<T, SessionError>,
    pub session: SessionDescriptor,
    pub snapshot: Option<UncommittedSnapshot>,
}

impl<T> OperationResponse<T> {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn error(&self) -> Option<&SessionError> {
        self.outcome.as_ref().err()
    }

    /// True when the session finished the operation outside a transaction,
    /// the point at which committed data may have changed
    pub fn ends_idle(&self) -> bool {
        !self.session.in_transaction
    }
}

/// One logical terminal and its dedicated connection
pub struct Session {
    session_id: SessionId,
    terminal_identity: String,
    isolation_level: IsolationLevel,
    in_transaction: bool,
    created_at: DateTime<Utc>,
    modified_row_ids: ModifiedRows,
    /// Taken exactly once, when the session closes
    connection: Option<Box<dyn Connection>>,
}

impl Session {
    pub fn new(
        terminal_identity: impl Into<String>,
        isolation_level: IsolationLevel,
        connection: Box<dyn Connection>,
    ) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            terminal_identity: terminal_identity.into(),
            isolation_level,
            in_transaction: false,
            created_at: Utc::now(),
            modified_row_ids: ModifiedRows::new(),
            connection: Some(connection),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn terminal_identity(&self) -> &str {
        &self.terminal_identity
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn modified_row_ids(&self) -> &ModifiedRows {
        &self.modified_row_ids
    }

    /// The live connection, or None once the session has been closed
    pub fn connection(&self) -> Option<&dyn Connection> {
        self.connection.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.connection.is_none()
    }

    pub fn descriptor(&self) -> SessionDescriptor {
        SessionDescriptor {
            session_id: self.session_id.clone(),
            terminal_identity: self.terminal_identity.clone(),
            isolation_level: self.isolation_level,
            in_transaction: self.in_transaction,
            created_at: self.created_at,
            modified_row_ids: self.modified_row_ids.clone(),
        }
    }

    /// Change the level used by the next BEGIN
    pub fn set_isolation_level(&mut self, level: IsolationLevel) -> Result<(), SessionError> {
        if self.in_transaction {
            return Err(SessionError::IsolationChangeDuringTransaction);
        }
        self.isolation_level = level;
        Ok(())
    }

    /// Record a successful BEGIN
    pub(crate) fn enter_transaction(&mut self) {
        self.in_transaction = true;
        self.modified_row_ids.clear();
    }

    /// Record a COMMIT, ROLLBACK or implicit rollback
    pub(crate) fn leave_transaction(&mut self) {
        self.in_transaction = false;
        self.modified_row_ids.clear();
    }

    pub(crate) fn record_changes(&mut self, changes: ModifiedRows) {
        if self.in_transaction {
            self.modified_row_ids.merge(changes);
        }
    }

    pub(crate) fn take_connection(&mut self) -> Option<Box<dyn Connection>> {
        self.connection.take()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.session_id)
            .field("terminal_identity", &self.terminal_identity)
            .field("isolation_level", &self.isolation_level)
            .field("in_transaction", &self.in_transaction)
            .field("modified_row_ids", &self.modified_row_ids)
            .field("closed", &self.is_closed())
            .finish()
    }
}
