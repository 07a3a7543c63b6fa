// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Session manager
//!
//! Runs statements against a session's dedicated connection and keeps its
//! transaction state machine:
//!
//! ```text
//!   IDLE --BEGIN--> IN_TRANSACTION --COMMIT/ROLLBACK--> IDLE
//!                   IN_TRANSACTION --engine error--> implicit ROLLBACK --> IDLE
//! ```
//!
//! Ordinary statements while IDLE autocommit. Inside a transaction each
//! ordinary statement is bracketed by table snapshots so the rows it wrote
//! accumulate in the session's `modified_row_ids`.

use super::models::{OperationResponse, Session, SessionDescriptor};
use super::registry::{SessionRegistry, SessionSlot};
use crate::committed::CommittedReader;
use crate::config::ManagerConfig;
use crate::engine::{Connection, Connector, EngineError, QueryResult, Row};
use crate::error::SessionError;
use crate::snapshot::{build_view, SnapshotDiffer, UncommittedSnapshot};
use crate::txn::{classify, IsolationLevel, TransactionCommand};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OwnedMutexGuard;

type Step<T> = Result<(T, Option<UncommittedSnapshot>), SessionError>;

/// A claimed session, or the response for a session that is busy
type Claim<T> = Result<(Arc<SessionSlot>, OwnedMutexGuard<Session>), OperationResponse<T>>;

/// Entry point for every session operation
pub struct SessionManager {
    registry: SessionRegistry,
    differ: SnapshotDiffer,
    committed: CommittedReader,
    config: ManagerConfig,
}

impl SessionManager {
    /// Connect the committed reader and prepare an empty registry
    pub async fn connect(
        connector: Arc<dyn Connector>,
        config: ManagerConfig,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let committed =
            CommittedReader::connect(connector.as_ref(), config.tracked_tables.clone()).await?;
        Ok(Self {
            registry: SessionRegistry::new(connector, config.default_isolation),
            differ: SnapshotDiffer::new(config.tracked_tables.clone()),
            committed,
            config,
        })
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn committed_reader(&self) -> &CommittedReader {
        &self.committed
    }

    // === Session lifecycle ===

    /// Open a session with its own connection
    pub async fn open(
        &self,
        terminal_identity: &str,
        isolation_level: Option<IsolationLevel>,
    ) -> Result<SessionDescriptor, SessionError> {
        self.registry.open(terminal_identity, isolation_level).await
    }

    /// Close a session, rolling back any open transaction; idempotent
    ///
    /// Waits for an operation already running on the session to finish.
    pub async fn close(&self, session_id: &str) -> Result<(), SessionError> {
        self.registry.close(session_id).await
    }

    /// Close a session unless an operation is running on it
    ///
    /// Fails with `SessionBusy` instead of waiting; the session stays open.
    pub async fn try_close(&self, session_id: &str) -> Result<(), SessionError> {
        self.registry.try_close(session_id).await
    }

    /// Close every session concurrently; returns how many closes failed
    pub async fn close_all(&self) -> usize {
        let failures = self.registry.close_all().await;
        if failures > 0 {
            log::warn!("{} sessions failed to close cleanly", failures);
        }
        failures
    }

    /// Close all sessions and the committed reader
    pub async fn shutdown(self) -> Result<(), SessionError> {
        log::info!("SessionManager shutting down...");
        self.close_all().await;
        self.committed.close().await?;
        log::info!("SessionManager shutdown completed");
        Ok(())
    }

    /// Last known descriptor of a session
    pub fn describe(&self, session_id: &str) -> Result<SessionDescriptor, SessionError> {
        Ok(self.registry.get(session_id)?.descriptor())
    }

    pub fn list_sessions(&self) -> Vec<SessionDescriptor> {
        self.registry.descriptors()
    }

    // === Statements and transaction control ===

    /// Execute SQL text on a session
    ///
    /// BEGIN, COMMIT and ROLLBACK drive the state machine; anything else runs
    /// as an ordinary statement. The outer error is reserved for unknown
    /// sessions; a busy session answers with its last published descriptor.
    pub async fn execute(
        &self,
        session_id: &str,
        sql: &str,
    ) -> Result<OperationResponse<QueryResult>, SessionError> {
        let command = classify(sql);
        let (slot, mut session) = match self.claim(session_id)? {
            Ok(claimed) => claimed,
            Err(busy) => return Ok(busy),
        };
        log::debug!(
            "Session {} ({}) executing {} statement",
            session_id,
            session.terminal_identity(),
            command
        );

        let step = match command {
            TransactionCommand::Begin => self.begin(&mut session).await,
            TransactionCommand::Commit | TransactionCommand::Rollback => {
                self.finish(&mut session, command).await
            }
            TransactionCommand::Ordinary => self.run_ordinary(&mut session, sql).await,
        };

        Ok(respond(&slot, &session, step))
    }

    pub async fn commit(
        &self,
        session_id: &str,
    ) -> Result<OperationResponse<QueryResult>, SessionError> {
        self.execute(session_id, "COMMIT").await
    }

    pub async fn rollback(
        &self,
        session_id: &str,
    ) -> Result<OperationResponse<QueryResult>, SessionError> {
        self.execute(session_id, "ROLLBACK").await
    }

    /// Change the isolation level used by the session's next BEGIN
    pub fn set_isolation_level(
        &self,
        session_id: &str,
        level: IsolationLevel,
    ) -> Result<OperationResponse<()>, SessionError> {
        let (slot, mut session) = match self.claim(session_id)? {
            Ok(claimed) => claimed,
            Err(busy) => return Ok(busy),
        };
        let step = session.set_isolation_level(level).map(|()| ((), None));
        if step.is_ok() {
            log::info!("Session {} isolation level set to {}", session_id, level);
        }
        Ok(respond(&slot, &session, step))
    }

    /// The session's current uncommitted view, or None while IDLE
    ///
    /// Fails with `SessionBusy` while an operation is running on the session.
    pub async fn uncommitted_view(
        &self,
        session_id: &str,
    ) -> Result<Option<UncommittedSnapshot>, SessionError> {
        let (slot, mut session) = self.claim::<()>(session_id)?.map_err(|busy| {
            busy.outcome
                .err()
                .unwrap_or_else(|| SessionError::SessionBusy(session_id.to_string()))
        })?;
        match build_view(&session, &self.differ).await {
            Ok(view) => Ok(view),
            Err(e) => {
                let err = self.implicit_rollback(&mut session, e).await;
                slot.publish(session.descriptor());
                Err(err)
            }
        }
    }

    // === Committed data ===

    pub async fn read_committed_table(&self, table: &str) -> Result<Vec<Row>, SessionError> {
        self.committed.read_table(table).await
    }

    pub async fn apply_setup_script(&self, sql: &str) -> Result<(), SessionError> {
        self.committed.apply_setup_script(sql).await
    }

    // === State machine ===

    fn claim<T>(&self, session_id: &str) -> Result<Claim<T>, SessionError> {
        let slot = self.registry.get(session_id)?;
        let session = match slot.try_acquire() {
            Ok(session) => session,
            Err(busy) => {
                log::debug!("Session {} is busy", session_id);
                return Ok(Err(OperationResponse {
                    outcome: Err(busy),
                    session: slot.descriptor(),
                    snapshot: None,
                }));
            }
        };
        if session.is_closed() {
            return Err(SessionError::SessionNotFound(session_id.to_string()));
        }
        Ok(Ok((slot, session)))
    }

    async fn begin(&self, session: &mut Session) -> Step<QueryResult> {
        if session.in_transaction() {
            return Err(SessionError::TransactionAlreadyOpen);
        }

        let started = Instant::now();
        let connection = live(session)?;
        connection
            .batch_execute(&session.isolation_level().begin_statement())
            .await?;
        session.enter_transaction();
        log::info!(
            "Session {} began transaction at {}",
            session.session_id(),
            session.isolation_level()
        );

        let result = QueryResult {
            duration_ms: started.elapsed().as_millis() as u64,
            ..QueryResult::new()
        };
        let connection = live(session)?;
        match self.differ.capture(connection).await {
            Ok(tables) => Ok((result, UncommittedSnapshot::assemble(session, tables))),
            Err(e) => Err(self.implicit_rollback(session, e).await),
        }
    }

    async fn finish(&self, session: &mut Session, command: TransactionCommand) -> Step<QueryResult> {
        if !session.in_transaction() {
            return Err(SessionError::NoActiveTransaction);
        }

        let started = Instant::now();
        let connection = live(session)?;
        match connection.batch_execute(command.as_str()).await {
            Ok(()) => {
                session.leave_transaction();
                log::info!("Session {} {}", session.session_id(), command);
                let result = QueryResult {
                    duration_ms: started.elapsed().as_millis() as u64,
                    ..QueryResult::new()
                };
                Ok((result, None))
            }
            Err(e) => Err(self.implicit_rollback(session, e).await),
        }
    }

    async fn run_ordinary(&self, session: &mut Session, sql: &str) -> Step<QueryResult> {
        let connection = live(session)?;
        if !session.in_transaction() {
            let result = connection.execute(sql).await?;
            return Ok((result, None));
        }

        let before = match self.differ.capture(connection).await {
            Ok(snapshot) => snapshot,
            Err(e) => return Err(self.implicit_rollback(session, e).await),
        };
        let result = match connection.execute(sql).await {
            Ok(result) => result,
            Err(e) => return Err(self.implicit_rollback(session, e).await),
        };
        let after = match self.differ.capture(connection).await {
            Ok(snapshot) => snapshot,
            Err(e) => return Err(self.implicit_rollback(session, e).await),
        };

        let changes = self.differ.diff(&before, &after);
        if !changes.is_empty() {
            log::debug!(
                "Session {} modified {} rows",
                session.session_id(),
                changes.len()
            );
        }
        session.record_changes(changes);
        Ok((result, UncommittedSnapshot::assemble(session, after)))
    }

    /// Recover from an engine error inside a transaction
    ///
    /// The transaction is rolled back and the session returns to IDLE. The
    /// engine error is handed back for the caller, unless the ROLLBACK itself
    /// fails: the connection is then unusable and that is what gets reported.
    async fn implicit_rollback(&self, session: &mut Session, error: EngineError) -> SessionError {
        log::warn!(
            "Session {} hit an engine error inside a transaction, rolling back: {}",
            session.session_id(),
            error
        );
        let mut failure = None;
        if let Some(connection) = session.connection() {
            if let Err(e) = connection.batch_execute("ROLLBACK").await {
                log::error!(
                    "Implicit rollback of session {} failed: {}",
                    session.session_id(),
                    e
                );
                failure = Some(SessionError::ConnectionFailure(format!(
                    "rollback after \"{}\" failed: {}",
                    error.message, e.message
                )));
            }
        }
        session.leave_transaction();
        failure.unwrap_or(SessionError::Engine(error))
    }
}

fn live(session: &Session) -> Result<&dyn Connection, SessionError> {
    session
        .connection()
        .ok_or_else(|| SessionError::SessionNotFound(session.session_id().to_string()))
}

/// Publish the session's new state and package the outcome
fn respond<T>(slot: &SessionSlot, session: &Session, step: Step<T>) -> OperationResponse<T> {
    let descriptor = session.descriptor();
    slot.publish(descriptor.clone());

    let (outcome, snapshot) = match step {
        Ok((value, snapshot)) => (Ok(value), snapshot),
        Err(e) => (Err(e), None),
    };
    OperationResponse {
        outcome,
        session: descriptor,
        snapshot,
    }
}
