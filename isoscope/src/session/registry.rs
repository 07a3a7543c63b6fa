// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Session registry
//!
//! Sessions are looked up by opaque id. Each entry owns its session, and the
//! session owns its connection; nothing else holds a reference to either.
//!
//! Operations on one session are not queued. A caller must await one
//! operation before issuing the next on the same session; an operation that
//! finds its session busy fails with [`SessionError::SessionBusy`]. Serializing
//! at this level would hide the engine's own lock waits between sessions.

use super::models::{Session, SessionDescriptor, SessionId};
use crate::engine::Connector;
use crate::error::SessionError;
use crate::txn::IsolationLevel;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinSet;

/// Registry entry: the session plus its last published descriptor
pub struct SessionSlot {
    /// Registration order
    sequence: u64,
    session: Arc<Mutex<Session>>,
    descriptor: RwLock<SessionDescriptor>,
}

impl SessionSlot {
    fn new(sequence: u64, session: Session) -> Self {
        let descriptor = RwLock::new(session.descriptor());
        Self {
            sequence,
            session: Arc::new(Mutex::new(session)),
            descriptor,
        }
    }

    /// Claim the session for one operation, failing if another is in flight
    pub fn try_acquire(&self) -> Result<OwnedMutexGuard<Session>, SessionError> {
        self.session
            .clone()
            .try_lock_owned()
            .map_err(|_| SessionError::SessionBusy(self.descriptor.read().session_id.clone()))
    }

    /// Wait for any in-flight operation, then claim the session
    pub async fn acquire(&self) -> OwnedMutexGuard<Session> {
        self.session.clone().lock_owned().await
    }

    /// Descriptor as of the last completed operation
    pub fn descriptor(&self) -> SessionDescriptor {
        self.descriptor.read().clone()
    }

    pub fn publish(&self, descriptor: SessionDescriptor) {
        *self.descriptor.write() = descriptor;
    }
}

/// Keyed store of live sessions
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<SessionSlot>>>,
    next_sequence: AtomicU64,
    connector: Arc<dyn Connector>,
    default_isolation: IsolationLevel,
}

impl SessionRegistry {
    pub fn new(connector: Arc<dyn Connector>, default_isolation: IsolationLevel) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            next_sequence: AtomicU64::new(0),
            connector,
            default_isolation,
        }
    }

    /// Connect a new session and register it
    pub async fn open(
        &self,
        terminal_identity: &str,
        isolation_level: Option<IsolationLevel>,
    ) -> Result<SessionDescriptor, SessionError> {
        let level = isolation_level.unwrap_or(self.default_isolation);
        let connection = self.connector.connect().await.map_err(|e| {
            log::error!(
                "Failed to connect session for terminal '{}': {}",
                terminal_identity,
                e
            );
            SessionError::ConnectionFailure(e.message)
        })?;

        let session = Session::new(terminal_identity, level, connection);
        let descriptor = session.descriptor();
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        self.sessions.write().insert(
            descriptor.session_id.clone(),
            Arc::new(SessionSlot::new(sequence, session)),
        );

        log::info!(
            "Opened session {} for terminal '{}' at {}",
            descriptor.session_id,
            terminal_identity,
            level
        );
        Ok(descriptor)
    }

    /// Look up a session
    pub fn get(&self, session_id: &str) -> Result<Arc<SessionSlot>, SessionError> {
        self.sessions
            .read()
            .get(session_id)
            .cloned()
            .ok_or_else(|| SessionError::SessionNotFound(session_id.to_string()))
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.read().contains_key(session_id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Last published descriptors, oldest session first
    pub fn descriptors(&self) -> Vec<SessionDescriptor> {
        let mut slots: Vec<Arc<SessionSlot>> = self.sessions.read().values().cloned().collect();
        slots.sort_by_key(|slot| slot.sequence);
        slots.iter().map(|slot| slot.descriptor()).collect()
    }

    /// Remove and tear down a session; unknown ids are a no-op
    pub async fn close(&self, session_id: &str) -> Result<(), SessionError> {
        let slot = self.sessions.write().remove(session_id);
        match slot {
            Some(slot) => {
                let mut session = slot.acquire().await;
                let result = teardown(&mut session).await;
                slot.publish(session.descriptor());
                result
            }
            None => {
                log::debug!("Close of unknown or closed session {} ignored", session_id);
                Ok(())
            }
        }
    }

    /// Remove and tear down a session only if no operation is running on it
    pub async fn try_close(&self, session_id: &str) -> Result<(), SessionError> {
        let Ok(slot) = self.get(session_id) else {
            log::debug!("Close of unknown or closed session {} ignored", session_id);
            return Ok(());
        };
        let mut session = slot.try_acquire()?;
        if self.sessions.write().remove(session_id).is_none() {
            // A concurrent close got there first and tears it down
            return Ok(());
        }
        let result = teardown(&mut session).await;
        slot.publish(session.descriptor());
        result
    }

    /// Tear down every session concurrently; returns how many failed
    pub async fn close_all(&self) -> usize {
        let slots: Vec<Arc<SessionSlot>> = self
            .sessions
            .write()
            .drain()
            .map(|(_, slot)| slot)
            .collect();

        let mut tasks = JoinSet::new();
        for slot in slots {
            tasks.spawn(async move {
                let mut session = slot.acquire().await;
                teardown(&mut session).await
            });
        }

        let mut failures = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    log::warn!("Session close failed during shutdown: {}", e);
                    failures += 1;
                }
                Err(e) => {
                    log::warn!("Session close task did not complete: {}", e);
                    failures += 1;
                }
            }
        }
        failures
    }
}

/// Roll back an open transaction, then release the connection
///
/// The rollback is attempted first so that no partial write of a forcibly
/// closed session can become visible. A rollback failure does not prevent the
/// connection from being released.
async fn teardown(session: &mut Session) -> Result<(), SessionError> {
    let Some(connection) = session.take_connection() else {
        return Ok(());
    };
    let session_id = session.session_id().to_string();

    let mut failure = None;
    if session.in_transaction() {
        if let Err(e) = connection.batch_execute("ROLLBACK").await {
            log::warn!(
                "Rollback before closing session {} failed: {}",
                session_id,
                e
            );
            failure = Some(SessionError::ConnectionFailure(e.message));
        }
        session.leave_transaction();
    }

    if let Err(e) = connection.close().await {
        log::warn!("Failed to close connection of session {}: {}", session_id, e);
        failure = Some(SessionError::ConnectionFailure(e.message));
    }

    log::info!("Closed session {}", session_id);
    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
