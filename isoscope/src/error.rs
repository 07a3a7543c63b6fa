// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Session and transaction error types

use crate::engine::EngineError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by session operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session {0} already has an operation in flight")]
    SessionBusy(String),

    #[error("A transaction is already open on this session")]
    TransactionAlreadyOpen,

    #[error("No active transaction on this session")]
    NoActiveTransaction,

    #[error("Isolation level cannot change while a transaction is open")]
    IsolationChangeDuringTransaction,

    #[error("{0}")]
    Engine(#[from] EngineError),

    #[error("Connection failure: {0}")]
    ConnectionFailure(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse error taxonomy used by consumers to decide how to react
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    SessionNotFound,
    SessionBusy,
    TransactionStateViolation,
    Engine,
    ConnectionFailure,
    Config,
}

impl SessionError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::SessionNotFound(_) => ErrorKind::SessionNotFound,
            SessionError::SessionBusy(_) => ErrorKind::SessionBusy,
            SessionError::TransactionAlreadyOpen
            | SessionError::NoActiveTransaction
            | SessionError::IsolationChangeDuringTransaction => {
                ErrorKind::TransactionStateViolation
            }
            SessionError::Engine(_) => ErrorKind::Engine,
            SessionError::ConnectionFailure(_) => ErrorKind::ConnectionFailure,
            SessionError::Config(_) => ErrorKind::Config,
        }
    }

    /// Engine error code (SQLSTATE), when the engine reported one
    pub fn code(&self) -> Option<&str> {
        match self {
            SessionError::Engine(e) => e.code.as_deref(),
            _ => None,
        }
    }

    /// Engine error detail, when the engine reported one
    pub fn detail(&self) -> Option<&str> {
        match self {
            SessionError::Engine(e) => e.detail.as_deref(),
            _ => None,
        }
    }

    /// Validation failures that leave every piece of state untouched
    pub fn is_validation(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::SessionNotFound
                | ErrorKind::SessionBusy
                | ErrorKind::TransactionStateViolation
        )
    }
}
