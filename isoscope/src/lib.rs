// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Isoscope - concurrent database sessions side by side
//!
//! Isoscope drives several independent database transactions at once, one
//! dedicated connection per logical terminal, so that the effect of isolation
//! levels on visibility can be observed directly.
//!
//! # Features
//!
//! - **Session Registry**: one exclusive engine connection per terminal
//! - **Transaction State Machine**: BEGIN / COMMIT / ROLLBACK with implicit
//!   rollback after a failing statement
//! - **Change Tracking**: rows a session actually wrote, derived by diffing
//!   full-table snapshots around each in-transaction statement
//! - **Uncommitted Views**: a session's own picture of the tracked tables
//! - **Committed Reads**: a transaction-free connection that only ever sees
//!   durable data
//!
//! # Usage
//!
//! ```no_run
//! use isoscope::{ManagerConfig, PostgresConnector, SessionManager};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), isoscope::SessionError> {
//! let connector = Arc::new(PostgresConnector::from_url("postgres://localhost/demo")?);
//! let manager = SessionManager::connect(connector, ManagerConfig::default()).await?;
//!
//! let session = manager.open("T1", None).await?;
//! let response = manager.execute(&session.session_id, "BEGIN").await?;
//! assert!(response.session.in_transaction);
//!
//! manager.close_all().await;
//! # Ok(())
//! # }
//! ```

pub mod committed;
pub mod config;
pub mod engine;
pub mod error;
pub mod session;
pub mod snapshot;
pub mod txn;

pub use committed::CommittedReader;
pub use config::{ManagerConfig, TrackedTable};
pub use engine::postgres::PostgresConnector;
pub use engine::{ColumnInfo, Connection, Connector, EngineError, QueryResult, Row};
pub use error::{ErrorKind, SessionError};
pub use session::{
    ModifiedRows, OperationResponse, Session, SessionDescriptor, SessionId, SessionManager,
    SessionRegistry,
};
pub use snapshot::{SnapshotDiffer, TableSnapshot, UncommittedSnapshot};
pub use txn::{classify, IsolationLevel, TransactionCommand};

/// Isoscope version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Isoscope crate name
pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");
