// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Session management
//!
//! This module provides:
//! - Session models and descriptors
//! - The session registry (one dedicated connection per session)
//! - The session manager: statement execution and the transaction state machine

pub mod manager;
pub mod models;
pub mod registry;

pub use manager::SessionManager;
pub use models::{ModifiedRows, OperationResponse, Session, SessionDescriptor, SessionId};
pub use registry::{SessionRegistry, SessionSlot};
