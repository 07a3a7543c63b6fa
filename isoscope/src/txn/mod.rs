// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Transaction control vocabulary
//!
//! - Isolation levels and the statement that opens a transaction at one
//! - Classification of SQL text into BEGIN / COMMIT / ROLLBACK / ordinary

pub mod command;
pub mod isolation;

pub use command::{classify, TransactionCommand};
pub use isolation::IsolationLevel;
