// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Transaction-control command classification
//!
//! Recognizes BEGIN, COMMIT and ROLLBACK by keyword. This is a prefix match
//! on a single statement, not a SQL parser: a keyword inside a string literal
//! or a multi-statement batch is not detected.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// `BEGIN` alone or followed by modifiers (`BEGIN TRANSACTION`, `BEGIN ISOLATION LEVEL ...`);
/// a `;` anywhere after the keyword makes it a batch
static BEGIN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^BEGIN(\s[^;]*)?$").expect("BEGIN pattern is a valid regex"));

/// Classification of one SQL text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionCommand {
    Begin,
    Commit,
    Rollback,
    /// Anything that is not transaction control
    Ordinary,
}

impl TransactionCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionCommand::Begin => "BEGIN",
            TransactionCommand::Commit => "COMMIT",
            TransactionCommand::Rollback => "ROLLBACK",
            TransactionCommand::Ordinary => "ORDINARY",
        }
    }
}

impl std::fmt::Display for TransactionCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify raw SQL text
pub fn classify(sql: &str) -> TransactionCommand {
    let trimmed = sql.trim();
    let statement = trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end();
    let normalized = statement.to_uppercase();

    match normalized.as_str() {
        "COMMIT" => TransactionCommand::Commit,
        "ROLLBACK" => TransactionCommand::Rollback,
        s if BEGIN_PATTERN.is_match(s) => TransactionCommand::Begin,
        _ => TransactionCommand::Ordinary,
    }
}
