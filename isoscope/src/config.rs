// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Manager configuration

use crate::error::SessionError;
use crate::txn::IsolationLevel;
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_key_column() -> String {
    "id".to_string()
}

/// A table whose rows are snapshotted and attributed to sessions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedTable {
    /// Table name as known to the engine
    pub name: String,

    /// Column holding the stable row identifier
    #[serde(default = "default_key_column")]
    pub key_column: String,
}

impl TrackedTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_column: default_key_column(),
        }
    }

    pub fn with_key_column(mut self, key_column: impl Into<String>) -> Self {
        self.key_column = key_column.into();
        self
    }
}

/// Configuration for a session manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Isolation level for sessions opened without one
    #[serde(default)]
    pub default_isolation: IsolationLevel,

    /// Tables read by the differ, the uncommitted views and the committed reader
    pub tracked_tables: Vec<TrackedTable>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            default_isolation: IsolationLevel::ReadCommitted,
            tracked_tables: vec![TrackedTable::new("accounts")],
        }
    }
}

impl ManagerConfig {
    pub fn with_tables(tables: impl IntoIterator<Item = TrackedTable>) -> Self {
        Self {
            tracked_tables: tables.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            SessionError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: ManagerConfig = serde_json::from_str(&text).map_err(|e| {
            SessionError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations with empty or duplicate table names
    pub fn validate(&self) -> Result<(), SessionError> {
        let mut seen = std::collections::HashSet::new();
        for table in &self.tracked_tables {
            if table.name.trim().is_empty() || table.key_column.trim().is_empty() {
                return Err(SessionError::Config(
                    "Tracked tables need a name and a key column".to_string(),
                ));
            }
            if !seen.insert(table.name.as_str()) {
                return Err(SessionError::Config(format!(
                    "Table '{}' is tracked twice",
                    table.name
                )));
            }
        }
        Ok(())
    }

    /// Look up a tracked table by name
    pub fn table(&self, name: &str) -> Option<&TrackedTable> {
        self.tracked_tables.iter().find(|t| t.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_tracks_accounts() {
        let config = ManagerConfig::default();
        assert_eq!(config.default_isolation, IsolationLevel::ReadCommitted);
        assert_eq!(config.table("accounts").map(|t| t.key_column.as_str()), Some("id"));
        assert!(config.table("orders").is_none());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "default_isolation": "REPEATABLE_READ",
                "tracked_tables": [
                    {{ "name": "accounts" }},
                    {{ "name": "orders", "key_column": "order_id" }}
                ]
            }}"#
        )
        .unwrap();

        let config = ManagerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.default_isolation, IsolationLevel::RepeatableRead);
        assert_eq!(config.tracked_tables.len(), 2);
        assert_eq!(config.table("orders").unwrap().key_column, "order_id");
        assert_eq!(config.table("accounts").unwrap().key_column, "id");
    }

    #[test]
    fn test_duplicate_tables_rejected() {
        let config =
            ManagerConfig::with_tables([TrackedTable::new("accounts"), TrackedTable::new("accounts")]);
        assert!(matches!(config.validate(), Err(SessionError::Config(_))));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = ManagerConfig::from_file("/nonexistent/isoscope.json").unwrap_err();
        assert!(matches!(err, SessionError::Config(_)));
    }
}
