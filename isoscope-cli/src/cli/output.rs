// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Result formatting for console output

use super::commands::OutputFormat;
use colored::*;
use comfy_table::{presets::UTF8_FULL, Cell, Color, Table};
use isoscope::{
    ModifiedRows, OperationResponse, QueryResult, Row, SessionDescriptor, SessionError,
    TrackedTable, UncommittedSnapshot,
};
use serde_json::Value;
use std::collections::BTreeMap;

/// Result formatter for different output formats
pub struct ResultFormatter;

impl ResultFormatter {
    /// Format the response to one statement
    pub fn format_response(
        response: &OperationResponse<QueryResult>,
        sql: &str,
        tracked: &[TrackedTable],
        format: OutputFormat,
    ) -> String {
        match format {
            OutputFormat::Table => Self::response_table(response, sql, tracked),
            OutputFormat::Json => Self::response_json(response),
        }
    }

    /// Format a set of tables, highlighting rows present in `modified`
    pub fn format_tables(
        title: &str,
        tables: &BTreeMap<String, Vec<Row>>,
        modified: Option<&ModifiedRows>,
        tracked: &[TrackedTable],
        format: OutputFormat,
    ) -> String {
        match format {
            OutputFormat::Table => {
                let mut output = format!("{}\n", title.bold().green());
                for (name, rows) in tables {
                    output.push_str(&Self::table_of_rows(name, rows, modified, tracked));
                }
                output
            }
            OutputFormat::Json => Self::pretty(&serde_json::json!({
                "title": title,
                "tables": tables,
                "modified_row_ids": modified,
            })),
        }
    }

    pub fn format_view(
        view: &UncommittedSnapshot,
        tracked: &[TrackedTable],
        format: OutputFormat,
    ) -> String {
        match format {
            OutputFormat::Table => Self::format_tables(
                &format!("Uncommitted view of {}", view.terminal_identity),
                &view.tables,
                Some(&view.modified_row_ids),
                tracked,
                format,
            ),
            OutputFormat::Json => Self::pretty(&serde_json::json!(view)),
        }
    }

    /// Format the session list; `current` marks the active terminal
    pub fn format_sessions(
        sessions: &[SessionDescriptor],
        current: Option<&str>,
        format: OutputFormat,
    ) -> String {
        match format {
            OutputFormat::Json => Self::pretty(&serde_json::json!(sessions)),
            OutputFormat::Table => {
                if sessions.is_empty() {
                    return format!("{}\n", "No open sessions".yellow());
                }
                let mut table = Table::new();
                table.load_preset(UTF8_FULL);
                table.set_header(
                    ["", "terminal", "isolation", "state", "modified rows", "session id"]
                        .into_iter()
                        .map(|h| Cell::new(h).fg(Color::Green)),
                );
                for session in sessions {
                    let marker = if current == Some(session.terminal_identity.as_str()) {
                        "*"
                    } else {
                        ""
                    };
                    let state = if session.in_transaction {
                        Cell::new("IN TRANSACTION").fg(Color::Yellow)
                    } else {
                        Cell::new("IDLE")
                    };
                    table.add_row(vec![
                        Cell::new(marker),
                        Cell::new(&session.terminal_identity),
                        Cell::new(session.isolation_level),
                        state,
                        Cell::new(session.modified_row_ids.len()),
                        Cell::new(&session.session_id),
                    ]);
                }
                format!("{}\n", table)
            }
        }
    }

    pub fn format_error(err: &SessionError) -> String {
        let mut output = format!("Error: {}", err).red().to_string();
        if let Some(code) = err.code() {
            output.push_str(&format!(" [{}]", code).dimmed().to_string());
        }
        if let Some(detail) = err.detail() {
            output.push_str(&format!("\n  {}", detail.yellow()));
        }
        output
    }

    fn response_table(
        response: &OperationResponse<QueryResult>,
        sql: &str,
        tracked: &[TrackedTable],
    ) -> String {
        let session = &response.session;
        let mut output = String::new();

        match &response.outcome {
            Ok(result) => {
                output.push_str(&format!(
                    "{}\n",
                    format!("✅ {}: {}", session.terminal_identity, Self::summary(sql, result))
                        .green()
                ));
                if !result.columns.is_empty() {
                    output.push_str(&Self::result_table(result));
                }
            }
            Err(e) => {
                output.push_str(&format!("{}: ", session.terminal_identity.bold()));
                output.push_str(&Self::format_error(e));
                output.push('\n');
                if !session.in_transaction && matches!(e, SessionError::Engine(_)) {
                    output.push_str(&format!("{}\n", "Transaction rolled back".yellow()));
                }
            }
        }

        output.push_str(&format!(
            "{} {}\n",
            format!("[{}]", session.isolation_level).dimmed(),
            if session.in_transaction {
                "IN TRANSACTION".yellow()
            } else {
                "IDLE".normal()
            }
        ));

        if let Some(view) = &response.snapshot {
            for (name, rows) in &view.tables {
                output.push_str(&Self::table_of_rows(
                    name,
                    rows,
                    Some(&view.modified_row_ids),
                    tracked,
                ));
            }
        }
        output
    }

    fn response_json(response: &OperationResponse<QueryResult>) -> String {
        let mut json_obj = serde_json::json!({
            "session": response.session,
            "snapshot": response.snapshot,
        });
        if let Value::Object(ref mut map) = json_obj {
            match &response.outcome {
                Ok(result) => {
                    map.insert("status".to_string(), Value::from("success"));
                    map.insert("columns".to_string(), serde_json::json!(result.column_names()));
                    map.insert("rows".to_string(), serde_json::json!(result.rows));
                    map.insert("rows_affected".to_string(), Value::from(result.row_count));
                    map.insert("execution_time_ms".to_string(), Value::from(result.duration_ms));
                }
                Err(e) => {
                    map.insert("status".to_string(), Value::from("error"));
                    map.insert(
                        "error".to_string(),
                        serde_json::json!({
                            "kind": e.kind(),
                            "message": e.to_string(),
                            "code": e.code(),
                            "detail": e.detail(),
                        }),
                    );
                }
            }
        }
        Self::pretty(&json_obj)
    }

    fn summary(sql: &str, result: &QueryResult) -> String {
        let verb = sql
            .split_whitespace()
            .next()
            .unwrap_or("")
            .trim_end_matches(';')
            .to_uppercase();
        if result.columns.is_empty() {
            format!("{} ({} rows, {} ms)", verb, result.row_count, result.duration_ms)
        } else {
            format!("{} returned {} rows in {} ms", verb, result.rows.len(), result.duration_ms)
        }
    }

    fn result_table(result: &QueryResult) -> String {
        let columns = result.column_names();
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(columns.iter().map(|col| Cell::new(col).fg(Color::Green)));
        for row in &result.rows {
            table.add_row(
                columns
                    .iter()
                    .map(|col| row.get(*col).map(Self::value_to_string).unwrap_or_else(|| "NULL".to_string())),
            );
        }
        format!("{}\n", table)
    }

    fn table_of_rows(
        name: &str,
        rows: &[Row],
        modified: Option<&ModifiedRows>,
        tracked: &[TrackedTable],
    ) -> String {
        let key_column = tracked
            .iter()
            .find(|t| t.name == name)
            .map(|t| t.key_column.as_str())
            .unwrap_or("id");

        if rows.is_empty() {
            return format!("{} {}\n", name.bold(), "(empty)".yellow());
        }

        // Column order of the first row, then anything later rows add
        let mut columns: Vec<&str> = Vec::new();
        for row in rows {
            for key in row.keys() {
                if !columns.contains(&key.as_str()) {
                    columns.push(key);
                }
            }
        }

        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(columns.iter().map(|col| Cell::new(col).fg(Color::Green)));
        for row in rows {
            let owned = modified.is_some_and(|m| {
                isoscope::engine::row_id(row, key_column).is_some_and(|id| m.contains(name, &id))
            });
            table.add_row(columns.iter().map(|col| {
                let text = row
                    .get(*col)
                    .map(Self::value_to_string)
                    .unwrap_or_else(|| "NULL".to_string());
                if owned {
                    Cell::new(text).fg(Color::Yellow)
                } else {
                    Cell::new(text)
                }
            }));
        }
        format!("{}\n{}\n", name.bold(), table)
    }

    fn value_to_string(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            Value::Null => "NULL".to_string(),
            other => other.to_string(),
        }
    }

    fn pretty(value: &Value) -> String {
        serde_json::to_string_pretty(value).unwrap_or_else(|_| {
            "{\"status\": \"error\", \"error\": \"Could not serialize results to JSON\"}".to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_value_to_string() {
        assert_eq!(ResultFormatter::value_to_string(&json!("alice")), "alice");
        assert_eq!(ResultFormatter::value_to_string(&json!(1100)), "1100");
        assert_eq!(ResultFormatter::value_to_string(&Value::Null), "NULL");
    }

    #[test]
    fn test_tables_as_json_carry_modified_ids() {
        let mut tables = BTreeMap::new();
        tables.insert(
            "accounts".to_string(),
            vec![row(json!({"id": 1, "balance": 1100}))],
        );
        let mut modified = ModifiedRows::new();
        modified.insert("accounts", "1");

        let output = ResultFormatter::format_tables(
            "view",
            &tables,
            Some(&modified),
            &[TrackedTable::new("accounts")],
            OutputFormat::Json,
        );
        let parsed: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["modified_row_ids"]["accounts"], json!(["1"]));
        assert_eq!(parsed["tables"]["accounts"][0]["balance"], json!(1100));
    }

    #[test]
    fn test_empty_table_is_labelled() {
        colored::control::set_override(false);
        let output = ResultFormatter::table_of_rows("accounts", &[], None, &[]);
        assert_eq!(output, "accounts (empty)\n");
    }
}
