// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Interactive console
//!
//! Each named terminal owns one session. SQL typed at the prompt goes to the
//! current terminal and runs on a background task, so a statement waiting on
//! another terminal's lock never freezes the prompt.

use colored::Colorize;
use isoscope::{
    IsolationLevel, ManagerConfig, OperationResponse, PostgresConnector, QueryResult,
    SessionError, SessionManager,
};
use rustyline::{error::ReadlineError, CompletionType, Config, EditMode, Editor};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Runtime;

use super::commands::OutputFormat;
use super::output::ResultFormatter;

pub struct ConsoleOptions {
    pub database_url: String,
    pub config: Option<PathBuf>,
    pub setup: Option<PathBuf>,
    pub format: OutputFormat,
}

/// A console command typed after a backslash
#[derive(Debug, Clone, PartialEq)]
enum ConsoleCommand {
    Open {
        terminal: String,
        level: Option<IsolationLevel>,
    },
    Use(String),
    Isolation(IsolationLevel),
    Commit,
    Rollback,
    View,
    Committed(Option<String>),
    Sessions,
    Close(Option<String>),
}

fn parse_command(line: &str) -> Result<ConsoleCommand, String> {
    let body = line.trim().trim_start_matches('\\');
    let (name, rest) = match body.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (body, ""),
    };
    let argument = (!rest.is_empty()).then(|| rest.to_string());

    match name.to_lowercase().as_str() {
        "open" => {
            let (terminal, level) = match rest.split_once(char::is_whitespace) {
                Some((terminal, level)) => (terminal, Some(level.parse::<IsolationLevel>()?)),
                None => (rest, None),
            };
            if terminal.is_empty() {
                return Err("Usage: \\open <terminal> [isolation level]".to_string());
            }
            Ok(ConsoleCommand::Open {
                terminal: terminal.to_string(),
                level,
            })
        }
        "use" => argument
            .map(ConsoleCommand::Use)
            .ok_or_else(|| "Usage: \\use <terminal>".to_string()),
        "isolation" => Ok(ConsoleCommand::Isolation(rest.parse()?)),
        "commit" => Ok(ConsoleCommand::Commit),
        "rollback" => Ok(ConsoleCommand::Rollback),
        "view" => Ok(ConsoleCommand::View),
        "committed" => Ok(ConsoleCommand::Committed(argument)),
        "sessions" => Ok(ConsoleCommand::Sessions),
        "close" => Ok(ConsoleCommand::Close(argument)),
        other => Err(format!("Unknown command '\\{}'. Type 'help' for commands.", other)),
    }
}

struct Console {
    runtime: Runtime,
    manager: Arc<SessionManager>,
    format: OutputFormat,
    /// Terminal name to session id
    terminals: BTreeMap<String, String>,
    current: Option<String>,
}

impl Console {
    fn current_session(&self) -> Result<(String, String), String> {
        let terminal = self
            .current
            .clone()
            .ok_or_else(|| "No terminal selected. Use \\open <terminal> first.".to_string())?;
        let session_id = self
            .terminals
            .get(&terminal)
            .cloned()
            .ok_or_else(|| format!("Terminal '{}' is not open", terminal))?;
        Ok((terminal, session_id))
    }

    fn run_command(&mut self, command: ConsoleCommand) -> Result<(), String> {
        match command {
            ConsoleCommand::Open { terminal, level } => {
                if self.terminals.contains_key(&terminal) {
                    return Err(format!("Terminal '{}' is already open", terminal));
                }
                let session = self
                    .runtime
                    .block_on(self.manager.open(&terminal, level))
                    .map_err(|e| ResultFormatter::format_error(&e))?;
                println!(
                    "{}",
                    format!(
                        "Opened terminal {} at {}",
                        terminal, session.isolation_level
                    )
                    .green()
                );
                self.terminals.insert(terminal.clone(), session.session_id);
                self.current = Some(terminal);
            }
            ConsoleCommand::Use(terminal) => {
                if !self.terminals.contains_key(&terminal) {
                    return Err(format!("Terminal '{}' is not open", terminal));
                }
                self.current = Some(terminal);
            }
            ConsoleCommand::Isolation(level) => {
                let (terminal, session_id) = self.current_session()?;
                let response = self
                    .manager
                    .set_isolation_level(&session_id, level)
                    .map_err(|e| ResultFormatter::format_error(&e))?;
                match response.outcome {
                    Ok(()) => println!(
                        "{}",
                        format!("{} will BEGIN at {}", terminal, level).green()
                    ),
                    Err(e) => return Err(ResultFormatter::format_error(&e)),
                }
            }
            ConsoleCommand::Commit => self.spawn_statement("COMMIT".to_string())?,
            ConsoleCommand::Rollback => self.spawn_statement("ROLLBACK".to_string())?,
            ConsoleCommand::View => {
                let (terminal, session_id) = self.current_session()?;
                let view = self
                    .runtime
                    .block_on(self.manager.uncommitted_view(&session_id))
                    .map_err(|e| ResultFormatter::format_error(&e))?;
                match view {
                    Some(view) => println!(
                        "{}",
                        ResultFormatter::format_view(
                            &view,
                            &self.manager.config().tracked_tables,
                            self.format
                        )
                    ),
                    None => println!("{}", format!("{} has no open transaction", terminal).yellow()),
                }
            }
            ConsoleCommand::Committed(table) => {
                let tables = match table {
                    Some(name) => {
                        let rows = self
                            .runtime
                            .block_on(self.manager.read_committed_table(&name))
                            .map_err(|e| ResultFormatter::format_error(&e))?;
                        BTreeMap::from([(name, rows)])
                    }
                    None => self
                        .runtime
                        .block_on(self.manager.committed_reader().read_all())
                        .map_err(|e| ResultFormatter::format_error(&e))?,
                };
                println!(
                    "{}",
                    ResultFormatter::format_tables(
                        "Committed data",
                        &tables,
                        None,
                        &self.manager.config().tracked_tables,
                        self.format
                    )
                );
            }
            ConsoleCommand::Sessions => {
                println!(
                    "{}",
                    ResultFormatter::format_sessions(
                        &self.manager.list_sessions(),
                        self.current.as_deref(),
                        self.format
                    )
                );
            }
            ConsoleCommand::Close(terminal) => {
                let terminal = match terminal.or_else(|| self.current.clone()) {
                    Some(terminal) => terminal,
                    None => return Err("Usage: \\close [terminal]".to_string()),
                };
                let session_id = self
                    .terminals
                    .remove(&terminal)
                    .ok_or_else(|| format!("Terminal '{}' is not open", terminal))?;
                if self.current.as_deref() == Some(terminal.as_str()) {
                    self.current = None;
                }
                match self.runtime.block_on(self.manager.try_close(&session_id)) {
                    Ok(()) => println!("{}", format!("Closed terminal {}", terminal).green()),
                    Err(SessionError::SessionBusy(_)) => {
                        println!(
                            "{}",
                            format!(
                                "Terminal {} has a statement in flight; it will close when that statement finishes",
                                terminal
                            )
                            .yellow()
                        );
                        let manager = self.manager.clone();
                        self.runtime.spawn(async move {
                            match manager.close(&session_id).await {
                                Ok(()) => println!("{}", format!("Closed terminal {}", terminal).green()),
                                Err(e) => eprintln!("{}", ResultFormatter::format_error(&e)),
                            }
                        });
                    }
                    Err(e) => return Err(ResultFormatter::format_error(&e)),
                }
            }
        }
        Ok(())
    }

    /// Run SQL on the current terminal in the background
    fn spawn_statement(&self, sql: String) -> Result<(), String> {
        let (_, session_id) = self.current_session()?;
        let manager = self.manager.clone();
        let format = self.format;

        self.runtime.spawn(async move {
            let response = match manager.execute(&session_id, &sql).await {
                Ok(response) => response,
                Err(e) => {
                    eprintln!("{}", ResultFormatter::format_error(&e));
                    return;
                }
            };
            let tracked = &manager.config().tracked_tables;
            println!(
                "{}",
                ResultFormatter::format_response(&response, &sql, tracked, format)
            );
            if ends_idle_after_change(&response) {
                match manager.committed_reader().read_all().await {
                    Ok(tables) => println!(
                        "{}",
                        ResultFormatter::format_tables("Committed data", &tables, None, tracked, format)
                    ),
                    Err(e) => log::warn!("Failed to refresh committed data: {}", e),
                }
            }
        });
        Ok(())
    }

    fn prompt(&self) -> String {
        match &self.current {
            Some(terminal) => {
                let in_transaction = self
                    .terminals
                    .get(terminal)
                    .and_then(|id| self.manager.describe(id).ok())
                    .is_some_and(|s| s.in_transaction);
                if in_transaction {
                    format!("{}::txn> ", terminal.cyan())
                } else {
                    format!("{}::sql> ", terminal.cyan())
                }
            }
            None => "isoscope> ".to_string(),
        }
    }
}

/// Committed data may have changed: a statement outside a transaction, a
/// COMMIT, or any transaction end
fn ends_idle_after_change(response: &OperationResponse<QueryResult>) -> bool {
    response.ends_idle() && !response.error().is_some_and(|e| e.is_validation())
}

fn load_config(path: Option<&Path>) -> Result<ManagerConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(ManagerConfig::from_file(path)?),
        None => Ok(ManagerConfig::default()),
    }
}

/// Handle the console (REPL) command
pub fn handle_console(options: ConsoleOptions) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(options.config.as_deref())?;
    let runtime = Runtime::new()?;

    let connector = PostgresConnector::from_url(&options.database_url)?;
    let manager = runtime.block_on(SessionManager::connect(Arc::new(connector), config))?;

    if let Some(setup) = &options.setup {
        let script = std::fs::read_to_string(setup)
            .map_err(|e| format!("Failed to read setup script {:?}: {}", setup, e))?;
        runtime.block_on(manager.apply_setup_script(&script))?;
        println!("{}", format!("Applied setup script {:?}", setup).green());
    }

    println!("{}", "Isoscope".bold().green());
    println!("Type 'help' for commands, 'exit' or 'quit' to exit");
    println!("SQL statements are terminated with ';'\n");
    let tracked: Vec<&str> = manager
        .config()
        .tracked_tables
        .iter()
        .map(|t| t.name.as_str())
        .collect();
    println!("{}", format!("Tracking: {}", tracked.join(", ")).cyan());

    let mut console = Console {
        runtime,
        manager: Arc::new(manager),
        format: options.format,
        terminals: BTreeMap::new(),
        current: None,
    };

    let config = Config::builder()
        .edit_mode(EditMode::Emacs)
        .history_ignore_space(true)
        .completion_type(CompletionType::List)
        .auto_add_history(false)
        .build();

    let mut rl = Editor::<(), _>::with_config(config)?;

    let history_path = ".isoscope/history.txt";
    if let Some(parent) = Path::new(&history_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    let _ = rl.load_history(&history_path);

    let mut query_buffer = String::new();

    loop {
        let prompt = if query_buffer.is_empty() {
            console.prompt()
        } else {
            "...> ".to_string()
        };

        let line = match rl.readline(&prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                if !query_buffer.is_empty() {
                    query_buffer.clear();
                    println!("{}", "\nQuery buffer cleared".yellow());
                }
                continue;
            }
            Err(ReadlineError::Eof) => {
                break;
            }
            Err(err) => {
                eprintln!("{}", format!("Error: {:?}", err).red());
                break;
            }
        };

        let trimmed = line.trim();

        if query_buffer.is_empty() {
            match trimmed.to_lowercase().as_str() {
                "exit" | "quit" => break,
                "help" => {
                    print_help();
                    continue;
                }
                "" => continue,
                _ => {}
            }

            if trimmed.starts_with('\\') {
                rl.add_history_entry(trimmed)?;
                let result = parse_command(trimmed).and_then(|cmd| console.run_command(cmd));
                if let Err(message) = result {
                    eprintln!("{}", message.red());
                }
                continue;
            }
        }

        query_buffer.push_str(&line);
        query_buffer.push('\n');

        if trimmed.ends_with(';') {
            let query = query_buffer.trim().to_string();
            rl.add_history_entry(&query)?;
            if let Err(message) = console.spawn_statement(query) {
                eprintln!("{}", message.red());
            }
            query_buffer.clear();
        }
    }

    let _ = rl.save_history(&history_path);

    let Console {
        runtime, manager, ..
    } = console;
    let failures = runtime.block_on(manager.close_all());
    if failures > 0 {
        eprintln!(
            "{}",
            format!("{} sessions did not close cleanly", failures).yellow()
        );
    }
    match Arc::try_unwrap(manager) {
        Ok(manager) => runtime.block_on(manager.shutdown())?,
        Err(_) => log::warn!("Statements still running at exit; committed reader not closed"),
    }
    println!("{}", "Goodbye!".green());
    Ok(())
}

fn print_help() {
    println!("{}", "Available commands:".bold().green());
    println!("  {}  - Open a terminal with its own session", "\\open <terminal> [level]".cyan());
    println!("  {}  - Switch to an open terminal", "\\use <terminal>".cyan());
    println!("  {}  - Isolation level for the next BEGIN", "\\isolation <level>".cyan());
    println!("  {}  - Commit the current transaction", "\\commit".cyan());
    println!("  {}  - Roll back the current transaction", "\\rollback".cyan());
    println!("  {}  - Show this terminal's uncommitted view", "\\view".cyan());
    println!("  {}  - Show committed data", "\\committed [table]".cyan());
    println!("  {}  - List open terminals", "\\sessions".cyan());
    println!("  {}  - Close a terminal, rolling back its transaction", "\\close [terminal]".cyan());
    println!("  {}  - Show this help message", "help".cyan());
    println!("  {}  - Exit the console", "exit/quit".cyan());
    println!("\n{}", "Isolation levels:".bold().green());
    let levels: Vec<&str> = IsolationLevel::ALL.iter().map(|l| l.as_str()).collect();
    println!("  {}", levels.join(", "));
    println!("\n{}", "Examples:".bold().green());
    println!("  {}", "\\open T1 REPEATABLE READ".yellow());
    println!("  {}", "BEGIN;".yellow());
    println!("  {}", "UPDATE accounts SET balance = balance + 100 WHERE id = 1;".yellow());
    println!("  {}", "\\use T2".yellow());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_open_with_level() {
        assert_eq!(
            parse_command("\\open T1 repeatable read"),
            Ok(ConsoleCommand::Open {
                terminal: "T1".to_string(),
                level: Some(IsolationLevel::RepeatableRead),
            })
        );
        assert_eq!(
            parse_command("\\open T2"),
            Ok(ConsoleCommand::Open {
                terminal: "T2".to_string(),
                level: None,
            })
        );
        assert!(parse_command("\\open").is_err());
        assert!(parse_command("\\open T1 eventually").is_err());
    }

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(parse_command("\\commit"), Ok(ConsoleCommand::Commit));
        assert_eq!(parse_command("\\ROLLBACK"), Ok(ConsoleCommand::Rollback));
        assert_eq!(parse_command("\\view"), Ok(ConsoleCommand::View));
        assert_eq!(parse_command("\\sessions"), Ok(ConsoleCommand::Sessions));
        assert_eq!(parse_command("\\committed"), Ok(ConsoleCommand::Committed(None)));
        assert_eq!(
            parse_command("\\committed accounts"),
            Ok(ConsoleCommand::Committed(Some("accounts".to_string())))
        );
        assert_eq!(parse_command("\\close"), Ok(ConsoleCommand::Close(None)));
        assert_eq!(
            parse_command("\\isolation serializable"),
            Ok(ConsoleCommand::Isolation(IsolationLevel::Serializable))
        );
        assert_eq!(parse_command("\\use T2"), Ok(ConsoleCommand::Use("T2".to_string())));
        assert!(parse_command("\\use").is_err());
        assert!(parse_command("\\frobnicate").is_err());
    }
}
