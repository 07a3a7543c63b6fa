// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! CLI module for Isoscope
//!
//! Provides the command-line arguments and the interactive console in which
//! several terminals each drive their own database session.

pub mod commands;
pub mod console;
pub mod output;

pub use commands::{Cli, Commands};
pub use console::{handle_console, ConsoleOptions};
