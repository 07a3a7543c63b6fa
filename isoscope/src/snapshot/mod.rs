// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Table snapshots: change detection and uncommitted views

pub mod differ;
pub mod view;

pub use differ::{diff_rows, SnapshotDiffer, TableSnapshot};
pub use view::{build_view, UncommittedSnapshot};
