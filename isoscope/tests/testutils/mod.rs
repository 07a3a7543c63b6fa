//! Test utilities for isoscope integration tests
//!
//! - MemoryEngine: in-memory engine implementing the connection traits
//! - TestFixture: a session manager over a seeded MemoryEngine

#![allow(dead_code)]

pub mod memory_engine;
pub mod test_fixture;
