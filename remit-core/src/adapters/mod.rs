//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - DuckDB for the AccountStore port
//! - In-memory store for tests and embedding
//! - System and manual clocks for the Clock port

pub mod clock;
pub mod duckdb;
pub mod memory;
