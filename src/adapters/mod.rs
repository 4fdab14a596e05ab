//! Infrastructure adapters. Implement the ports.
//!
//! Stores (in-memory, libsql), clocks, JSON snapshots, terminal UI. Map errors to DomainError.

pub mod clock;
pub mod persistence;
pub mod ui;
