//! Deterministic, pure logic shared by the convergence engine.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! values and return deterministic outputs suitable for tests.

pub mod budget;
pub mod id;
pub mod labels;
pub mod schedule;
