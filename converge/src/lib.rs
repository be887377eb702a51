//! State-convergence engine for asynchronous remote resources.
//!
//! A remote control plane acknowledges create, modify and delete requests
//! immediately while the object keeps transitioning. This crate bridges that
//! gap:
//!
//! - **[`core`]**: Pure, deterministic logic (identifier codec, label
//!   classification, poll schedule). No I/O, fully testable in isolation.
//! - **[`wait`]**: The convergence engine polling a refresh function until a
//!   target label, confirmed absence or the deadline.
//! - **[`lifecycle`]**: Create/read/update/delete orchestration over any
//!   [`lifecycle::ManagedResource`], built on [`lookup`] and [`wait`].
//! - **[`resources`]**: Concrete resource kinds.
//! - **[`sim`]**: Scripted in-memory control plane for tests and scenarios.
//! - **[`io`]**: Configuration on disk.

pub mod cancel;
pub mod clock;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod lifecycle;
pub mod logging;
pub mod lookup;
pub mod resources;
pub mod sim;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod wait;
