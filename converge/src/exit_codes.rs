//! Stable exit codes for converge CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid input, config or other errors.
pub const INVALID: i32 = 1;
/// An identifier did not match its resource kind's layout.
pub const MALFORMED: i32 = 2;
