//! Crate-level error types.

use snafu::Snafu;

/// An error raised when a checked cast on a [`Value`](crate::Value)
/// requests a variant the value does not hold.
#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(display("bad value cast: requested {} but value is {}", requested, got))]
pub struct CastValueError {
    /// The variant kind requested by the caller.
    pub requested: &'static str,
    /// The kind the value actually holds.
    pub got: &'static str,
}

/// Type alias for a result with a value cast error.
pub type Result<T, E = CastValueError> = std::result::Result<T, E>;
