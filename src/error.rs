//! Error types for the connection manager.

use crate::handle::Handle;

/// Errors returned by the fallible connection manager operations.
///
/// Transport failures reported by a connection are never surfaced through
/// this type. They are counted in [`Stats`](crate::Stats) and handled by the
/// auto-destroy or reset policy instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("handle {0} is already registered")]
    AlreadyRegistered(Handle),
    #[error("slot table is full (capacity {capacity})")]
    TableFull { capacity: usize },
    #[error("handle {handle} is outside the table bound of {capacity}")]
    HandleOutOfRange { handle: Handle, capacity: usize },
    #[error("failed to grow the bucket for handle {0}")]
    AllocationFailed(Handle),
    #[error("handle {0} is not registered")]
    NotRegistered(Handle),
    #[error("connection on handle {0} is dead")]
    ConnectionDead(Handle),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(String),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}
