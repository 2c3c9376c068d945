//! Typed errors for container and state tree operations.

use thiserror::Error;

/// Errors raised by [`StateContainer`](crate::StateContainer) reads and
/// [`StateTree`](crate::StateTree) configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    /// The key was never set. Distinct from a key that is present but null.
    #[error("state key not found: {key}")]
    KeyNotFound { key: String },

    /// The key is present but holds a value of another type.
    #[error("state key {key} does not hold a {expected}")]
    TypeMismatch { key: String, expected: &'static str },

    /// The part type has no path from the root of the state tree.
    #[error("state tree has no node for {part}")]
    UnregisteredPart { part: &'static str },

    /// The part type is reachable through more than one path.
    #[error("state tree registers {part} more than once")]
    DuplicatePart { part: &'static str },
}

/// Result type alias for state operations.
pub type StateResult<T> = std::result::Result<T, StateError>;
