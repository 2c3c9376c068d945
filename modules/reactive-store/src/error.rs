//! Typed errors raised by the store itself.
//!
//! Errors from reducers, hooks and effects travel as `anyhow::Error` and reach
//! the pumping `dispatch` caller unchanged; these variants cover the store's
//! own failure modes.

use reactive_state::StateError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The store behind a dispatch handle has been dropped.
    #[error("store is closed")]
    Closed,

    /// Reactive effects were triggered outside a tokio runtime.
    #[error("reactive effects require a running tokio runtime")]
    NoRuntime,

    /// State tree or container misconfiguration.
    #[error("state configuration error: {0}")]
    State(#[from] StateError),
}
