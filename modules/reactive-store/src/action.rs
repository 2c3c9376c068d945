//! Actions and the bounds shared by every store state.

use std::fmt::Debug;

/// An immutable intent to change state, identified by a stable kind tag.
///
/// Typically implemented by an enum whose variants carry the payload.
pub trait Action: Debug + Send + Sync + 'static {
    /// Stable tag used for narrowing reducers and for logging.
    fn kind(&self) -> &str;
}

/// Bound for values a store can hold.
///
/// Equality decides whether a transition changed anything; unchanged
/// results never reach subscribers.
pub trait State: Clone + PartialEq + Send + Sync + 'static {}

impl<T: Clone + PartialEq + Send + Sync + 'static> State for T {}
