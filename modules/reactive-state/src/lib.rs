//! Immutable state building blocks.
//!
//! Two independent structures, neither of which knows about dispatch:
//!
//! - [`StateContainer`]: a heterogeneous, keyed, immutable map of sub-states,
//!   edited through a single-owner [`Transaction`] and committed into a new
//!   container.
//! - [`StateTree`]: a typed lens tree that reads and rewrites a part nested
//!   inside a whole, built with [`StateTreeBuilder`].
//!
//! Keys for the container come from an explicit [`KeyRegistry`] rather than a
//! process-wide cache.

pub mod container;
pub mod error;
pub mod key;
pub mod tree;

pub use container::{StateContainer, StateValue, Transaction};
pub use error::{StateError, StateResult};
pub use key::{KeyRegistry, StateKey};
pub use tree::{Composer, Getter, Lens, StateTree, StateTreeBuilder, TreeValue};
