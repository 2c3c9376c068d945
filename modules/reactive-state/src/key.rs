//! Sub-state keys and the registry that derives them.

use std::any::TypeId;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Stable key of one entry in a [`StateContainer`](crate::StateContainer).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateKey(Arc<str>);

impl StateKey {
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(Arc::from(key.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for StateKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StateKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for StateKey {
    fn from(key: String) -> Self {
        Self(Arc::from(key))
    }
}

/// Maps sub-state types to container keys.
///
/// Keys default to the type's full path as reported by
/// [`std::any::type_name`]. A different derivation can be supplied once at
/// construction, and individual types can be pinned to an explicit key.
#[derive(Clone)]
pub struct KeyRegistry {
    derive: fn(&'static str) -> String,
    overrides: HashMap<TypeId, StateKey>,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self::with_derivation(|type_name| type_name.to_string())
    }

    /// Use `derive` to turn a type name into a key for every type without an
    /// explicit override.
    pub fn with_derivation(derive: fn(&'static str) -> String) -> Self {
        Self {
            derive,
            overrides: HashMap::new(),
        }
    }

    /// Pin `T` to `key`.
    pub fn with_key<T: 'static>(mut self, key: impl Into<StateKey>) -> Self {
        self.overrides.insert(TypeId::of::<T>(), key.into());
        self
    }

    pub fn key_of<T: 'static>(&self) -> StateKey {
        match self.overrides.get(&TypeId::of::<T>()) {
            Some(key) => key.clone(),
            None => StateKey::from((self.derive)(std::any::type_name::<T>())),
        }
    }
}

impl Default for KeyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for KeyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRegistry")
            .field("overrides", &self.overrides.values().collect::<Vec<_>>())
            .finish()
    }
}
