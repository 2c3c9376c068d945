//! Heterogeneous keyed state and its transactions.
//!
//! A [`StateContainer`] is never mutated in place. Edits go through a
//! [`Transaction`], which stages changes over a base container and commits
//! them into a new one. Containers share storage until a commit actually
//! changes something, so an empty commit returns a container equal to its
//! base.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::key::{KeyRegistry, StateKey};

/// A stored sub-state. `None` is a present null, distinct from a missing key.
pub type StateValue = Option<Arc<dyn Any + Send + Sync>>;

/// Immutable mapping from [`StateKey`] to sub-state.
#[derive(Clone)]
pub struct StateContainer {
    entries: Arc<HashMap<StateKey, StateValue>>,
    keys: Arc<KeyRegistry>,
}

impl StateContainer {
    pub fn new() -> Self {
        Self::with_registry(Arc::new(KeyRegistry::new()))
    }

    /// Empty container deriving keys through `keys`.
    pub fn with_registry(keys: Arc<KeyRegistry>) -> Self {
        Self {
            entries: Arc::new(HashMap::new()),
            keys,
        }
    }

    pub fn registry(&self) -> &Arc<KeyRegistry> {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &StateKey> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StateKey, &StateValue)> {
        self.entries.iter()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.contains_key(self.keys.key_of::<T>().as_str())
    }

    /// Read the sub-state of type `T`.
    ///
    /// `Err(KeyNotFound)` when it was never set, `Ok(None)` when it is
    /// present but null.
    pub fn get<T: Send + Sync + 'static>(&self) -> StateResult<Option<Arc<T>>> {
        let key = self.keys.key_of::<T>();
        self.get_by_key(key.as_str())
    }

    pub fn get_by_key<T: Send + Sync + 'static>(&self, key: &str) -> StateResult<Option<Arc<T>>> {
        match self.entries.get(key) {
            Some(value) => downcast(key, value),
            None => Err(StateError::KeyNotFound {
                key: key.to_string(),
            }),
        }
    }

    /// Open a transaction against this container.
    pub fn begin_transaction(&self) -> Transaction {
        Transaction {
            base: self.clone(),
            changes: HashMap::new(),
        }
    }

    fn shares_storage(&self, other: &StateContainer) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries)
    }
}

impl Default for StateContainer {
    fn default() -> Self {
        Self::new()
    }
}

/// Containers are equal when they hold the same keys and every value is the
/// same allocation (or both are null).
impl PartialEq for StateContainer {
    fn eq(&self, other: &Self) -> bool {
        if self.shares_storage(other) {
            return true;
        }
        self.entries.len() == other.entries.len()
            && self.entries.iter().all(|(key, value)| {
                other
                    .entries
                    .get(key)
                    .is_some_and(|theirs| same_value(value, theirs))
            })
    }
}

impl fmt::Debug for StateContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (key, value) in self.entries.iter() {
            map.entry(&key.as_str(), &if value.is_some() { "<value>" } else { "<null>" });
        }
        map.finish()
    }
}

#[derive(Clone)]
enum Change {
    Put(StateValue),
    Remove,
}

/// Staged edits over a base container.
///
/// Owned by exactly one caller; [`commit`](Transaction::commit) consumes it.
pub struct Transaction {
    base: StateContainer,
    changes: HashMap<StateKey, Change>,
}

impl Transaction {
    /// Stage `value` for `T`. `None` deletes the key on commit.
    pub fn set<T: Send + Sync + 'static>(&mut self, value: Option<T>) -> &mut Self {
        let key = self.base.keys.key_of::<T>();
        self.set_by_key(key, value)
    }

    pub fn set_by_key<T: Send + Sync + 'static>(
        &mut self,
        key: impl Into<StateKey>,
        value: Option<T>,
    ) -> &mut Self {
        let change = match value {
            Some(value) => Change::Put(Some(Arc::new(value) as Arc<dyn Any + Send + Sync>)),
            None => Change::Remove,
        };
        self.changes.insert(key.into(), change);
        self
    }

    /// Stage a present-but-null value for `T`.
    pub fn set_null<T: 'static>(&mut self) -> &mut Self {
        let key = self.base.keys.key_of::<T>();
        self.changes.insert(key, Change::Put(None));
        self
    }

    /// Stage an already shared value under `key`.
    pub fn set_value(&mut self, key: impl Into<StateKey>, value: StateValue) -> &mut Self {
        self.changes.insert(key.into(), Change::Put(value));
        self
    }

    pub fn remove<T: 'static>(&mut self) -> &mut Self {
        let key = self.base.keys.key_of::<T>();
        self.changes.insert(key, Change::Remove);
        self
    }

    /// Overlay every entry of `other`. Merging the base into itself is a
    /// no-op.
    pub fn merge(&mut self, other: &StateContainer) -> &mut Self {
        if self.base.shares_storage(other) {
            debug!("skipping merge of a container into its own transaction");
            return self;
        }
        for (key, value) in other.entries.iter() {
            self.changes.insert(key.clone(), Change::Put(value.clone()));
        }
        self
    }

    /// Read `T`, seeing staged changes before the base container.
    pub fn get<T: Send + Sync + 'static>(&self) -> StateResult<Option<Arc<T>>> {
        let key = self.base.keys.key_of::<T>();
        self.get_by_key(key.as_str())
    }

    pub fn get_by_key<T: Send + Sync + 'static>(&self, key: &str) -> StateResult<Option<Arc<T>>> {
        match self.changes.get(key) {
            Some(Change::Put(value)) => downcast(key, value),
            Some(Change::Remove) => Err(StateError::KeyNotFound {
                key: key.to_string(),
            }),
            None => self.base.get_by_key(key),
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        match self.changes.get(key) {
            Some(Change::Put(_)) => true,
            Some(Change::Remove) => false,
            None => self.base.contains_key(key),
        }
    }

    pub fn contains<T: 'static>(&self) -> bool {
        let key = self.base.keys.key_of::<T>();
        self.contains_key(key.as_str())
    }

    /// Whether any change has been staged.
    pub fn is_dirty(&self) -> bool {
        !self.changes.is_empty()
    }

    pub fn base(&self) -> &StateContainer {
        &self.base
    }

    /// Produce the base container with staged changes overlaid.
    pub fn commit(self) -> StateContainer {
        if self.changes.is_empty() {
            return self.base;
        }

        let mut entries = (*self.base.entries).clone();
        for (key, change) in self.changes {
            match change {
                Change::Put(value) => {
                    entries.insert(key, value);
                }
                Change::Remove => {
                    entries.remove(&key);
                }
            }
        }

        StateContainer {
            entries: Arc::new(entries),
            keys: self.base.keys,
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("base", &self.base)
            .field("staged", &self.changes.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn downcast<T: Send + Sync + 'static>(key: &str, value: &StateValue) -> StateResult<Option<Arc<T>>> {
    match value {
        None => Ok(None),
        Some(value) => value
            .clone()
            .downcast::<T>()
            .map(Some)
            .map_err(|_| StateError::TypeMismatch {
                key: key.to_string(),
                expected: std::any::type_name::<T>(),
            }),
    }
}

fn same_value(a: &StateValue, b: &StateValue) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        _ => false,
    }
}
