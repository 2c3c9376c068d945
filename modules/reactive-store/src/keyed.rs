//! Per-sub-state reducers over a [`StateContainer`].

use std::fmt;
use std::sync::Arc;

use reactive_state::{StateContainer, StateError, Transaction};
use tracing::warn;

use crate::action::Action;
use crate::reducer::Reducer;

type KeyedStep<A> = Arc<dyn Fn(&mut Transaction, &A) + Send + Sync>;

/// Reducers addressed by sub-state type.
///
/// Every run opens one transaction, lets each registered reducer stage its
/// sub-state, and commits once. A run where nothing changed returns a
/// container equal to its input.
pub struct KeyedReducers<A> {
    steps: Vec<KeyedStep<A>>,
}

impl<A: Action> KeyedReducers<A> {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Register a reducer for sub-state `P`.
    ///
    /// `reducer` sees the current value (`None` when missing or null) and
    /// returns `Some(next)` to replace it, or `None` to leave it alone.
    pub fn on<P, F>(mut self, reducer: F) -> Self
    where
        P: PartialEq + Send + Sync + 'static,
        F: Fn(Option<&P>, &A) -> Option<P> + Send + Sync + 'static,
    {
        self.steps.push(Arc::new(move |tx: &mut Transaction, action: &A| {
            let current = match tx.get::<P>() {
                Ok(value) => value,
                Err(StateError::KeyNotFound { .. }) => None,
                Err(err) => {
                    warn!(error = %err, "treating unreadable sub-state as absent");
                    None
                }
            };

            if let Some(next) = reducer(current.as_deref(), action) {
                if current.as_deref() != Some(&next) {
                    tx.set(Some(next));
                }
            }
        }));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl<A: Action> Default for KeyedReducers<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Action> Reducer<StateContainer, A> for KeyedReducers<A> {
    fn reduce(&self, state: StateContainer, action: &A) -> StateContainer {
        let mut tx = state.begin_transaction();
        for step in &self.steps {
            step(&mut tx, action);
        }
        tx.commit()
    }
}

impl<A> fmt::Debug for KeyedReducers<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedReducers")
            .field("len", &self.steps.len())
            .finish()
    }
}
