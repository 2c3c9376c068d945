//! The per-action working record and the capabilities it carries.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use async_trait::async_trait;

use crate::action::{Action, State};

/// Publishes a committed state to subscribers.
pub trait StateEmitter<S>: Send + Sync {
    fn emit(&self, state: S);
}

/// Re-entry point for follow-up actions.
///
/// Inside a pipeline run this only enqueues: the active pump picks the action
/// up after everything already queued ahead of it.
#[async_trait]
pub trait Dispatcher<A>: Send + Sync {
    async fn dispatch(&self, action: A) -> Result<()>;
}

/// Created once per action per pipeline run and threaded through every
/// middleware.
pub struct DispatchContext<S, A> {
    action: A,
    original: S,
    proposed: Mutex<Option<S>>,
    emitter: Arc<dyn StateEmitter<S>>,
    dispatcher: Arc<dyn Dispatcher<A>>,
    sequence: u64,
}

impl<S: State, A: Action> DispatchContext<S, A> {
    pub fn new(
        action: A,
        original: S,
        emitter: Arc<dyn StateEmitter<S>>,
        dispatcher: Arc<dyn Dispatcher<A>>,
        sequence: u64,
    ) -> Self {
        Self {
            action,
            original,
            proposed: Mutex::new(None),
            emitter,
            dispatcher,
            sequence,
        }
    }

    pub fn action(&self) -> &A {
        &self.action
    }

    /// State committed before this run started.
    pub fn original_state(&self) -> &S {
        &self.original
    }

    /// State proposed by an earlier stage, if any.
    pub fn new_state(&self) -> Option<S> {
        self.proposed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_new_state(&self, state: S) {
        *self.proposed.lock().unwrap_or_else(PoisonError::into_inner) = Some(state);
    }

    /// Proposed state, falling back to the original.
    pub fn state(&self) -> S {
        self.new_state().unwrap_or_else(|| self.original.clone())
    }

    /// Whether the proposed state differs from the original.
    pub fn has_changed(&self) -> bool {
        self.new_state()
            .is_some_and(|proposed| proposed != self.original)
    }

    pub fn emitter(&self) -> &Arc<dyn StateEmitter<S>> {
        &self.emitter
    }

    pub fn dispatcher(&self) -> &Arc<dyn Dispatcher<A>> {
        &self.dispatcher
    }

    /// Position of this run in the store's processing order, starting at 1.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl<S: fmt::Debug, A: fmt::Debug> fmt::Debug for DispatchContext<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchContext")
            .field("sequence", &self.sequence)
            .field("action", &self.action)
            .field("original", &self.original)
            .field("proposed", &self.proposed)
            .finish_non_exhaustive()
    }
}
