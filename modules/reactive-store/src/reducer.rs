//! Pure state transitions and the combinators that narrow and chain them.

use std::fmt;
use std::sync::Arc;

use reactive_state::{StateResult, StateTree, TreeValue};

use crate::action::{Action, State};

/// Pure, total state update. No I/O, no side effects.
///
/// Implemented for any `Fn(S, &A) -> S`, so plain closures and functions can
/// be registered directly.
pub trait Reducer<S, A>: Send + Sync {
    fn reduce(&self, state: S, action: &A) -> S;
}

impl<S, A, F> Reducer<S, A> for F
where
    F: Fn(S, &A) -> S + Send + Sync,
{
    fn reduce(&self, state: S, action: &A) -> S {
        self(state, action)
    }
}

/// Run `reducer` only for actions whose kind is `kind`.
pub fn on_kind<S, A, R>(kind: impl Into<String>, reducer: R) -> impl Reducer<S, A>
where
    S: State,
    A: Action,
    R: Reducer<S, A>,
{
    let kind = kind.into();
    move |state: S, action: &A| {
        if action.kind() == kind {
            reducer.reduce(state, action)
        } else {
            state
        }
    }
}

/// Run `reducer` on the payload `extract` pulls out of the action, leaving
/// the state untouched for actions it does not match.
pub fn narrow<S, A, P, E, F>(extract: E, reducer: F) -> impl Reducer<S, A>
where
    S: State,
    A: Action,
    P: ?Sized,
    E: for<'a> Fn(&'a A) -> Option<&'a P> + Send + Sync,
    F: Fn(S, &P) -> S + Send + Sync,
{
    move |state: S, action: &A| match extract(action) {
        Some(payload) => reducer(state, payload),
        None => state,
    }
}

/// Replace the whole state with the value `extract` finds in the action.
pub fn set_state<S, A, E>(extract: E) -> impl Reducer<S, A>
where
    S: State,
    A: Action,
    E: Fn(&A) -> Option<S> + Send + Sync,
{
    move |state: S, action: &A| extract(action).unwrap_or(state)
}

/// Lift a reducer over part `P` into one over the whole `W`.
///
/// The part is read through `tree` (absent parts start from
/// `P::default()`), reduced, and written back only when the reducer returned
/// something different from what it was given.
pub fn lift<W, P, A, R>(tree: &StateTree<W>, reducer: R) -> StateResult<impl Reducer<W, A>>
where
    W: TreeValue + PartialEq,
    P: TreeValue + PartialEq,
    A: Action,
    R: Reducer<P, A>,
{
    let lens = tree.lens::<P>()?;
    Ok(move |whole: W, action: &A| {
        let current = lens.get(Some(&whole)).unwrap_or_default();
        let next = reducer.reduce(current.clone(), action);
        if next == current {
            whole
        } else {
            lens.set(Some(&whole), next)
        }
    })
}

/// Reducers applied one after another in registration order.
pub struct ReducerChain<S, A> {
    reducers: Vec<Arc<dyn Reducer<S, A>>>,
}

impl<S: State, A: Action> ReducerChain<S, A> {
    pub fn new() -> Self {
        Self {
            reducers: Vec::new(),
        }
    }

    pub fn with(mut self, reducer: impl Reducer<S, A> + 'static) -> Self {
        self.reducers.push(Arc::new(reducer));
        self
    }

    pub fn on_kind(self, kind: impl Into<String>, reducer: impl Reducer<S, A> + 'static) -> Self {
        self.with(on_kind(kind.into(), reducer))
    }

    pub fn narrow<P, E, F>(self, extract: E, reducer: F) -> Self
    where
        P: ?Sized + 'static,
        E: for<'a> Fn(&'a A) -> Option<&'a P> + Send + Sync + 'static,
        F: Fn(S, &P) -> S + Send + Sync + 'static,
    {
        self.with(narrow(extract, reducer))
    }

    pub fn len(&self) -> usize {
        self.reducers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reducers.is_empty()
    }

    /// Fold `action` through every reducer, each seeing the previous output.
    pub fn apply(&self, state: S, action: &A) -> S {
        self.reducers
            .iter()
            .fold(state, |state, reducer| reducer.reduce(state, action))
    }
}

impl<S: State, A: Action> Default for ReducerChain<S, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: State, A: Action> Reducer<S, A> for ReducerChain<S, A> {
    fn reduce(&self, state: S, action: &A) -> S {
        self.apply(state, action)
    }
}

impl<S, A> fmt::Debug for ReducerChain<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReducerChain")
            .field("len", &self.reducers.len())
            .finish()
    }
}
