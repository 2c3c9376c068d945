//! Guards that run before a transition and observers that run after it.

use anyhow::Result;
use async_trait::async_trait;

use crate::action::{Action, State};

/// Decides whether an action may proceed.
///
/// Sees the state committed before the run. Returning `false` is a veto, not
/// an error: the run yields the original state and nothing downstream runs.
#[async_trait]
pub trait BeforeHook<S, A>: Send + Sync {
    async fn allow(&self, state: &S, action: &A) -> Result<bool>;
}

/// Observes a finished transition. Cannot alter its result.
pub trait AfterHook<S, A>: Send + Sync {
    fn after(&self, original: &S, new_state: Option<&S>, action: &A);
}

struct AllowIf<F>(F);

#[async_trait]
impl<S, A, F> BeforeHook<S, A> for AllowIf<F>
where
    S: State,
    A: Action,
    F: Fn(&S, &A) -> bool + Send + Sync,
{
    async fn allow(&self, state: &S, action: &A) -> Result<bool> {
        Ok((self.0)(state, action))
    }
}

/// Synchronous before-hook from a predicate.
pub fn allow_if<S, A, F>(predicate: F) -> impl BeforeHook<S, A>
where
    S: State,
    A: Action,
    F: Fn(&S, &A) -> bool + Send + Sync,
{
    AllowIf(predicate)
}

struct AfterFn<F>(F);

impl<S, A, F> AfterHook<S, A> for AfterFn<F>
where
    S: State,
    A: Action,
    F: Fn(&S, Option<&S>, &A) + Send + Sync,
{
    fn after(&self, original: &S, new_state: Option<&S>, action: &A) {
        (self.0)(original, new_state, action)
    }
}

pub fn after_fn<S, A, F>(observer: F) -> impl AfterHook<S, A>
where
    S: State,
    A: Action,
    F: Fn(&S, Option<&S>, &A) + Send + Sync,
{
    AfterFn(observer)
}
