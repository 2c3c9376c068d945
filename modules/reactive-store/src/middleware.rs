//! Built-in pipeline stages.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tracing::{debug, info};

use crate::action::{Action, State};
use crate::context::DispatchContext;
use crate::hooks::{AfterHook, BeforeHook};
use crate::pipeline::{transition, Middleware, Transition, TransitionFuture};
use crate::reducer::Reducer;

/// Reduces the context's state and records the result as the proposed state.
pub struct ReducerStage<S, A> {
    reducer: Arc<dyn Reducer<S, A>>,
}

impl<S, A> ReducerStage<S, A> {
    pub fn new(reducer: Arc<dyn Reducer<S, A>>) -> Self {
        Self { reducer }
    }
}

impl<S: State, A: Action> Middleware<S, A> for ReducerStage<S, A> {
    fn wrap(&self, next: Transition<S, A>) -> Transition<S, A> {
        let reducer = self.reducer.clone();
        Arc::new(move |ctx: Arc<DispatchContext<S, A>>| -> TransitionFuture<S> {
            let state = reducer.reduce(ctx.state(), ctx.action());
            ctx.set_new_state(state);
            next(ctx)
        })
    }
}

/// Runs before-hooks in order; the first veto ends the run with the
/// original state.
pub struct BeforeHookStage<S, A> {
    hooks: Arc<[Arc<dyn BeforeHook<S, A>>]>,
}

impl<S, A> BeforeHookStage<S, A> {
    pub fn new(hooks: Vec<Arc<dyn BeforeHook<S, A>>>) -> Self {
        Self {
            hooks: hooks.into(),
        }
    }
}

impl<S: State, A: Action> Middleware<S, A> for BeforeHookStage<S, A> {
    fn wrap(&self, next: Transition<S, A>) -> Transition<S, A> {
        let hooks = self.hooks.clone();
        transition(move |ctx: Arc<DispatchContext<S, A>>| {
            run_before_hooks(hooks.clone(), next.clone(), ctx)
        })
    }
}

async fn run_before_hooks<S: State, A: Action>(
    hooks: Arc<[Arc<dyn BeforeHook<S, A>>]>,
    next: Transition<S, A>,
    ctx: Arc<DispatchContext<S, A>>,
) -> Result<S> {
    for hook in hooks.iter() {
        if !hook.allow(ctx.original_state(), ctx.action()).await? {
            debug!(
                seq = ctx.sequence(),
                kind = ctx.action().kind(),
                "transition vetoed"
            );
            return Ok(ctx.original_state().clone());
        }
    }
    next(ctx).await
}

/// Publishes the proposed state when it differs from the original.
pub struct NotificationStage;

impl<S: State, A: Action> Middleware<S, A> for NotificationStage {
    fn wrap(&self, next: Transition<S, A>) -> Transition<S, A> {
        Arc::new(move |ctx: Arc<DispatchContext<S, A>>| -> TransitionFuture<S> {
            if let Some(state) = ctx.new_state() {
                if state != *ctx.original_state() {
                    debug!(seq = ctx.sequence(), kind = ctx.action().kind(), "state changed");
                    ctx.emitter().emit(state);
                }
            }
            next(ctx)
        })
    }
}

/// Runs after-hooks once everything downstream has completed.
pub struct AfterHookStage<S, A> {
    hooks: Arc<[Arc<dyn AfterHook<S, A>>]>,
}

impl<S, A> AfterHookStage<S, A> {
    pub fn new(hooks: Vec<Arc<dyn AfterHook<S, A>>>) -> Self {
        Self {
            hooks: hooks.into(),
        }
    }
}

impl<S: State, A: Action> Middleware<S, A> for AfterHookStage<S, A> {
    fn wrap(&self, next: Transition<S, A>) -> Transition<S, A> {
        let hooks = self.hooks.clone();
        transition(move |ctx: Arc<DispatchContext<S, A>>| {
            run_after_hooks(hooks.clone(), next.clone(), ctx)
        })
    }
}

async fn run_after_hooks<S: State, A: Action>(
    hooks: Arc<[Arc<dyn AfterHook<S, A>>]>,
    next: Transition<S, A>,
    ctx: Arc<DispatchContext<S, A>>,
) -> Result<S> {
    let result = next(ctx.clone()).await?;
    let proposed = ctx.new_state();
    for hook in hooks.iter() {
        hook.after(ctx.original_state(), proposed.as_ref(), ctx.action());
    }
    Ok(result)
}

/// Hands each context to an observer, then continues.
pub struct TapStage<S, A> {
    tap: Arc<dyn Fn(&DispatchContext<S, A>) + Send + Sync>,
}

impl<S, A> TapStage<S, A> {
    pub fn new(tap: impl Fn(&DispatchContext<S, A>) + Send + Sync + 'static) -> Self {
        Self { tap: Arc::new(tap) }
    }
}

impl<S: State, A: Action> Middleware<S, A> for TapStage<S, A> {
    fn wrap(&self, next: Transition<S, A>) -> Transition<S, A> {
        let tap = self.tap.clone();
        Arc::new(move |ctx: Arc<DispatchContext<S, A>>| -> TransitionFuture<S> {
            tap(&*ctx);
            next(ctx)
        })
    }
}

/// Logs one record per transition: sequence, action kind, whether the state
/// changed and how long the downstream chain took.
pub struct TracingStage {
    store: Arc<str>,
}

impl TracingStage {
    pub fn new(store: impl Into<String>) -> Self {
        Self {
            store: store.into().into(),
        }
    }
}

impl<S: State, A: Action> Middleware<S, A> for TracingStage {
    fn wrap(&self, next: Transition<S, A>) -> Transition<S, A> {
        let store = self.store.clone();
        transition(move |ctx: Arc<DispatchContext<S, A>>| {
            traced(store.clone(), next.clone(), ctx)
        })
    }
}

async fn traced<S: State, A: Action>(
    store: Arc<str>,
    next: Transition<S, A>,
    ctx: Arc<DispatchContext<S, A>>,
) -> Result<S> {
    let started = Instant::now();
    let result = next(ctx.clone()).await;
    info!(
        store = %store,
        seq = ctx.sequence(),
        kind = ctx.action().kind(),
        changed = ctx.has_changed(),
        ok = result.is_ok(),
        elapsed_us = started.elapsed().as_micros() as u64,
        "transition"
    );
    result
}
