//! Middleware composition.
//!
//! A [`Transition`] turns a dispatch context into the resulting state. A
//! [`Middleware`] wraps the next transition in the chain and may act before
//! it, after it, or instead of it. [`PipelineBuilder`] composes registered
//! middleware back to front around a terminal transition, so the first one
//! registered runs outermost.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use futures::future::BoxFuture;

use crate::action::{Action, State};
use crate::context::DispatchContext;
use crate::effect::{Effect, EffectStage, ReactiveEffect, ReactiveEffectStage};
use crate::hooks::{AfterHook, BeforeHook};
use crate::middleware::{
    AfterHookStage, BeforeHookStage, NotificationStage, ReducerStage, TapStage, TracingStage,
};
use crate::reducer::Reducer;

pub type TransitionFuture<S> = BoxFuture<'static, Result<S>>;

/// One step of the composed pipeline.
pub type Transition<S, A> =
    Arc<dyn Fn(Arc<DispatchContext<S, A>>) -> TransitionFuture<S> + Send + Sync>;

/// Wraps the next transition into a new one.
///
/// Implemented for any `Fn(Transition) -> Transition`.
pub trait Middleware<S, A>: Send + Sync {
    fn wrap(&self, next: Transition<S, A>) -> Transition<S, A>;
}

impl<S, A, F> Middleware<S, A> for F
where
    F: Fn(Transition<S, A>) -> Transition<S, A> + Send + Sync,
{
    fn wrap(&self, next: Transition<S, A>) -> Transition<S, A> {
        self(next)
    }
}

/// Build a [`Transition`] from an async closure.
pub fn transition<S, A, F, Fut>(f: F) -> Transition<S, A>
where
    S: State,
    A: Action,
    F: Fn(Arc<DispatchContext<S, A>>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<S>> + Send + 'static,
{
    Arc::new(move |ctx: Arc<DispatchContext<S, A>>| -> TransitionFuture<S> {
        Box::pin(f(ctx))
    })
}

/// End of every chain: the proposed state if one was set, else the original.
pub fn terminal<S: State, A: Action>() -> Transition<S, A> {
    transition(|ctx: Arc<DispatchContext<S, A>>| async move {
        Ok::<_, anyhow::Error>(ctx.state())
    })
}

/// The composed chain, ready to run.
pub struct Pipeline<S, A> {
    transition: Transition<S, A>,
    stages: Vec<&'static str>,
}

impl<S: State, A: Action> Pipeline<S, A> {
    pub fn builder() -> PipelineBuilder<S, A> {
        PipelineBuilder::new()
    }

    /// Run `ctx` through every stage.
    pub fn run(&self, ctx: Arc<DispatchContext<S, A>>) -> TransitionFuture<S> {
        (self.transition)(ctx)
    }

    /// Stage names, outermost first.
    pub fn stages(&self) -> &[&'static str] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl<S, A> fmt::Debug for Pipeline<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stages)
            .finish()
    }
}

/// Collects middleware in registration order.
pub struct PipelineBuilder<S, A> {
    layers: Vec<(&'static str, Arc<dyn Middleware<S, A>>)>,
}

impl<S: State, A: Action> PipelineBuilder<S, A> {
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    pub fn with_middleware(self, middleware: impl Middleware<S, A> + 'static) -> Self {
        self.with_layer("middleware", Arc::new(middleware))
    }

    pub fn with_reducers(self, reducer: impl Reducer<S, A> + 'static) -> Self {
        self.with_layer("reducers", Arc::new(ReducerStage::new(Arc::new(reducer))))
    }

    pub fn with_before_hooks(self, hooks: Vec<Arc<dyn BeforeHook<S, A>>>) -> Self {
        self.with_layer("before_hooks", Arc::new(BeforeHookStage::new(hooks)))
    }

    pub fn with_notification(self) -> Self {
        self.with_layer("notification", Arc::new(NotificationStage))
    }

    pub fn with_effects(self, effects: Vec<Arc<dyn Effect<S, A>>>) -> Self {
        self.with_layer("effects", Arc::new(EffectStage::new(effects)))
    }

    pub fn with_reactive_effects(self, effects: Vec<Arc<dyn ReactiveEffect<S, A>>>) -> Self {
        self.with_layer("reactive_effects", Arc::new(ReactiveEffectStage::new(effects)))
    }

    pub fn with_after_hooks(self, hooks: Vec<Arc<dyn AfterHook<S, A>>>) -> Self {
        self.with_layer("after_hooks", Arc::new(AfterHookStage::new(hooks)))
    }

    /// Observe each context on the way in.
    pub fn with_tap<F>(self, tap: F) -> Self
    where
        F: Fn(&DispatchContext<S, A>) + Send + Sync + 'static,
    {
        self.with_layer("tap", Arc::new(TapStage::new(tap)))
    }

    /// Log one record per transition under `store`.
    pub fn with_tracing(self, store: impl Into<String>) -> Self {
        self.with_layer("tracing", Arc::new(TracingStage::new(store)))
    }

    pub fn build(self) -> Pipeline<S, A> {
        let mut next = terminal();
        for (_, layer) in self.layers.iter().rev() {
            next = layer.wrap(next);
        }

        Pipeline {
            transition: next,
            stages: self.layers.into_iter().map(|(name, _)| name).collect(),
        }
    }

    pub(crate) fn with_layer(
        mut self,
        name: &'static str,
        layer: Arc<dyn Middleware<S, A>>,
    ) -> Self {
        self.layers.push((name, layer));
        self
    }
}

impl<S: State, A: Action> Default for PipelineBuilder<S, A> {
    fn default() -> Self {
        Self::new()
    }
}
