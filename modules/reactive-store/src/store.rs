//! The store and its dispatch loop.
//!
//! `dispatch` always enqueues first and then bumps a pending counter. The
//! caller that moves the counter off zero becomes the pump: it drains the
//! queue one action at a time until the counter falls back to zero. Every
//! other caller returns as soon as its action is queued, including effects
//! re-dispatching from inside a running pipeline, so a transition never
//! recurses into another one.
//!
//! An accepted action is always applied. A failing transition does not stop
//! the drain, and a pump that is cancelled or unwinds hands the rest of the
//! queue to a task on the current runtime.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use anyhow::Result;
use async_trait::async_trait;
use reactive_state::Lens;
use tokio::sync::watch;
use tracing::{debug, debug_span, error, warn, Instrument};

use crate::action::{Action, State};
use crate::config::StoreConfig;
use crate::context::{DispatchContext, Dispatcher, StateEmitter};
use crate::effect::{Effect, ReactiveEffect};
use crate::error::StoreError;
use crate::hooks::{AfterHook, BeforeHook};
use crate::pipeline::{Middleware, Pipeline, PipelineBuilder};
use crate::reducer::{Reducer, ReducerChain};
use crate::subject::{StateSubject, Subscription};

/// Holds one current state and serializes every transition applied to it.
///
/// Cheap to clone; clones share the same state, queue and subscribers.
pub struct Store<S, A> {
    inner: Arc<StoreInner<S, A>>,
}

impl<S, A> Clone for Store<S, A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct StoreInner<S, A> {
    name: Arc<str>,
    pipeline: Pipeline<S, A>,
    subject: Arc<StateSubject<S>>,
    queue: Mutex<VecDeque<A>>,
    pending: AtomicUsize,
    sequence: AtomicU64,
    queue_warn_depth: usize,
    handle: Arc<dyn Dispatcher<A>>,
}

/// Dispatcher that does not keep the store alive.
struct DispatchHandle<S, A> {
    inner: Weak<StoreInner<S, A>>,
}

#[async_trait]
impl<S: State, A: Action> Dispatcher<A> for DispatchHandle<S, A> {
    async fn dispatch(&self, action: A) -> Result<()> {
        let inner = self.inner.upgrade().ok_or(StoreError::Closed)?;
        inner.dispatch(action).await
    }
}

impl<S: State, A: Action> Store<S, A> {
    pub fn builder(initial: S) -> StoreBuilder<S, A> {
        StoreBuilder::new(initial)
    }

    /// Store running an already composed pipeline.
    pub fn with_pipeline(initial: S, pipeline: Pipeline<S, A>, config: &StoreConfig) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<StoreInner<S, A>>| StoreInner {
            name: config.name.as_str().into(),
            pipeline,
            subject: Arc::new(StateSubject::new(initial)),
            queue: Mutex::new(VecDeque::new()),
            pending: AtomicUsize::new(0),
            sequence: AtomicU64::new(0),
            queue_warn_depth: config.queue_warn_depth,
            handle: Arc::new(DispatchHandle {
                inner: weak.clone(),
            }),
        });
        Self { inner }
    }

    /// Submit `action`.
    ///
    /// If no other dispatch is in progress this call drains the queue,
    /// including any follow-up actions, and returns the first pipeline error.
    /// Otherwise it returns once the action is queued.
    pub async fn dispatch(&self, action: A) -> Result<()> {
        self.inner.dispatch(action).await
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> S {
        self.inner.subject.current()
    }

    /// Observe the current state and every later change.
    pub fn subscribe(&self, observer: impl Fn(&S) + Send + Sync + 'static) -> Subscription {
        self.inner.subject.subscribe(observer)
    }

    /// Observe one part of the state, notified only when that part changes.
    pub fn subscribe_part<P>(
        &self,
        lens: Lens<S, P>,
        observer: impl Fn(Option<&P>) + Send + Sync + 'static,
    ) -> Subscription
    where
        P: Clone + PartialEq + Send + Sync + 'static,
    {
        self.inner.subject.subscribe_part(lens, observer)
    }

    pub fn watch(&self) -> watch::Receiver<S> {
        self.inner.subject.watch()
    }

    /// Handle for dispatching without holding the store. Fails with
    /// [`StoreError::Closed`] once every `Store` clone is gone.
    pub fn dispatcher(&self) -> Arc<dyn Dispatcher<A>> {
        self.inner.handle.clone()
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Actions accepted but not yet fully processed.
    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::Acquire)
    }

    pub fn pipeline(&self) -> &Pipeline<S, A> {
        &self.inner.pipeline
    }
}

impl<S, A> fmt::Debug for Store<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.inner.name)
            .field("pending", &self.inner.pending.load(Ordering::Relaxed))
            .field("pipeline", &self.inner.pipeline)
            .finish()
    }
}

impl<S: State, A: Action> StoreInner<S, A> {
    async fn dispatch(self: &Arc<Self>, action: A) -> Result<()> {
        self.enqueue(action);
        if self.pending.fetch_add(1, Ordering::AcqRel) != 0 {
            return Ok(());
        }
        self.pump().await
    }

    /// Drain until the pending count falls back to zero. A failed run does
    /// not stop the drain; the first error is returned once the queue is
    /// empty.
    async fn pump(self: &Arc<Self>) -> Result<()> {
        let mut first_error = None;
        while let Some(action) = self.dequeue() {
            let slot = PumpSlot::claim(self);
            let result = self.process(action).await;
            let remaining = slot.release();

            if let Err(err) = result {
                if first_error.is_none() {
                    first_error = Some(err);
                } else {
                    warn!(store = %self.name, error = %err, "transition failed while draining");
                }
            }
            if remaining == 0 {
                break;
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn process(&self, action: A) -> Result<()> {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let span = debug_span!(
            "dispatch",
            store = %self.name,
            seq,
            kind = %action.kind()
        );

        let emitter: Arc<dyn StateEmitter<S>> = self.subject.clone();
        let ctx = Arc::new(DispatchContext::new(
            action,
            self.subject.current(),
            emitter,
            self.handle.clone(),
            seq,
        ));

        self.pipeline.run(ctx).instrument(span).await?;
        Ok(())
    }

    /// Returns the pending count left after this action.
    fn release_one(&self) -> usize {
        self.pending.fetch_sub(1, Ordering::AcqRel) - 1
    }

    /// Resume draining on a new task after the pump was cancelled or
    /// unwound with `remaining` actions still queued.
    fn resume(self: &Arc<Self>, remaining: usize) {
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let inner = self.clone();
                runtime.spawn(async move {
                    if let Err(err) = inner.pump().await {
                        error!(store = %inner.name, error = %err, "resumed dispatch failed");
                    }
                });
            }
            Err(_) => self.discard(remaining),
        }
    }

    /// Drop queued actions when no runtime is left to drain them, releasing
    /// the pump once the counter reaches zero.
    fn discard(&self, mut remaining: usize) {
        while remaining > 0 {
            let Some(action) = self.dequeue() else {
                break;
            };
            warn!(
                store = %self.name,
                kind = action.kind(),
                "discarding queued action, no runtime to resume dispatch"
            );
            remaining = self.release_one();
        }
    }

    fn enqueue(&self, action: A) {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        queue.push_back(action);
        let depth = queue.len();
        if self.queue_warn_depth > 0 && depth == self.queue_warn_depth {
            warn!(store = %self.name, depth, "dispatch queue is backing up");
        } else {
            debug!(store = %self.name, depth, "action queued");
        }
    }

    fn dequeue(&self) -> Option<A> {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }
}

/// The pending slot of the action the pump is processing.
///
/// Dropped without [`release`](PumpSlot::release) when the pumping future is
/// cancelled or a stage panics; the slot is then freed and any queued
/// actions are handed to a new pump.
struct PumpSlot<'a, S: State, A: Action> {
    inner: &'a Arc<StoreInner<S, A>>,
    held: bool,
}

impl<'a, S: State, A: Action> PumpSlot<'a, S, A> {
    fn claim(inner: &'a Arc<StoreInner<S, A>>) -> Self {
        Self { inner, held: true }
    }

    fn release(mut self) -> usize {
        self.held = false;
        self.inner.release_one()
    }
}

impl<S: State, A: Action> Drop for PumpSlot<'_, S, A> {
    fn drop(&mut self) {
        if !self.held {
            return;
        }
        let remaining = self.inner.release_one();
        warn!(
            store = %self.inner.name,
            remaining,
            "dispatch interrupted mid-transition"
        );
        if remaining > 0 {
            self.inner.resume(remaining);
        }
    }
}

/// Assembles a store with the usual stage order: tracing (when configured),
/// before-hooks, reducers, notification, effects, reactive effects,
/// after-hooks, then any custom middleware.
pub struct StoreBuilder<S, A> {
    initial: S,
    config: StoreConfig,
    reducers: ReducerChain<S, A>,
    before_hooks: Vec<Arc<dyn BeforeHook<S, A>>>,
    effects: Vec<Arc<dyn Effect<S, A>>>,
    reactive_effects: Vec<Arc<dyn ReactiveEffect<S, A>>>,
    after_hooks: Vec<Arc<dyn AfterHook<S, A>>>,
    middleware: Vec<Arc<dyn Middleware<S, A>>>,
}

impl<S: State, A: Action> StoreBuilder<S, A> {
    pub fn new(initial: S) -> Self {
        Self {
            initial,
            config: StoreConfig::default(),
            reducers: ReducerChain::new(),
            before_hooks: Vec::new(),
            effects: Vec::new(),
            reactive_effects: Vec::new(),
            after_hooks: Vec::new(),
            middleware: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn with_reducer(mut self, reducer: impl Reducer<S, A> + 'static) -> Self {
        self.reducers = self.reducers.with(reducer);
        self
    }

    pub fn with_before_hook(mut self, hook: impl BeforeHook<S, A> + 'static) -> Self {
        self.before_hooks.push(Arc::new(hook));
        self
    }

    pub fn with_effect(mut self, effect: impl Effect<S, A> + 'static) -> Self {
        self.effects.push(Arc::new(effect));
        self
    }

    pub fn with_reactive_effect(mut self, effect: impl ReactiveEffect<S, A> + 'static) -> Self {
        self.reactive_effects.push(Arc::new(effect));
        self
    }

    pub fn with_after_hook(mut self, hook: impl AfterHook<S, A> + 'static) -> Self {
        self.after_hooks.push(Arc::new(hook));
        self
    }

    pub fn with_middleware(mut self, middleware: impl Middleware<S, A> + 'static) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    pub fn build(self) -> Store<S, A> {
        let mut pipeline = PipelineBuilder::new();
        if self.config.trace_transitions {
            pipeline = pipeline.with_tracing(self.config.name.clone());
        }
        if !self.before_hooks.is_empty() {
            pipeline = pipeline.with_before_hooks(self.before_hooks);
        }
        pipeline = pipeline.with_reducers(self.reducers).with_notification();
        if !self.effects.is_empty() {
            pipeline = pipeline.with_effects(self.effects);
        }
        if !self.reactive_effects.is_empty() {
            pipeline = pipeline.with_reactive_effects(self.reactive_effects);
        }
        if !self.after_hooks.is_empty() {
            pipeline = pipeline.with_after_hooks(self.after_hooks);
        }
        for layer in self.middleware {
            pipeline = pipeline.with_layer("middleware", layer);
        }

        Store::with_pipeline(self.initial, pipeline.build(), &self.config)
    }
}
