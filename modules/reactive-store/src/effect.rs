//! Effects: turning a completed transition into follow-up actions.
//!
//! Point-wise [`Effect`]s see one context at a time and may return one
//! action, which is dispatched before the next effect runs. A
//! [`ReactiveEffect`] instead receives the live stream of every completed
//! context and returns a stream of actions; a background task re-dispatches
//! whatever it emits.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use async_trait::async_trait;
use futures::channel::mpsc::{self, UnboundedSender};
use futures::stream::{self, BoxStream, StreamExt};
use tracing::{debug, error};

use crate::action::{Action, State};
use crate::context::{DispatchContext, Dispatcher};
use crate::error::StoreError;
use crate::pipeline::{transition, Middleware, Transition};

/// Reacts to one completed transition.
#[async_trait]
pub trait Effect<S, A>: Send + Sync {
    async fn run(&self, ctx: Arc<DispatchContext<S, A>>) -> Result<Option<A>>;
}

struct EffectFn<F>(F);

#[async_trait]
impl<S, A, F> Effect<S, A> for EffectFn<F>
where
    S: State,
    A: Action,
    F: Fn(&DispatchContext<S, A>) -> Option<A> + Send + Sync,
{
    async fn run(&self, ctx: Arc<DispatchContext<S, A>>) -> Result<Option<A>> {
        Ok((self.0)(&*ctx))
    }
}

/// Synchronous effect from a closure.
pub fn effect_fn<S, A, F>(f: F) -> impl Effect<S, A>
where
    S: State,
    A: Action,
    F: Fn(&DispatchContext<S, A>) -> Option<A> + Send + Sync,
{
    EffectFn(f)
}

struct AsyncEffectFn<F>(F);

#[async_trait]
impl<S, A, F, Fut> Effect<S, A> for AsyncEffectFn<F>
where
    S: State,
    A: Action,
    F: Fn(Arc<DispatchContext<S, A>>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<A>>> + Send,
{
    async fn run(&self, ctx: Arc<DispatchContext<S, A>>) -> Result<Option<A>> {
        (self.0)(ctx).await
    }
}

/// Asynchronous, fallible effect from a closure.
pub fn async_effect_fn<S, A, F, Fut>(f: F) -> impl Effect<S, A>
where
    S: State,
    A: Action,
    F: Fn(Arc<DispatchContext<S, A>>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<A>>> + Send,
{
    AsyncEffectFn(f)
}

/// Runs effects in registration order once the downstream chain succeeded.
///
/// Each follow-up is handed to the context's dispatcher before the next
/// effect runs. The first error ends the stage; follow-ups already
/// dispatched stay queued.
pub struct EffectStage<S, A> {
    effects: Arc<[Arc<dyn Effect<S, A>>]>,
}

impl<S, A> EffectStage<S, A> {
    pub fn new(effects: Vec<Arc<dyn Effect<S, A>>>) -> Self {
        Self {
            effects: effects.into(),
        }
    }
}

impl<S: State, A: Action> Middleware<S, A> for EffectStage<S, A> {
    fn wrap(&self, next: Transition<S, A>) -> Transition<S, A> {
        let effects = self.effects.clone();
        transition(move |ctx: Arc<DispatchContext<S, A>>| {
            run_effects(effects.clone(), next.clone(), ctx)
        })
    }
}

async fn run_effects<S: State, A: Action>(
    effects: Arc<[Arc<dyn Effect<S, A>>]>,
    next: Transition<S, A>,
    ctx: Arc<DispatchContext<S, A>>,
) -> Result<S> {
    let result = next(ctx.clone()).await?;
    for effect in effects.iter() {
        if let Some(follow_up) = effect.run(ctx.clone()).await? {
            debug!(
                seq = ctx.sequence(),
                kind = follow_up.kind(),
                "effect dispatching follow-up"
            );
            ctx.dispatcher().dispatch(follow_up).await?;
        }
    }
    Ok(result)
}

/// Live stream of completed contexts handed to a reactive effect.
pub type ContextStream<S, A> = BoxStream<'static, Arc<DispatchContext<S, A>>>;

/// Actions a reactive effect wants dispatched.
pub type ActionStream<A> = BoxStream<'static, A>;

/// Maps the stream of completed contexts to a stream of follow-up actions.
///
/// Implemented for any `Fn(ContextStream) -> ActionStream`. Called once,
/// when the first transition completes.
pub trait ReactiveEffect<S, A>: Send + Sync {
    fn connect(&self, contexts: ContextStream<S, A>) -> ActionStream<A>;
}

impl<S, A, F> ReactiveEffect<S, A> for F
where
    F: Fn(ContextStream<S, A>) -> ActionStream<A> + Send + Sync,
{
    fn connect(&self, contexts: ContextStream<S, A>) -> ActionStream<A> {
        self(contexts)
    }
}

type ContextSender<S, A> = UnboundedSender<Arc<DispatchContext<S, A>>>;

/// Feeds completed contexts to reactive effects and re-dispatches their
/// output from a task on the current tokio runtime.
pub struct ReactiveEffectStage<S, A> {
    wiring: Arc<Wiring<S, A>>,
}

struct Wiring<S, A> {
    effects: Vec<Arc<dyn ReactiveEffect<S, A>>>,
    senders: Mutex<Option<Vec<ContextSender<S, A>>>>,
}

impl<S, A> ReactiveEffectStage<S, A> {
    pub fn new(effects: Vec<Arc<dyn ReactiveEffect<S, A>>>) -> Self {
        Self {
            wiring: Arc::new(Wiring {
                effects,
                senders: Mutex::new(None),
            }),
        }
    }
}

impl<S: State, A: Action> Wiring<S, A> {
    /// Senders for every effect, connecting them on first use.
    fn senders(
        &self,
        dispatcher: &Arc<dyn Dispatcher<A>>,
    ) -> Result<Vec<ContextSender<S, A>>> {
        let mut guard = self.senders.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(senders) = guard.as_ref() {
            return Ok(senders.clone());
        }

        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| StoreError::NoRuntime)?;

        let mut senders = Vec::with_capacity(self.effects.len());
        let mut outputs = Vec::with_capacity(self.effects.len());
        for effect in &self.effects {
            let (tx, rx) = mpsc::unbounded();
            senders.push(tx);
            outputs.push(effect.connect(rx.boxed()));
        }

        let actions = stream::select_all(outputs);
        runtime.spawn(drive(actions, dispatcher.clone()));
        debug!(effects = senders.len(), "reactive effects connected");

        *guard = Some(senders.clone());
        Ok(senders)
    }
}

async fn drive<A: Action>(
    mut actions: stream::SelectAll<ActionStream<A>>,
    dispatcher: Arc<dyn Dispatcher<A>>,
) {
    while let Some(action) = actions.next().await {
        let kind = action.kind().to_string();
        if let Err(err) = dispatcher.dispatch(action).await {
            if matches!(err.downcast_ref::<StoreError>(), Some(StoreError::Closed)) {
                debug!("store closed, stopping reactive effects");
                break;
            }
            error!(kind = %kind, error = %err, "reactive effect follow-up failed");
        }
    }
}

impl<S: State, A: Action> Middleware<S, A> for ReactiveEffectStage<S, A> {
    fn wrap(&self, next: Transition<S, A>) -> Transition<S, A> {
        let wiring = self.wiring.clone();
        transition(move |ctx: Arc<DispatchContext<S, A>>| {
            publish_completed(wiring.clone(), next.clone(), ctx)
        })
    }
}

async fn publish_completed<S: State, A: Action>(
    wiring: Arc<Wiring<S, A>>,
    next: Transition<S, A>,
    ctx: Arc<DispatchContext<S, A>>,
) -> Result<S> {
    let result = next(ctx.clone()).await?;
    for sender in wiring.senders(ctx.dispatcher())? {
        // A closed receiver means that effect's stream has ended.
        let _ = sender.unbounded_send(ctx.clone());
    }
    Ok(result)
}
