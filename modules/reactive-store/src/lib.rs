//! Unidirectional state store.
//!
//! Actions go in through [`Store::dispatch`], run through a composed
//! [`Pipeline`] of middleware (reducers, hooks, notification, effects) and
//! come out as a new state pushed to subscribers. Effects may dispatch
//! follow-up actions, which queue behind the current one instead of
//! recursing.
//!
//! Consumers define their domain by implementing [`Action`], writing
//! [`Reducer`]s (pure state updates) and optionally [`Effect`]s or
//! [`ReactiveEffect`]s (side effects that emit new actions).

pub mod action;
pub mod config;
pub mod context;
pub mod effect;
pub mod error;
pub mod hooks;
pub mod keyed;
pub mod middleware;
pub mod pipeline;
pub mod reducer;
pub mod store;
pub mod subject;

pub use action::{Action, State};
pub use config::{load_config, parse_config, StoreConfig};
pub use context::{DispatchContext, Dispatcher, StateEmitter};
pub use effect::{
    async_effect_fn, effect_fn, ActionStream, ContextStream, Effect, ReactiveEffect,
};
pub use error::StoreError;
pub use hooks::{after_fn, allow_if, AfterHook, BeforeHook};
pub use keyed::KeyedReducers;
pub use pipeline::{Middleware, Pipeline, PipelineBuilder, Transition, TransitionFuture};
pub use reducer::{lift, narrow, on_kind, set_state, Reducer, ReducerChain};
pub use store::{Store, StoreBuilder};
pub use subject::{StateSubject, Subscription};
