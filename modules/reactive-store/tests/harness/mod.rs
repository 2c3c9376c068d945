//! Shared fixtures: a counter domain and a value recorder.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use reactive_store::{Action, Store};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq)]
pub enum Counter {
    Increment,
    Decrement,
    /// Increments without triggering the increment effect.
    Echo,
    Noop,
    /// Adds ten; effects treat it as a failure trigger.
    Fail,
}

impl Action for Counter {
    fn kind(&self) -> &str {
        match self {
            Counter::Increment => "counter:increment",
            Counter::Decrement => "counter:decrement",
            Counter::Echo => "counter:echo",
            Counter::Noop => "counter:noop",
            Counter::Fail => "counter:fail",
        }
    }
}

pub fn count(state: i64, action: &Counter) -> i64 {
    match action {
        Counter::Increment | Counter::Echo => state + 1,
        Counter::Decrement => state - 1,
        Counter::Fail => state + 10,
        Counter::Noop => state,
    }
}

/// Counter store with no effects or hooks.
pub fn counter_store() -> Store<i64, Counter> {
    Store::builder(0)
        .with_name("counter")
        .with_reducer(count)
        .build()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Collects every value handed to it.
#[derive(Clone)]
pub struct Recorder<T> {
    seen: Arc<Mutex<Vec<T>>>,
}

impl<T: Clone + Send + 'static> Recorder<T> {
    pub fn new() -> Self {
        Self {
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn push(&self, value: T) {
        self.seen.lock().unwrap().push(value);
    }

    pub fn values(&self) -> Vec<T> {
        self.seen.lock().unwrap().clone()
    }
}
