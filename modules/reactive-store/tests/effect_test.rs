//! Point-wise and reactive effects, including failure handling.

mod harness;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use futures::StreamExt;
use harness::{count, init_tracing, Counter, Recorder};
use reactive_store::{
    async_effect_fn, effect_fn, Action, ActionStream, ContextStream, DispatchContext, Store,
};

async fn fail_on_flag(ctx: Arc<DispatchContext<i64, Counter>>) -> Result<Option<Counter>> {
    tokio::task::yield_now().await;
    if matches!(ctx.action(), Counter::Fail) {
        return Err(anyhow!("effect failed after suspending"));
    }
    Ok(None)
}

// ---------------------------------------------------------------------------
// Failure
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failing_effect_surfaces_error_but_keeps_reduced_state() {
    init_tracing();
    let store = Store::builder(0)
        .with_reducer(count)
        .with_effect(async_effect_fn(fail_on_flag))
        .build();

    let seen = Recorder::new();
    let sink = seen.clone();
    let _sub = store.subscribe(move |s: &i64| sink.push(*s));

    let err = store.dispatch(Counter::Fail).await.unwrap_err();
    assert!(err.to_string().contains("effect failed"));
    assert_eq!(store.state(), 10);
    assert_eq!(seen.values(), vec![0, 10]);

    // The pump is released and the store keeps working.
    store.dispatch(Counter::Increment).await.unwrap();
    assert_eq!(store.state(), 11);
    assert_eq!(store.pending(), 0);
}

#[tokio::test]
async fn follow_ups_queued_by_sibling_effects_survive_failure() {
    let store = Store::builder(0)
        .with_reducer(count)
        .with_effect(effect_fn(|ctx: &DispatchContext<i64, Counter>| {
            matches!(ctx.action(), Counter::Fail).then_some(Counter::Increment)
        }))
        .with_effect(async_effect_fn(fail_on_flag))
        .build();

    assert!(store.dispatch(Counter::Fail).await.is_err());

    // The sibling's Increment was accepted before the failure, so it is applied.
    assert_eq!(store.state(), 11);
    assert_eq!(store.pending(), 0);

    store.dispatch(Counter::Echo).await.unwrap();
    assert_eq!(store.state(), 12);
}

#[tokio::test]
async fn effects_run_in_registration_order() {
    let order = Recorder::new();
    let first = order.clone();
    let second = order.clone();

    let store = Store::builder(0)
        .with_reducer(count)
        .with_effect(effect_fn(move |ctx: &DispatchContext<i64, Counter>| {
            first.push(format!("first:{}", ctx.action().kind()));
            None
        }))
        .with_effect(effect_fn(move |ctx: &DispatchContext<i64, Counter>| {
            second.push(format!("second:{}", ctx.action().kind()));
            matches!(ctx.action(), Counter::Increment).then_some(Counter::Echo)
        }))
        .build();

    store.dispatch(Counter::Increment).await.unwrap();

    assert_eq!(
        order.values(),
        vec![
            "first:counter:increment",
            "second:counter:increment",
            "first:counter:echo",
            "second:counter:echo"
        ]
    );
    assert_eq!(store.state(), 2);
}

// ---------------------------------------------------------------------------
// Reactive effects
// ---------------------------------------------------------------------------

fn undo_increments(contexts: ContextStream<i64, Counter>) -> ActionStream<Counter> {
    contexts
        .filter_map(|ctx| async move {
            matches!(ctx.action(), Counter::Increment).then_some(Counter::Decrement)
        })
        .boxed()
}

#[tokio::test]
async fn reactive_effect_converges_through_background_dispatch() {
    init_tracing();
    let store = Store::builder(0)
        .with_reducer(count)
        .with_reactive_effect(undo_increments)
        .build();

    let seen = Recorder::new();
    let sink = seen.clone();
    let _sub = store.subscribe(move |s: &i64| sink.push(*s));

    store.dispatch(Counter::Increment).await.unwrap();

    let mut rx = store.watch();
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| *s == 0))
        .await
        .expect("reactive effect should undo the increment")
        .unwrap();

    assert_eq!(seen.values(), vec![0, 1, 0]);
}

#[tokio::test]
async fn reactive_effect_sees_every_completed_transition() {
    let kinds = Recorder::new();
    let sink = kinds.clone();

    let store = Store::builder(0)
        .with_reducer(count)
        .with_reactive_effect(
            move |contexts: ContextStream<i64, Counter>| -> ActionStream<Counter> {
                let sink = sink.clone();
                contexts
                    .filter_map(move |ctx| {
                        sink.push(ctx.action().clone());
                        async { None }
                    })
                    .boxed()
            },
        )
        .build();

    store.dispatch(Counter::Increment).await.unwrap();
    store.dispatch(Counter::Noop).await.unwrap();
    store.dispatch(Counter::Decrement).await.unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while kinds.values().len() < 3 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert_eq!(
        kinds.values(),
        vec![Counter::Increment, Counter::Noop, Counter::Decrement]
    );
    assert_eq!(store.state(), 0);
}
