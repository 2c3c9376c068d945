//! Accepted actions survive failing, cancelled and panicking transitions.

mod harness;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use harness::{count, init_tracing, Counter};
use reactive_store::{async_effect_fn, DispatchContext, Store};
use tokio::sync::Notify;

async fn wait_for_state(store: &Store<i64, Counter>, expected: i64) {
    let mut rx = store.watch();
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| *s == expected))
        .await
        .expect("state should converge")
        .unwrap();
}

/// Store whose `Fail` effect never completes.
fn stalling_store() -> Store<i64, Counter> {
    Store::builder(0)
        .with_reducer(count)
        .with_effect(async_effect_fn(
            |ctx: Arc<DispatchContext<i64, Counter>>| async move {
                if matches!(ctx.action(), Counter::Fail) {
                    futures::future::pending::<()>().await;
                }
                Ok::<_, anyhow::Error>(None)
            },
        ))
        .build()
}

// ---------------------------------------------------------------------------
// Failure
// ---------------------------------------------------------------------------

#[tokio::test]
async fn action_from_another_producer_survives_a_failed_transition() {
    init_tracing();
    let gate = Arc::new(Notify::new());
    let effect_gate = gate.clone();

    let store = Store::builder(0)
        .with_reducer(count)
        .with_effect(async_effect_fn(
            move |ctx: Arc<DispatchContext<i64, Counter>>| {
                let gate = effect_gate.clone();
                async move {
                    if matches!(ctx.action(), Counter::Fail) {
                        gate.notified().await;
                        return Err(anyhow!("fail effect released"));
                    }
                    Ok::<_, anyhow::Error>(None)
                }
            },
        ))
        .build();

    let pumping = tokio::spawn({
        let store = store.clone();
        async move { store.dispatch(Counter::Fail).await }
    });

    // The pump is parked inside the Fail effect; this call only enqueues.
    wait_for_state(&store, 10).await;
    store.dispatch(Counter::Increment).await.unwrap();
    assert_eq!(store.state(), 10);

    gate.notify_one();
    let result: Result<()> = pumping.await.unwrap();
    assert!(result.is_err());

    assert_eq!(store.state(), 11);
    assert_eq!(store.pending(), 0);
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancelled_pump_releases_the_store() {
    let store = stalling_store();

    let timed_out = tokio::time::timeout(
        Duration::from_millis(20),
        store.dispatch(Counter::Fail),
    )
    .await
    .is_err();
    assert!(timed_out);
    assert_eq!(store.pending(), 0);

    for _ in 0..3 {
        store.dispatch(Counter::Increment).await.unwrap();
    }

    assert_eq!(store.state(), 13);
    assert_eq!(store.pending(), 0);
}

#[tokio::test]
async fn cancelled_pump_hands_queued_actions_to_a_new_pump() {
    init_tracing();
    let store = stalling_store();

    let (cancelled, queued) = tokio::join!(
        tokio::time::timeout(Duration::from_millis(50), store.dispatch(Counter::Fail)),
        async {
            wait_for_state(&store, 10).await;
            store.dispatch(Counter::Increment).await
        }
    );

    assert!(cancelled.is_err());
    queued.unwrap();

    wait_for_state(&store, 11).await;
    assert_eq!(store.pending(), 0);
}

// ---------------------------------------------------------------------------
// Panics
// ---------------------------------------------------------------------------

#[tokio::test]
async fn panicking_reducer_does_not_wedge_the_store() {
    let store = Store::builder(0)
        .with_reducer(|state: i64, action: &Counter| {
            if matches!(action, Counter::Fail) {
                panic!("reducer rejected the action");
            }
            count(state, action)
        })
        .build();

    let crashed = tokio::spawn({
        let store = store.clone();
        async move { store.dispatch(Counter::Fail).await }
    })
    .await;
    assert!(crashed.unwrap_err().is_panic());
    assert_eq!(store.pending(), 0);

    store.dispatch(Counter::Increment).await.unwrap();

    assert_eq!(store.state(), 1);
    assert_eq!(store.pending(), 0);
}
