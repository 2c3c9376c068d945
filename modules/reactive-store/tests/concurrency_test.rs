//! Many producers, one pump.

mod harness;

use futures::future::join_all;
use harness::{count, counter_store, Counter, Recorder};
use reactive_store::{effect_fn, DispatchContext, Store};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_increments_are_never_lost() {
    let store = counter_store();

    let tasks = (0..100).map(|_| {
        let store = store.clone();
        tokio::spawn(async move { store.dispatch(Counter::Increment).await })
    });
    for result in join_all(tasks).await {
        result.unwrap().unwrap();
    }

    assert_eq!(store.state(), 100);
    assert_eq!(store.pending(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_dispatch_with_follow_ups_converges() {
    let store = Store::builder(0)
        .with_reducer(count)
        .with_effect(effect_fn(|ctx: &DispatchContext<i64, Counter>| {
            matches!(ctx.action(), Counter::Increment).then_some(Counter::Echo)
        }))
        .build();

    let tasks = (0..100).map(|_| {
        let store = store.clone();
        tokio::spawn(async move { store.dispatch(Counter::Increment).await })
    });
    for result in join_all(tasks).await {
        result.unwrap().unwrap();
    }

    assert_eq!(store.state(), 200);
    assert_eq!(store.pending(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn notifications_arrive_in_application_order() {
    let store = counter_store();
    let seen = Recorder::new();
    let sink = seen.clone();
    let _sub = store.subscribe(move |s: &i64| sink.push(*s));

    let tasks = (0..50).map(|_| {
        let store = store.clone();
        tokio::spawn(async move { store.dispatch(Counter::Increment).await })
    });
    for result in join_all(tasks).await {
        result.unwrap().unwrap();
    }

    let expected: Vec<i64> = (0..=50).collect();
    assert_eq!(seen.values(), expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn transitions_never_overlap() {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use reactive_store::async_effect_fn;

    let busy = Arc::new(AtomicBool::new(false));
    let overlapped = Arc::new(AtomicBool::new(false));
    let (b, o) = (busy.clone(), overlapped.clone());

    let store = Store::builder(0)
        .with_reducer(count)
        .with_effect(async_effect_fn(move |_: Arc<DispatchContext<i64, Counter>>| {
            let (busy, overlapped) = (b.clone(), o.clone());
            async move {
                if busy.swap(true, Ordering::SeqCst) {
                    overlapped.store(true, Ordering::SeqCst);
                }
                tokio::task::yield_now().await;
                busy.store(false, Ordering::SeqCst);
                anyhow::Ok(None)
            }
        }))
        .build();

    let tasks = (0..64).map(|_| {
        let store = store.clone();
        tokio::spawn(async move { store.dispatch(Counter::Echo).await })
    });
    for result in join_all(tasks).await {
        result.unwrap().unwrap();
    }

    assert!(!overlapped.load(Ordering::SeqCst));
    assert_eq!(store.state(), 64);
}
