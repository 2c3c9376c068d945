//! Holds the current state and fans it out to observers.
//!
//! Every distinct emitted value gets a version. Each observer remembers the
//! highest version it has been shown, so a replay racing a newer emission
//! can never deliver an older value after a newer one.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use reactive_state::Lens;
use tokio::sync::watch;

use crate::action::State;
use crate::context::StateEmitter;

type Observer<S> = Arc<dyn Fn(&S) + Send + Sync>;

struct Slot<S> {
    id: u64,
    seen: Arc<AtomicU64>,
    observer: Observer<S>,
}

impl<S> Clone for Slot<S> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            seen: self.seen.clone(),
            observer: self.observer.clone(),
        }
    }
}

struct Observers<S> {
    next_id: u64,
    version: u64,
    slots: Vec<Slot<S>>,
}

/// Current-value cell with replaying subscriptions.
pub struct StateSubject<S> {
    cell: watch::Sender<S>,
    observers: Mutex<Observers<S>>,
}

impl<S: State> StateSubject<S> {
    pub fn new(initial: S) -> Self {
        let (cell, _) = watch::channel(initial);
        Self {
            cell,
            observers: Mutex::new(Observers {
                next_id: 0,
                version: 1,
                slots: Vec::new(),
            }),
        }
    }

    /// Snapshot of the latest value.
    pub fn current(&self) -> S {
        self.cell.borrow().clone()
    }

    /// Receiver that always sees the latest value. Intermediate values may be
    /// skipped if the receiver falls behind.
    pub fn watch(&self) -> watch::Receiver<S> {
        self.cell.subscribe()
    }

    /// Replace the current value and notify observers. Equal values are
    /// ignored.
    pub fn emit(&self, state: S) {
        let (version, slots) = {
            let mut observers = self.lock();
            let changed = self.cell.send_if_modified(|current| {
                if *current == state {
                    false
                } else {
                    *current = state.clone();
                    true
                }
            });
            if !changed {
                return;
            }
            observers.version += 1;
            (observers.version, observers.slots.clone())
        };

        for slot in slots {
            deliver(&slot, version, &state);
        }
    }

    /// Register `observer`. It is called with the current value right away,
    /// then with every later distinct value until the subscription is
    /// dropped.
    pub fn subscribe(
        self: &Arc<Self>,
        observer: impl Fn(&S) + Send + Sync + 'static,
    ) -> Subscription {
        let (slot, version, current) = {
            let mut observers = self.lock();
            observers.next_id += 1;
            let slot = Slot {
                id: observers.next_id,
                seen: Arc::new(AtomicU64::new(0)),
                observer: Arc::new(observer),
            };
            observers.slots.push(slot.clone());
            (slot, observers.version, self.current())
        };

        deliver(&slot, version, &current);

        let subject: Arc<dyn Detach> = self.clone();
        Subscription {
            subject: Arc::downgrade(&subject),
            id: slot.id,
            active: true,
        }
    }

    /// Observe part `P` through `lens`, called only when the part changes.
    /// `None` means the part is absent from the current state.
    pub fn subscribe_part<P>(
        self: &Arc<Self>,
        lens: Lens<S, P>,
        observer: impl Fn(Option<&P>) + Send + Sync + 'static,
    ) -> Subscription
    where
        P: Clone + PartialEq + Send + Sync + 'static,
    {
        let last: Mutex<Option<Option<P>>> = Mutex::new(None);
        self.subscribe(move |state: &S| {
            let part = lens.get(Some(state));
            {
                let mut last = last.lock().unwrap_or_else(PoisonError::into_inner);
                if last.as_ref() == Some(&part) {
                    return;
                }
                *last = Some(part.clone());
            }
            observer(part.as_ref());
        })
    }

    pub fn observer_count(&self) -> usize {
        self.lock().slots.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Observers<S>> {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S: State> StateEmitter<S> for StateSubject<S> {
    fn emit(&self, state: S) {
        StateSubject::emit(self, state)
    }
}

impl<S: State + fmt::Debug> fmt::Debug for StateSubject<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateSubject")
            .field("current", &*self.cell.borrow())
            .field("observers", &self.observer_count())
            .finish()
    }
}

fn deliver<S>(slot: &Slot<S>, version: u64, state: &S) {
    if slot.seen.fetch_max(version, Ordering::AcqRel) < version {
        (slot.observer)(state);
    }
}

trait Detach: Send + Sync {
    fn detach(&self, id: u64);
}

impl<S: State> Detach for StateSubject<S> {
    fn detach(&self, id: u64) {
        self.lock().slots.retain(|slot| slot.id != id);
    }
}

/// Keeps an observer attached. Dropping it detaches the observer.
pub struct Subscription {
    subject: Weak<dyn Detach>,
    id: u64,
    active: bool,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if !std::mem::take(&mut self.active) {
            return;
        }
        if let Some(subject) = self.subject.upgrade() {
            subject.detach(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<i32>>>, impl Fn(&i32) + Send + Sync + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |v: &i32| sink.lock().unwrap().push(*v))
    }

    #[test]
    fn subscribe_replays_then_skips_equal_values() {
        let subject = Arc::new(StateSubject::new(1));
        let (seen, observer) = recorder();
        let _sub = subject.subscribe(observer);

        subject.emit(1);
        subject.emit(2);
        subject.emit(2);
        subject.emit(3);

        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(subject.current(), 3);
    }

    #[test]
    fn dropping_subscription_detaches() {
        let subject = Arc::new(StateSubject::new(0));
        let (seen, observer) = recorder();
        let sub = subject.subscribe(observer);
        assert_eq!(subject.observer_count(), 1);

        drop(sub);
        subject.emit(5);

        assert_eq!(subject.observer_count(), 0);
        assert_eq!(*seen.lock().unwrap(), vec![0]);
    }

    #[test]
    fn stale_delivery_is_dropped() {
        let calls = Arc::new(AtomicU64::new(0));
        let counted = calls.clone();
        let slot: Slot<i32> = Slot {
            id: 1,
            seen: Arc::new(AtomicU64::new(0)),
            observer: Arc::new(move |_: &i32| {
                counted.fetch_add(1, Ordering::SeqCst);
            }),
        };

        deliver(&slot, 3, &30);
        deliver(&slot, 2, &20);
        deliver(&slot, 3, &30);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn subscription_outliving_subject_is_harmless() {
        let subject = Arc::new(StateSubject::new(0));
        let sub = subject.subscribe(|_: &i32| {});
        drop(subject);
        sub.unsubscribe();
    }
}
