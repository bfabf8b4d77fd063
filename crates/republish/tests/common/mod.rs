//! Observable fixtures shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use republish::prelude::*;

#[derive(Observable)]
pub struct Child {
    #[change_signal]
    pub changed: ChangeSignal,

    #[published]
    pub value: Published<i32>,
}

impl Child {
    pub fn new(value: i32) -> Arc<Self> {
        let changed = ChangeSignal::for_type::<Self>();
        Arc::new(Self {
            value: Published::with_owner(&changed, value),
            changed,
        })
    }
}

#[derive(Observable)]
pub struct Parent {
    #[change_signal]
    pub changed: ChangeSignal,

    #[republished]
    pub child: Republished<Arc<Child>>,
}

impl Parent {
    pub fn new(child: Arc<Child>) -> Arc<Self> {
        let changed = ChangeSignal::for_type::<Self>();
        Arc::new(Self {
            child: Republished::with_owner(&changed, child),
            changed,
        })
    }
}

#[derive(Observable)]
pub struct OptionalParent {
    #[change_signal]
    pub changed: ChangeSignal,

    #[republished]
    pub child: Republished<Option<Arc<Child>>>,
}

impl OptionalParent {
    pub fn new(child: Option<Arc<Child>>) -> Arc<Self> {
        let changed = ChangeSignal::for_type::<Self>();
        Arc::new(Self {
            child: Republished::with_owner(&changed, child),
            changed,
        })
    }
}

#[derive(Observable)]
pub struct CollectionParent {
    #[change_signal]
    pub changed: ChangeSignal,

    #[republished]
    pub children: Republished<Vec<Arc<Child>>>,
}

impl CollectionParent {
    pub fn new() -> Arc<Self> {
        let changed = ChangeSignal::for_type::<Self>();
        Arc::new(Self {
            children: Republished::with_owner(&changed, Vec::new()),
            changed,
        })
    }

    pub fn values(&self) -> Vec<i32> {
        self.children().iter().map(|child| child.value()).collect()
    }
}

/// Counts fires of a change signal.
pub struct FireCounter {
    count: Arc<AtomicUsize>,
    _subscription: Subscription,
}

impl FireCounter {
    pub fn new(observable: &impl Observable) -> Self {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let subscription = observable.change_signal().subscribe(move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        Self {
            count,
            _subscription: subscription,
        }
    }

    pub fn get(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

/// Records a value read from inside every fire of a change signal.
pub struct Recorder<T> {
    seen: Arc<Mutex<Vec<T>>>,
    _subscription: Subscription,
}

impl<T: Clone + Send + 'static> Recorder<T> {
    pub fn new(observable: &impl Observable, read: impl Fn() -> T + Send + Sync + 'static) -> Self {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let subscription = observable.change_signal().subscribe(move || {
            seen_clone.lock().push(read());
        });
        Self {
            seen,
            _subscription: subscription,
        }
    }

    pub fn seen(&self) -> Vec<T> {
        self.seen.lock().clone()
    }
}
