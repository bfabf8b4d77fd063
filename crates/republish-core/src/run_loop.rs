//! Rendering-pass boundaries.
//!
//! Scoped projections defer work until the end of the current burst of
//! synchronous mutations. A [`RunLoop`] marks those boundaries: the host calls
//! [`RunLoop::run_pending`] (or [`flush_pending_changes`] for the main loop)
//! once per rendering pass, after mutation callbacks have run and before
//! views read their state.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use slotmap::{new_key_type, SlotMap};

use crate::logging::{span_names, targets, PerfSpan};
use crate::signal::Subscription;

new_key_type! {
    /// Identifies an observer registered on a [`RunLoop`].
    pub struct ObserverId;
}

type Observer = Arc<dyn Fn() + Send + Sync>;

struct RunLoopInner {
    observers: Mutex<SlotMap<ObserverId, Observer>>,
    passes: AtomicU64,
    running: AtomicBool,
}

/// A set of repeating observers run once per rendering pass.
///
/// Cloning produces another handle to the same run loop.
#[derive(Clone)]
pub struct RunLoop {
    inner: Arc<RunLoopInner>,
}

static MAIN: OnceLock<RunLoop> = OnceLock::new();

impl RunLoop {
    /// Create an isolated run loop.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RunLoopInner {
                observers: Mutex::new(SlotMap::with_key()),
                passes: AtomicU64::new(0),
                running: AtomicBool::new(false),
            }),
        }
    }

    /// The process-wide run loop used by default.
    pub fn main() -> &'static RunLoop {
        MAIN.get_or_init(RunLoop::new)
    }

    /// Register an observer that runs on every pass until the subscription
    /// is dropped.
    pub fn add_observer<F>(&self, observer: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.inner.observers.lock().insert(Arc::new(observer));
        tracing::trace!(target: targets::RUN_LOOP, ?id, "added observer");

        let weak = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                let removed = inner.observers.lock().remove(id);
                drop(removed);
            }
        })
    }

    /// Number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.inner.observers.lock().len()
    }

    /// Number of completed passes.
    pub fn pass_count(&self) -> u64 {
        self.inner.passes.load(Ordering::Relaxed)
    }

    /// Run every observer once.
    ///
    /// Observers added during the pass run on the next one; observers removed
    /// during the pass are skipped. A nested call made by an observer returns
    /// immediately. Returns the number of observers that ran.
    #[tracing::instrument(skip_all, target = "republish_core::run_loop", level = "trace")]
    pub fn run_pending(&self) -> usize {
        if self.inner.running.swap(true, Ordering::Acquire) {
            tracing::trace!(target: targets::RUN_LOOP, "nested pass ignored");
            return 0;
        }
        let _reset = ResetOnDrop(&self.inner.running);
        let _span = PerfSpan::new(span_names::RUN_LOOP_PASS);

        let snapshot: Vec<(ObserverId, Observer)> = self
            .inner
            .observers
            .lock()
            .iter()
            .map(|(id, observer)| (id, Arc::clone(observer)))
            .collect();

        let mut ran = 0;
        for (id, observer) in snapshot {
            if !self.inner.observers.lock().contains_key(id) {
                continue;
            }
            observer();
            ran += 1;
        }

        self.inner.passes.fetch_add(1, Ordering::Relaxed);
        ran
    }
}

struct ResetOnDrop<'a>(&'a AtomicBool);

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for RunLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RunLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunLoop")
            .field("observers", &self.observer_count())
            .field("passes", &self.pass_count())
            .finish()
    }
}

/// End the current burst on the main run loop.
///
/// Delivers every change that scoped projections on [`RunLoop::main`] have
/// queued since the previous call.
pub fn flush_pending_changes() -> usize {
    RunLoop::main().run_pending()
}

static_assertions::assert_impl_all!(RunLoop: Send, Sync, Clone);
