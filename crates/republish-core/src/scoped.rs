//! Scoped projections of a root object.
//!
//! A [`Scoped<Root, V>`] narrows a large observable root object down to a
//! single projected value. Its own change signal fires only when the projected
//! value actually changes, so views built on it are not invalidated by
//! unrelated changes elsewhere in the root.
//!
//! # Coalescing
//!
//! Root notifications are not compared immediately. The first notification of
//! a burst records the projected value as it was just before the change, later
//! ones are only counted. At the end of the burst (the next pass of the
//! projection's [`RunLoop`]) the last delivered value is compared with the
//! value after the burst. The projection then fires at most once per burst,
//! and not at all if the burst ended where it started.
//!
//! # Observable values
//!
//! Projections created with [`Scoped::observing`] project observable children.
//! They compare by identity and additionally forward the projected children's
//! own change signals immediately, as long as the child is still the one the
//! root projects.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use republish_core::{ChangeSignal, Observable, Published, RunLoop, Scoped};
//!
//! struct AppState {
//!     changed: ChangeSignal,
//!     count: Published<i32>,
//!     title: Published<String>,
//! }
//!
//! impl Observable for AppState {
//!     fn change_signal(&self) -> &ChangeSignal {
//!         &self.changed
//!     }
//! }
//!
//! let changed = ChangeSignal::new();
//! let state = Arc::new(AppState {
//!     count: Published::with_owner(&changed, 0),
//!     title: Published::with_owner(&changed, "Counter".into()),
//!     changed,
//! });
//!
//! let run_loop = RunLoop::new();
//! let count = Scoped::new(|state: &AppState| state.count.get()).on_run_loop(&run_loop);
//! count.bind(&state);
//!
//! let fires = Arc::new(AtomicUsize::new(0));
//! let fires_clone = fires.clone();
//! let _sub = count.subscribe(move || {
//!     fires_clone.fetch_add(1, Ordering::SeqCst);
//! });
//!
//! state.title.set("Renamed".into());
//! state.count.set(1);
//! state.count.set(2);
//! run_loop.run_pending();
//!
//! assert_eq!(fires.load(Ordering::SeqCst), 1);
//! assert_eq!(count.get(), 2);
//! ```

use std::any::type_name;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::change::{ChangeSignal, Observable};
use crate::error::ScopeError;
use crate::logging::{span_names, targets, PerfSpan};
use crate::registry::ObjectId;
use crate::republished::ObservableValue;
use crate::run_loop::RunLoop;
use crate::signal::Subscription;

type ReadFn<Root, V> = Box<dyn Fn(&Root) -> V + Send + Sync>;
type WriteFn<Root, V> = Box<dyn Fn(&Root, V) + Send + Sync>;
type DuplicateFn<V> = Box<dyn Fn(&V, &V) -> bool + Send + Sync>;
type SignalsFn<V> = fn(&V) -> Vec<ChangeSignal>;

struct ScopedState<Root, V> {
    root: Option<Weak<Root>>,
    current: Option<V>,
    /// Projected value before the first notification of the current burst.
    pending: Option<V>,
    pending_count: usize,
    run_loop: RunLoop,
    root_subscription: Option<Subscription>,
    value_subscription: Option<Subscription>,
    flush_observer: Option<Subscription>,
}

impl<Root, V> ScopedState<Root, V> {
    fn root(&self) -> Option<Arc<Root>> {
        self.root.as_ref().and_then(Weak::upgrade)
    }

    fn clear_pending(&mut self) {
        self.pending = None;
        self.pending_count = 0;
    }
}

struct ScopedInner<Root, V> {
    signal: ChangeSignal,
    read: ReadFn<Root, V>,
    write: Option<WriteFn<Root, V>>,
    is_duplicate: DuplicateFn<V>,
    value_signals: Option<SignalsFn<V>>,
    state: Mutex<ScopedState<Root, V>>,
}

impl<Root, V> ScopedInner<Root, V>
where
    Root: Observable,
    V: Clone + Send + Sync + 'static,
{
    /// Count a root notification, recording the projected value as it is
    /// before the root changes if this is the first one of the burst.
    fn enqueue_change(&self) {
        let root = {
            let mut state = self.state.lock();
            if state.pending_count > 0 {
                state.pending_count += 1;
                tracing::trace!(target: targets::SCOPED, pending = state.pending_count, "queued root change");
                return;
            }
            state.root()
        };
        let Some(root) = root else {
            return;
        };
        let old_value = (self.read)(&root);
        let mut state = self.state.lock();
        state.pending_count += 1;
        state.pending.get_or_insert(old_value);
        tracing::trace!(target: targets::SCOPED, pending = state.pending_count, "queued root change");
    }

    /// Compare the last delivered value with the value after the burst and
    /// fire if they differ.
    fn apply_pending_changes(self: &Arc<Self>) {
        let (baseline, root) = {
            let mut state = self.state.lock();
            if state.pending_count == 0 {
                return;
            }
            let first = state.pending.take();
            state.pending_count = 0;
            (state.current.clone().or(first), state.root())
        };
        let (Some(baseline), Some(root)) = (baseline, root) else {
            return;
        };

        let _span = PerfSpan::new(span_names::SCOPED_FLUSH);
        let new_value = (self.read)(&root);
        if (self.is_duplicate)(&baseline, &new_value) {
            tracing::trace!(target: targets::SCOPED, "burst ended without a net change");
            self.state.lock().current = Some(new_value);
            return;
        }

        self.signal.fire();
        let value_subscription = Self::subscribe_value(self, &new_value);
        let replaced = {
            let mut state = self.state.lock();
            state.current = Some(new_value);
            std::mem::replace(&mut state.value_subscription, value_subscription)
        };
        drop(replaced);
    }

    /// Forward the change signals of an observable projected value.
    fn subscribe_value(inner: &Arc<Self>, value: &V) -> Option<Subscription> {
        let signals = inner.value_signals?(value);
        Some(Subscription::combine(signals.iter().map(|signal| {
            let weak = Arc::downgrade(inner);
            let child = signal.id();
            signal.subscribe(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.forward_value_change(child);
                }
            })
        })))
    }

    /// Fire for a change of `child` unless the root no longer projects it.
    ///
    /// A swapped-out child stays subscribed until the end of the burst.
    fn forward_value_change(&self, child: ObjectId) {
        let Some(value_signals) = self.value_signals else {
            return;
        };
        let (root, current) = {
            let state = self.state.lock();
            (state.root(), state.current.clone())
        };
        let projected = match root {
            Some(root) => Some((self.read)(&root)),
            None => current,
        };
        let still_projected = projected
            .is_some_and(|value| value_signals(&value).iter().any(|signal| signal.id() == child));
        if still_projected {
            self.signal.fire();
        } else {
            tracing::trace!(target: targets::SCOPED, ?child, "ignored change of a replaced child");
        }
    }
}

/// A deduplicated, coalesced view of one value inside a root object.
///
/// Cloning produces another handle to the same projection.
pub struct Scoped<Root, V> {
    inner: Arc<ScopedInner<Root, V>>,
}

impl<Root, V> Scoped<Root, V>
where
    Root: Observable,
    V: Clone + Send + Sync + 'static,
{
    fn build(
        read: ReadFn<Root, V>,
        write: Option<WriteFn<Root, V>>,
        is_duplicate: DuplicateFn<V>,
        value_signals: Option<SignalsFn<V>>,
    ) -> Self {
        Self {
            inner: Arc::new(ScopedInner {
                signal: ChangeSignal::for_type::<Self>(),
                read,
                write,
                is_duplicate,
                value_signals,
                state: Mutex::new(ScopedState {
                    root: None,
                    current: None,
                    pending: None,
                    pending_count: 0,
                    run_loop: RunLoop::main().clone(),
                    root_subscription: None,
                    value_subscription: None,
                    flush_observer: None,
                }),
            }),
        }
    }

    /// A read-only projection deduplicated by `is_duplicate`.
    pub fn with_duplicates<R, D>(read: R, is_duplicate: D) -> Self
    where
        R: Fn(&Root) -> V + Send + Sync + 'static,
        D: Fn(&V, &V) -> bool + Send + Sync + 'static,
    {
        Self::build(Box::new(read), None, Box::new(is_duplicate), None)
    }

    /// A writable projection deduplicated by `is_duplicate`.
    pub fn writable_with_duplicates<R, W, D>(read: R, write: W, is_duplicate: D) -> Self
    where
        R: Fn(&Root) -> V + Send + Sync + 'static,
        W: Fn(&Root, V) + Send + Sync + 'static,
        D: Fn(&V, &V) -> bool + Send + Sync + 'static,
    {
        Self::build(
            Box::new(read),
            Some(Box::new(write)),
            Box::new(is_duplicate),
            None,
        )
    }

    /// Deliver pending changes on `run_loop` instead of [`RunLoop::main`].
    pub fn on_run_loop(self, run_loop: &RunLoop) -> Self {
        let replaced = {
            let mut state = self.inner.state.lock();
            state.run_loop = run_loop.clone();
            let replaced = state.flush_observer.take();
            if replaced.is_some() {
                state.flush_observer = Some(self.flush_observer(run_loop));
            }
            replaced
        };
        drop(replaced);
        self
    }

    fn flush_observer(&self, run_loop: &RunLoop) -> Subscription {
        let weak = Arc::downgrade(&self.inner);
        run_loop.add_observer(move || {
            if let Some(inner) = weak.upgrade() {
                inner.apply_pending_changes();
            }
        })
    }

    /// Bind the projection to `root`.
    ///
    /// Binding the root that is already bound does nothing. Otherwise the
    /// previous subscriptions and pending changes are dropped, and if the
    /// projected value differs from the last one delivered the projection
    /// fires immediately.
    #[tracing::instrument(skip_all, target = "republish_core::scoped", level = "trace")]
    pub fn bind(&self, root: &Arc<Root>) {
        let previous = {
            let state = self.inner.state.lock();
            if state.root().is_some_and(|bound| Arc::ptr_eq(&bound, root)) {
                return;
            }
            state.current.clone()
        };

        let new_value = (self.inner.read)(root);
        let changed = previous.is_some_and(|previous| !(self.inner.is_duplicate)(&previous, &new_value));
        if changed {
            tracing::debug!(target: targets::SCOPED, root = ?root.object_id(), "root swapped with a new value");
            self.inner.signal.fire();
        }

        let weak = Arc::downgrade(&self.inner);
        let root_subscription = root.change_signal().subscribe(move || {
            if let Some(inner) = weak.upgrade() {
                inner.enqueue_change();
            }
        });
        let value_subscription = ScopedInner::subscribe_value(&self.inner, &new_value);

        let replaced = {
            let mut state = self.inner.state.lock();
            state.root = Some(Arc::downgrade(root));
            state.current = Some(new_value);
            state.clear_pending();
            if state.flush_observer.is_none() {
                let run_loop = state.run_loop.clone();
                state.flush_observer = Some(self.flush_observer(&run_loop));
            }
            (
                std::mem::replace(&mut state.root_subscription, Some(root_subscription)),
                std::mem::replace(&mut state.value_subscription, value_subscription),
            )
        };
        drop(replaced);
    }

    /// The projected value, or a `MissingRoot` error before the first bind.
    pub fn try_get(&self) -> Result<V, ScopeError> {
        let (current, root) = {
            let state = self.inner.state.lock();
            (state.current.clone(), state.root())
        };
        if let Some(current) = current {
            return Ok(current);
        }
        match root {
            Some(root) => Ok((self.inner.read)(&root)),
            None => Err(self.missing_root()),
        }
    }

    /// The projected value.
    ///
    /// # Panics
    ///
    /// Panics if the projection has never been bound to a root.
    pub fn get(&self) -> V {
        match self.try_get() {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }

    /// Access the projected value by reference.
    ///
    /// # Panics
    ///
    /// Panics if the projection has never been bound to a root.
    pub fn with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&V) -> R,
    {
        f(&self.get())
    }

    /// Write through to the root.
    ///
    /// The resulting root notification is handled like any other change, so
    /// the projection fires at the end of the burst only if the value changed.
    pub fn set(&self, value: V) -> Result<(), ScopeError> {
        let Some(write) = self.inner.write.as_ref() else {
            return Err(ScopeError::ReadOnly);
        };
        let root = self.inner.state.lock().root();
        let root = root.ok_or_else(|| self.missing_root())?;
        write(&root, value);
        Ok(())
    }

    /// Whether the projection is bound to a live root.
    pub fn is_bound(&self) -> bool {
        self.inner.state.lock().root().is_some()
    }

    /// Whether writes are supported.
    pub fn is_writable(&self) -> bool {
        self.inner.write.is_some()
    }

    /// Number of root notifications waiting for the end of the burst.
    pub fn pending_changes(&self) -> usize {
        self.inner.state.lock().pending_count
    }

    /// The projection's own change signal.
    pub fn change_signal(&self) -> &ChangeSignal {
        &self.inner.signal
    }

    /// Observe the projection until the subscription is dropped.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.signal.subscribe(handler)
    }

    fn missing_root(&self) -> ScopeError {
        ScopeError::MissingRoot {
            root_type: type_name::<Root>(),
        }
    }
}

impl<Root, V> Scoped<Root, V>
where
    Root: Observable,
    V: Clone + PartialEq + Send + Sync + 'static,
{
    /// A read-only projection deduplicated by value equality.
    pub fn new<R>(read: R) -> Self
    where
        R: Fn(&Root) -> V + Send + Sync + 'static,
    {
        Self::with_duplicates(read, |a: &V, b: &V| a == b)
    }

    /// A writable projection deduplicated by value equality.
    pub fn writable<R, W>(read: R, write: W) -> Self
    where
        R: Fn(&Root) -> V + Send + Sync + 'static,
        W: Fn(&Root, V) + Send + Sync + 'static,
    {
        Self::writable_with_duplicates(read, write, |a: &V, b: &V| a == b)
    }
}

impl<Root, V> Scoped<Root, V>
where
    Root: Observable,
    V: ObservableValue,
{
    /// A read-only projection of observable children, deduplicated by
    /// identity, forwarding the children's own changes.
    pub fn observing<R>(read: R) -> Self
    where
        R: Fn(&Root) -> V + Send + Sync + 'static,
    {
        Self::build(
            Box::new(read),
            None,
            Box::new(V::is_identical),
            Some(V::change_signals as SignalsFn<V>),
        )
    }

    /// A writable projection of observable children.
    pub fn observing_writable<R, W>(read: R, write: W) -> Self
    where
        R: Fn(&Root) -> V + Send + Sync + 'static,
        W: Fn(&Root, V) + Send + Sync + 'static,
    {
        Self::build(
            Box::new(read),
            Some(Box::new(write)),
            Box::new(V::is_identical),
            Some(V::change_signals as SignalsFn<V>),
        )
    }
}

impl<Root, V> Clone for Scoped<Root, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<Root, V> Observable for Scoped<Root, V>
where
    Root: Observable,
    V: Clone + Send + Sync + 'static,
{
    fn change_signal(&self) -> &ChangeSignal {
        &self.inner.signal
    }
}

impl<Root, V: fmt::Debug> fmt::Debug for Scoped<Root, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Scoped")
            .field("root", &type_name::<Root>())
            .field("current", &state.current)
            .field("pending", &state.pending_count)
            .finish()
    }
}

static_assertions::assert_impl_all!(Scoped<ChangeSignal, i32>: Send, Sync, Clone);
