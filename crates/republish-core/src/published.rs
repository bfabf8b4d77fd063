//! Leaf observable values.
//!
//! [`Published<T>`] holds a plain value owned by an observable object. Every
//! write first fires the owner's [`ChangeSignal`] (while the old value is
//! still readable), then stores the new value, then emits
//! [`value_changed`](Published::value_changed) with it.
//!
//! # Example
//!
//! ```
//! use std::sync::{Arc, Mutex};
//! use republish_core::{ChangeSignal, Published};
//!
//! let changed = ChangeSignal::new();
//! let count = Published::with_owner(&changed, 0);
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let seen_clone = seen.clone();
//! let count_handle = count.downgrade();
//! let _sub = changed.subscribe(move || {
//!     // Will-change: the old value is still stored.
//!     let old = count_handle.upgrade().map(|count| count.get());
//!     seen_clone.lock().unwrap().push(old);
//! });
//!
//! count.set(1);
//! count.set(2);
//! assert_eq!(*seen.lock().unwrap(), vec![Some(0), Some(1)]);
//! ```

use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::RwLock;

use crate::change::{ChangeSignal, WeakChangeSignal};
use crate::logging::targets;
use crate::signal::{Signal, Subscription};

struct PublishedInner<T> {
    value: RwLock<T>,
    owner: OnceLock<WeakChangeSignal>,
    value_changed: Signal<T>,
}

/// An observable leaf value that forwards writes to its owner's change signal.
///
/// # Thread Safety
///
/// `Published<T>` uses interior mutability with `RwLock` and is `Send + Sync`
/// whenever `T` is.
pub struct Published<T> {
    inner: Arc<PublishedInner<T>>,
}

impl<T: Clone + Send + Sync + 'static> Published<T> {
    /// Create an unowned value.
    ///
    /// Writes only notify `value_changed` subscribers until an owner is bound
    /// with [`bind_forwarding`](Self::bind_forwarding).
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(PublishedInner {
                value: RwLock::new(value),
                owner: OnceLock::new(),
                value_changed: Signal::new(),
            }),
        }
    }

    /// Create a value owned by the object with change signal `owner`.
    pub fn with_owner(owner: &ChangeSignal, value: T) -> Self {
        let published = Self::new(value);
        published.bind_forwarding(owner);
        published
    }

    /// Forward writes to `owner`.
    ///
    /// The first binding wins; returns whether this call bound the owner.
    pub fn bind_forwarding(&self, owner: &ChangeSignal) -> bool {
        let bound = self.inner.owner.set(owner.downgrade()).is_ok();
        if bound {
            tracing::trace!(target: targets::PUBLISHED, owner = ?owner.id(), "bound forwarding");
        }
        bound
    }

    /// Whether an owner is bound.
    pub fn is_bound(&self) -> bool {
        self.inner.owner.get().is_some()
    }

    /// Get a clone of the current value.
    pub fn get(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Access the value by reference.
    pub fn with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        f(&self.inner.value.read())
    }

    /// Replace the value, returning the previous one.
    pub fn replace(&self, value: T) -> T {
        if let Some(owner) = self.inner.owner.get() {
            owner.fire();
        }
        let old = std::mem::replace(&mut *self.inner.value.write(), value.clone());
        self.inner.value_changed.emit(value);
        old
    }

    /// Set the value, notifying the owner first.
    pub fn set(&self, value: T) {
        let _old = self.replace(value);
    }

    /// Modify a copy of the value and store it.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut T),
    {
        let mut value = self.get();
        f(&mut value);
        self.set(value);
    }

    /// Set the value without notifying anyone.
    pub fn set_silent(&self, value: T) {
        *self.inner.value.write() = value;
    }

    /// Emitted with the new value after every write.
    pub fn value_changed(&self) -> &Signal<T> {
        &self.inner.value_changed
    }

    /// Observe new values until the subscription is dropped.
    pub fn subscribe<F>(&self, f: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.inner.value_changed.connect_scoped(f)
    }

    /// Create a non-owning handle.
    pub fn downgrade(&self) -> WeakPublished<T> {
        WeakPublished {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Whether two handles refer to the same storage.
    pub fn ptr_eq(&self, other: &Published<T>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Published<T> {
    /// Set the value only if it differs from the current one.
    ///
    /// Returns whether a write (and its notifications) happened.
    pub fn set_if_changed(&self, value: T) -> bool {
        if *self.inner.value.read() == value {
            return false;
        }
        self.set(value);
        true
    }
}

impl<T: Clone + Default + Send + Sync + 'static> Default for Published<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Published<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Published")
            .field("value", &*self.inner.value.read())
            .field("owner", &self.inner.owner.get().map(WeakChangeSignal::id))
            .finish()
    }
}

/// A non-owning handle to a [`Published`] value.
pub struct WeakPublished<T> {
    inner: Weak<PublishedInner<T>>,
}

impl<T> WeakPublished<T> {
    /// Upgrade to an owning handle if the value is still alive.
    pub fn upgrade(&self) -> Option<Published<T>> {
        self.inner.upgrade().map(|inner| Published { inner })
    }
}

impl<T> Clone for WeakPublished<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for WeakPublished<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakPublished")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

static_assertions::assert_impl_all!(Published<i32>: Send, Sync);
static_assertions::assert_impl_all!(Published<String>: Send, Sync);
static_assertions::assert_impl_all!(WeakPublished<String>: Send, Sync);
