//! Change signals and the observable object abstraction.
//!
//! A [`ChangeSignal`] is the single, payload-less notification channel an
//! observable object exposes. It fires *before* the object's state changes
//! (will-change semantics), so subscribers can still read the old state.
//!
//! Each change signal carries an identity ([`ObjectId`]) registered in the
//! [`IdentityRegistry`](crate::registry::IdentityRegistry). The identity lives
//! exactly as long as the last handle to the signal; the registry uses it to
//! link children to owners for dependency inheritance.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use republish_core::ChangeSignal;
//!
//! let signal = ChangeSignal::new();
//! let count = Arc::new(AtomicUsize::new(0));
//!
//! let count_clone = count.clone();
//! let subscription = signal.subscribe(move || {
//!     count_clone.fetch_add(1, Ordering::SeqCst);
//! });
//!
//! signal.fire();
//! drop(subscription);
//! signal.fire();
//! assert_eq!(count.load(Ordering::SeqCst), 1);
//! ```

use std::fmt;
use std::sync::{Arc, Weak};

use crate::logging::targets;
use crate::registry::{identity_registry, ObjectId};
use crate::signal::{Signal, Subscription};

struct ChangeSignalInner {
    id: ObjectId,
    label: &'static str,
    signal: Signal<()>,
}

impl Drop for ChangeSignalInner {
    fn drop(&mut self) {
        identity_registry().unregister(self.id);
    }
}

/// A synchronous will-change broadcast with an identity.
///
/// Cloning produces another handle to the same signal and identity.
#[derive(Clone)]
pub struct ChangeSignal {
    inner: Arc<ChangeSignalInner>,
}

impl ChangeSignal {
    /// Create a change signal with a fresh identity.
    pub fn new() -> Self {
        Self::labeled("ChangeSignal")
    }

    /// Create a change signal whose identity is labeled with `T`'s type name.
    pub fn for_type<T: ?Sized>() -> Self {
        Self::labeled(std::any::type_name::<T>())
    }

    /// Create a change signal with a debug label for its identity.
    pub fn labeled(label: &'static str) -> Self {
        let id = identity_registry().register(label);
        Self {
            inner: Arc::new(ChangeSignalInner {
                id,
                label,
                signal: Signal::new(),
            }),
        }
    }

    /// The identity of the object owning this signal.
    #[inline]
    pub fn id(&self) -> ObjectId {
        self.inner.id
    }

    /// The debug label of this signal's identity.
    pub fn label(&self) -> &'static str {
        self.inner.label
    }

    /// Subscribe to change notifications.
    ///
    /// The handler runs synchronously on every [`fire`](Self::fire) until the
    /// returned subscription is canceled or dropped.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.signal.connect_scoped(move |_| handler())
    }

    /// Notify all subscribers that the owner is about to change.
    pub fn fire(&self) {
        tracing::trace!(target: targets::CHANGE, id = ?self.inner.id, "change signal fired");
        self.inner.signal.emit(());
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.signal.connection_count()
    }

    /// Block or unblock delivery.
    pub fn set_blocked(&self, blocked: bool) {
        self.inner.signal.set_blocked(blocked);
    }

    /// Whether delivery is blocked.
    pub fn is_blocked(&self) -> bool {
        self.inner.signal.is_blocked()
    }

    /// Create a non-owning handle.
    pub fn downgrade(&self) -> WeakChangeSignal {
        WeakChangeSignal {
            id: self.inner.id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Whether two handles refer to the same signal.
    pub fn ptr_eq(&self, other: &ChangeSignal) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for ChangeSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for ChangeSignal {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ChangeSignal {}

impl fmt::Debug for ChangeSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeSignal")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// A non-owning handle to a [`ChangeSignal`].
///
/// Firing through a handle whose signal is gone does nothing.
#[derive(Clone)]
pub struct WeakChangeSignal {
    id: ObjectId,
    inner: Weak<ChangeSignalInner>,
}

impl WeakChangeSignal {
    /// Upgrade to an owning handle if the signal is still alive.
    pub fn upgrade(&self) -> Option<ChangeSignal> {
        self.inner.upgrade().map(|inner| ChangeSignal { inner })
    }

    /// The identity the signal had (stale once the signal is gone).
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Whether the signal is still alive.
    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }

    /// Fire the signal if it is still alive.
    pub fn fire(&self) {
        if let Some(signal) = self.upgrade() {
            signal.fire();
        }
    }
}

impl fmt::Debug for WeakChangeSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakChangeSignal")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// An object that announces its changes through a single [`ChangeSignal`].
///
/// Usually implemented with `#[derive(Observable)]`.
pub trait Observable: Send + Sync + 'static {
    /// The object's change signal.
    fn change_signal(&self) -> &ChangeSignal;

    /// The object's identity.
    fn object_id(&self) -> ObjectId {
        self.change_signal().id()
    }
}

impl<T: Observable + ?Sized> Observable for Arc<T> {
    fn change_signal(&self) -> &ChangeSignal {
        (**self).change_signal()
    }
}

impl Observable for ChangeSignal {
    fn change_signal(&self) -> &ChangeSignal {
        self
    }
}

static_assertions::assert_impl_all!(ChangeSignal: Send, Sync, Clone);
static_assertions::assert_impl_all!(WeakChangeSignal: Send, Sync, Clone);
