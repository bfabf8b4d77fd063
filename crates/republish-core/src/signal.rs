//! Typed signal/slot primitive and the [`Subscription`] cancelable.
//!
//! [`Signal<Args>`] is the typed broadcast used for did-change notifications
//! (a published field's new value, a republished field's new value). The
//! payload-less will-change broadcast that every observable object exposes is
//! [`crate::ChangeSignal`], which is built on top of `Signal<()>`.
//!
//! # Key Types
//!
//! - [`Signal<Args>`] - Emits to every connected slot, synchronously
//! - [`ConnectionId`] - Identifies a connection for [`Signal::disconnect`]
//! - [`Subscription`] - RAII guard that cancels a connection (or anything else) on drop
//!
//! # Reentrancy
//!
//! Slots run on the emitting thread without the connection lock held, so a
//! slot may connect new slots, disconnect itself or others, and emit again.
//! A slot that is disconnected while an emission is in flight is not invoked
//! for the remainder of that emission. Slots connected during an emission are
//! first invoked by the next emission.
//!
//! # Example
//!
//! ```
//! use republish_core::Signal;
//!
//! let title_set = Signal::<String>::new();
//! let logger = title_set.connect(|title| println!("title is now {title:?}"));
//!
//! title_set.emit("Inbox".into());
//! assert!(title_set.disconnect(logger));
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use slotmap::{new_key_type, SlotMap};

use crate::logging::targets;

new_key_type! {
    /// Handle for one slot connected to a [`Signal`].
    ///
    /// Pass it to [`Signal::disconnect`]; stale handles are ignored.
    pub struct ConnectionId;
}

type Slot<Args> = Arc<dyn Fn(&Args) + Send + Sync>;
type Connections<Args> = Mutex<SlotMap<ConnectionId, Slot<Args>>>;

/// A broadcast of `Args` to any number of slots.
///
/// Slots run in the order they were connected and receive the payload by
/// reference. `Signal<()>` carries no payload.
///
/// # Thread Safety
///
/// `Signal<Args>` is `Send + Sync`. Emission always runs slots directly on the
/// emitting thread; observable state in this crate is expected to be mutated
/// from a single "main" context.
pub struct Signal<Args> {
    /// Shared so [`Subscription`]s can hold a weak handle.
    connections: Arc<Connections<Args>>,
    blocked: AtomicBool,
}

impl<Args: 'static> Default for Signal<Args> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Args: 'static> Signal<Args> {
    /// Create a signal without slots.
    pub fn new() -> Self {
        Self {
            connections: Arc::new(Mutex::new(SlotMap::with_key())),
            blocked: AtomicBool::new(false),
        }
    }

    /// Connect `slot` until [`disconnect`](Self::disconnect) is called with
    /// the returned id.
    pub fn connect<F>(&self, slot: F) -> ConnectionId
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        self.connections.lock().insert(Arc::new(slot))
    }

    /// Connect a slot with automatic disconnection when the returned
    /// [`Subscription`] is dropped or canceled.
    ///
    /// The subscription only holds a weak handle to the signal's connection
    /// table, so it may safely outlive the signal.
    pub fn connect_scoped<F>(&self, slot: F) -> Subscription
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        let id = self.connect(slot);
        let connections: Weak<Connections<Args>> = Arc::downgrade(&self.connections);
        Subscription::new(move || {
            if let Some(connections) = connections.upgrade() {
                connections.lock().remove(id);
            }
        })
    }

    /// Remove one slot. Returns whether it was still connected.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        self.connections.lock().remove(id).is_some()
    }

    /// Remove every slot.
    pub fn disconnect_all(&self) {
        self.connections.lock().clear();
    }

    /// Number of connected slots.
    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// While blocked, [`emit`](Self::emit) drops its payload.
    pub fn set_blocked(&self, blocked: bool) {
        self.blocked.store(blocked, Ordering::SeqCst);
    }

    /// Whether emission is blocked.
    pub fn is_blocked(&self) -> bool {
        self.blocked.load(Ordering::SeqCst)
    }

    /// Run every connected slot with `args`.
    ///
    /// The connection table is snapshotted and the lock released before any
    /// slot runs.
    #[tracing::instrument(skip_all, target = "republish_core::signal", level = "trace")]
    pub fn emit(&self, args: Args) {
        if self.is_blocked() {
            tracing::trace!(target: targets::SIGNAL, "signal blocked, skipping emit");
            return;
        }

        let snapshot: Vec<(ConnectionId, Slot<Args>)> = self
            .connections
            .lock()
            .iter()
            .map(|(id, slot)| (id, Arc::clone(slot)))
            .collect();
        tracing::trace!(target: targets::SIGNAL, connection_count = snapshot.len(), "emitting signal");

        for (id, slot) in snapshot {
            // Skip slots disconnected by an earlier slot in this emission.
            if !self.connections.lock().contains_key(id) {
                continue;
            }
            slot(&args);
        }
    }
}

impl<Args> fmt::Debug for Signal<Args> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("connections", &self.connections.lock().len())
            .field("blocked", &self.blocked.load(Ordering::SeqCst))
            .finish()
    }
}

type CancelFn = Box<dyn FnOnce() + Send + Sync>;

/// A cancelable handle to a live subscription.
///
/// Runs its cancel action exactly once: when [`cancel`](Self::cancel) is
/// called or when the subscription is dropped, whichever comes first.
/// Subscriptions are scoped resources; holding one keeps the corresponding
/// forwarding alive.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use republish_core::Signal;
///
/// let saved = Signal::<u32>::new();
/// let total = Arc::new(AtomicU32::new(0));
///
/// let total_clone = total.clone();
/// let subscription = saved.connect_scoped(move |bytes| {
///     total_clone.fetch_add(*bytes, Ordering::SeqCst);
/// });
/// saved.emit(512);
/// drop(subscription);
/// saved.emit(1024);
///
/// assert_eq!(total.load(Ordering::SeqCst), 512);
/// ```
#[must_use = "dropping a Subscription cancels it immediately"]
pub struct Subscription {
    cancel: Option<CancelFn>,
}

impl Subscription {
    /// Create a subscription that runs `cancel` when canceled or dropped.
    pub fn new<F>(cancel: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription that does nothing when canceled.
    pub fn empty() -> Self {
        Self { cancel: None }
    }

    /// Bundle several subscriptions into one. Canceling the result cancels
    /// every member in order.
    pub fn combine<I>(subscriptions: I) -> Self
    where
        I: IntoIterator<Item = Subscription>,
    {
        let members: Vec<Subscription> = subscriptions.into_iter().collect();
        if members.is_empty() {
            return Self::empty();
        }
        Self::new(move || drop(members))
    }

    /// Whether this subscription still has a pending cancel action.
    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }

    /// Cancel now.
    pub fn cancel(mut self) {
        self.run_cancel();
    }

    /// Keep the subscription alive forever without holding the handle.
    pub fn detach(mut self) {
        self.cancel = None;
    }

    fn run_cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run_cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

static_assertions::assert_impl_all!(Signal<()>: Send, Sync);
static_assertions::assert_impl_all!(Signal<String>: Send, Sync);
static_assertions::assert_impl_all!(Subscription: Send, Sync);
