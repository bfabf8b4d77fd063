//! Republishing of nested observable objects.
//!
//! A [`Republished<V>`] field holds one child object, an optional child, or a
//! collection of children. Whenever any held child fires its change signal,
//! the owner's change signal fires too, so changes deep in an object graph
//! reach every ancestor. Replacing the held value rebinds these forwarding
//! subscriptions to the new children.
//!
//! Unless created with [`Republished::without_inheritance`], held children
//! are also linked to the owner in the identity registry so that they
//! inherit the owner's dependencies.

use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, RwLock};

use crate::change::{ChangeSignal, Observable, WeakChangeSignal};
use crate::logging::{span_names, targets, PerfSpan};
use crate::registry::identity_registry;
use crate::signal::{Signal, Subscription};

/// A value made of observable objects.
///
/// Implemented for a single child (`Arc<T>`), an optional child
/// (`Option<Arc<T>>`) and a collection of children (`Vec<Arc<T>>`).
pub trait ObservableValue: Clone + Send + Sync + 'static {
    /// The change signals of every object in the value.
    fn change_signals(&self) -> Vec<ChangeSignal>;

    /// Whether `other` holds the same objects, compared by identity.
    fn is_identical(&self, other: &Self) -> bool;
}

impl<T: Observable + ?Sized> ObservableValue for Arc<T> {
    fn change_signals(&self) -> Vec<ChangeSignal> {
        vec![self.change_signal().clone()]
    }

    fn is_identical(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other)
    }
}

impl<T: Observable + ?Sized> ObservableValue for Option<Arc<T>> {
    fn change_signals(&self) -> Vec<ChangeSignal> {
        self.iter().map(|obj| obj.change_signal().clone()).collect()
    }

    fn is_identical(&self, other: &Self) -> bool {
        match (self, other) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl<T: Observable + ?Sized> ObservableValue for Vec<Arc<T>> {
    fn change_signals(&self) -> Vec<ChangeSignal> {
        self.iter().map(|obj| obj.change_signal().clone()).collect()
    }

    fn is_identical(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().zip(other).all(|(a, b)| Arc::ptr_eq(a, b))
    }
}

type OwnerCell = Arc<OnceLock<WeakChangeSignal>>;

#[derive(Default)]
struct Bindings {
    changes: Vec<Subscription>,
    links: Vec<Subscription>,
}

struct RepublishedInner<V> {
    value: RwLock<V>,
    owner: OwnerCell,
    inherit_dependencies: bool,
    bindings: Mutex<Bindings>,
    value_changed: Signal<V>,
}

/// A field holding observable children whose changes are forwarded to the
/// owner's change signal.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use republish_core::{ChangeSignal, Observable, Published, Republished};
///
/// struct Child {
///     changed: ChangeSignal,
///     count: Published<i32>,
/// }
///
/// impl Observable for Child {
///     fn change_signal(&self) -> &ChangeSignal {
///         &self.changed
///     }
/// }
///
/// let make_child = || {
///     let changed = ChangeSignal::new();
///     let count = Published::with_owner(&changed, 0);
///     Arc::new(Child { changed, count })
/// };
///
/// let parent = ChangeSignal::new();
/// let child = Republished::with_owner(&parent, make_child());
///
/// let fired = Arc::new(AtomicUsize::new(0));
/// let fired_clone = fired.clone();
/// let _sub = parent.subscribe(move || {
///     fired_clone.fetch_add(1, Ordering::SeqCst);
/// });
///
/// child.get().count.set(1);
/// assert_eq!(fired.load(Ordering::SeqCst), 1);
/// ```
pub struct Republished<V: ObservableValue> {
    inner: Arc<RepublishedInner<V>>,
}

impl<V: ObservableValue> Republished<V> {
    /// Create a field whose children inherit the owner's dependencies.
    pub fn new(value: V) -> Self {
        Self::with_options(value, true)
    }

    /// Create a field whose children do not inherit the owner's dependencies.
    pub fn without_inheritance(value: V) -> Self {
        Self::with_options(value, false)
    }

    /// Create a field, choosing whether children inherit dependencies.
    pub fn with_options(value: V, inherit_dependencies: bool) -> Self {
        let republished = Self {
            inner: Arc::new(RepublishedInner {
                value: RwLock::new(value),
                owner: Arc::new(OnceLock::new()),
                inherit_dependencies,
                bindings: Mutex::new(Bindings::default()),
                value_changed: Signal::new(),
            }),
        };
        republished.rebuild();
        republished
    }

    /// Create a field already forwarding to `owner`.
    pub fn with_owner(owner: &ChangeSignal, value: V) -> Self {
        let republished = Self::new(value);
        republished.bind_forwarding(owner);
        republished
    }

    /// Forward children's changes to `owner`.
    ///
    /// The first binding wins; returns whether this call bound the owner.
    pub fn bind_forwarding(&self, owner: &ChangeSignal) -> bool {
        let bound = self.inner.owner.set(owner.downgrade()).is_ok();
        if bound {
            tracing::trace!(target: targets::REPUBLISHED, owner = ?owner.id(), "bound forwarding");
        }
        bound
    }

    /// Whether an owner is bound.
    pub fn is_bound(&self) -> bool {
        self.inner.owner.get().is_some()
    }

    /// Whether children inherit the owner's dependencies.
    pub fn inherits_dependencies(&self) -> bool {
        self.inner.inherit_dependencies
    }

    /// Get a clone of the held value.
    pub fn get(&self) -> V {
        self.inner.value.read().clone()
    }

    /// Access the held value by reference.
    pub fn with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&V) -> R,
    {
        f(&self.inner.value.read())
    }

    /// Replace the held value.
    ///
    /// The owner is notified before the value is stored. Forwarding then
    /// moves to the new children and `value_changed` is emitted.
    #[tracing::instrument(skip_all, target = "republish_core::republished", level = "trace")]
    pub fn set(&self, value: V) {
        let _span = PerfSpan::new(span_names::REPUBLISH);
        if let Some(owner) = self.inner.owner.get() {
            owner.fire();
        }
        let old = std::mem::replace(&mut *self.inner.value.write(), value.clone());
        self.rebuild();
        self.inner.value_changed.emit(value);
        drop(old);
    }

    /// Modify a copy of the held value and store it.
    ///
    /// ```ignore
    /// todos.update(|items| items.push(Arc::new(Todo::new("write docs"))));
    /// ```
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut V),
    {
        let mut value = self.get();
        f(&mut value);
        self.set(value);
    }

    /// Number of children whose changes are forwarded.
    pub fn subscription_count(&self) -> usize {
        self.inner.bindings.lock().changes.len()
    }

    /// Emitted with the new value after every replacement.
    pub fn value_changed(&self) -> &Signal<V> {
        &self.inner.value_changed
    }

    /// Observe replacements until the subscription is dropped.
    pub fn subscribe<F>(&self, f: F) -> Subscription
    where
        F: Fn(&V) + Send + Sync + 'static,
    {
        self.inner.value_changed.connect_scoped(f)
    }

    /// Tear down and recreate the forwarding subscriptions and parent links
    /// for the currently held value.
    fn rebuild(&self) {
        let mut bindings = self.inner.bindings.lock();
        let signals = self.inner.value.read().change_signals();

        let changes = signals
            .iter()
            .map(|signal| {
                let owner = Arc::clone(&self.inner.owner);
                signal.subscribe(move || {
                    if let Some(owner) = owner.get() {
                        owner.fire();
                    }
                })
            })
            .collect();

        let links = if self.inner.inherit_dependencies {
            signals
                .iter()
                .map(|signal| {
                    let owner = Arc::clone(&self.inner.owner);
                    identity_registry().bind_parent(signal.id(), move || {
                        owner.get().filter(|owner| owner.is_alive()).map(WeakChangeSignal::id)
                    })
                })
                .collect()
        } else {
            Vec::new()
        };

        let old = std::mem::replace(&mut *bindings, Bindings { changes, links });
        tracing::trace!(target: targets::REPUBLISHED, children = signals.len(), "rebuilt forwarding");
        drop(bindings);
        drop(old);
    }
}

impl<V: ObservableValue + Default> Default for Republished<V> {
    fn default() -> Self {
        Self::new(V::default())
    }
}

impl<V: ObservableValue> fmt::Debug for Republished<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Republished")
            .field("owner", &self.inner.owner.get().map(WeakChangeSignal::id))
            .field("inherit_dependencies", &self.inner.inherit_dependencies)
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::published::Published;
    use parking_lot::Mutex;

    struct Child {
        changed: ChangeSignal,
        value: Published<i32>,
    }

    impl Child {
        fn new(value: i32) -> Arc<Self> {
            let changed = ChangeSignal::for_type::<Self>();
            let value = Published::with_owner(&changed, value);
            Arc::new(Self { changed, value })
        }
    }

    impl Observable for Child {
        fn change_signal(&self) -> &ChangeSignal {
            &self.changed
        }
    }

    fn counter(signal: &ChangeSignal) -> (Arc<Mutex<usize>>, Subscription) {
        let count = Arc::new(Mutex::new(0));
        let count_clone = count.clone();
        let sub = signal.subscribe(move || *count_clone.lock() += 1);
        (count, sub)
    }

    #[test]
    fn test_single_child_forwards() {
        let owner = ChangeSignal::new();
        let field = Republished::with_owner(&owner, Child::new(0));
        let (count, _sub) = counter(&owner);

        field.get().value.set(1);
        field.get().value.set(2);
        assert_eq!(*count.lock(), 2);
        assert_eq!(field.subscription_count(), 1);
    }

    #[test]
    fn test_owner_sees_old_child_values() {
        let owner = ChangeSignal::new();
        let field = Arc::new(Republished::with_owner(&owner, Child::new(0)));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let field_clone = field.clone();
        let seen_clone = seen.clone();
        let _sub = owner.subscribe(move || seen_clone.lock().push(field_clone.get().value.get()));

        for value in 1..=3 {
            field.get().value.set(value);
        }
        assert_eq!(*seen.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_replacing_child_rebinds() {
        let owner = ChangeSignal::new();
        let first = Child::new(0);
        let field = Republished::with_owner(&owner, first.clone());
        let (count, _sub) = counter(&owner);

        let second = Child::new(10);
        field.set(second.clone());
        assert_eq!(*count.lock(), 1);

        first.value.set(1);
        assert_eq!(*count.lock(), 1);
        second.value.set(11);
        assert_eq!(*count.lock(), 2);
        assert_eq!(first.changed.subscriber_count(), 0);
    }

    #[test]
    fn test_optional_child() {
        let owner = ChangeSignal::new();
        let field: Republished<Option<Arc<Child>>> = Republished::with_owner(&owner, None);
        let (count, _sub) = counter(&owner);
        assert_eq!(field.subscription_count(), 0);

        let child = Child::new(1);
        field.set(Some(child.clone()));
        child.value.set(2);
        assert_eq!(*count.lock(), 2);

        field.set(None);
        child.value.set(3);
        assert_eq!(*count.lock(), 3);
    }

    #[test]
    fn test_collection_children() {
        let owner = ChangeSignal::new();
        let field = Republished::with_owner(&owner, vec![Child::new(1)]);
        let (count, _sub) = counter(&owner);

        field.update(|items| items.push(Child::new(2)));
        assert_eq!(field.subscription_count(), 2);
        assert_eq!(*count.lock(), 1);

        let removed = field.get()[0].clone();
        field.update(|items| {
            items.remove(0);
        });
        assert_eq!(*count.lock(), 2);

        removed.value.set(5);
        assert_eq!(*count.lock(), 2);
        field.get()[0].value.set(20);
        assert_eq!(*count.lock(), 3);
    }

    #[test]
    fn test_forwarding_without_owner_is_noop() {
        let field = Republished::new(Child::new(0));
        field.get().value.set(1);
        assert!(!field.is_bound());

        let owner = ChangeSignal::new();
        assert!(field.bind_forwarding(&owner));
        let (count, _sub) = counter(&owner);
        field.get().value.set(2);
        assert_eq!(*count.lock(), 1);
    }

    #[test]
    fn test_dead_owner_is_ignored() {
        let owner = ChangeSignal::new();
        let field = Republished::with_owner(&owner, Child::new(0));
        drop(owner);
        field.get().value.set(1);
        field.set(Child::new(2));
    }

    #[test]
    fn test_drop_tears_down() {
        let owner = ChangeSignal::new();
        let child = Child::new(0);
        let field = Republished::with_owner(&owner, child.clone());
        assert_eq!(child.changed.subscriber_count(), 1);
        assert_eq!(identity_registry().parent(child.changed.id()), Some(owner.id()));

        drop(field);
        assert_eq!(child.changed.subscriber_count(), 0);
        assert_eq!(identity_registry().parent(child.changed.id()), None);
    }

    #[test]
    fn test_parent_links() {
        let owner = ChangeSignal::new();
        let child = Child::new(0);
        let inheriting = Republished::with_owner(&owner, child.clone());
        assert!(inheriting.inherits_dependencies());
        assert_eq!(identity_registry().parent(child.changed.id()), Some(owner.id()));

        let other = Child::new(0);
        let opted_out = Republished::without_inheritance(other.clone());
        opted_out.bind_forwarding(&owner);
        assert!(!opted_out.inherits_dependencies());
        assert_eq!(identity_registry().parent(other.changed.id()), None);

        // Links resolve once the owner is bound.
        let late = Child::new(0);
        let unbound = Republished::new(late.clone());
        assert_eq!(identity_registry().parent(late.changed.id()), None);
        unbound.bind_forwarding(&owner);
        assert_eq!(identity_registry().parent(late.changed.id()), Some(owner.id()));
    }

    #[test]
    fn test_value_changed() {
        let field = Republished::new(Child::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let _sub = field.subscribe(move |child: &Arc<Child>| seen_clone.lock().push(child.value.get()));

        field.set(Child::new(4));
        field.set(Child::new(5));
        assert_eq!(*seen.lock(), vec![4, 5]);
    }

    #[test]
    fn test_identity() {
        let a = Child::new(0);
        let b = Child::new(0);
        assert!(a.is_identical(&a.clone()));
        assert!(!a.is_identical(&b));
        assert!(None::<Arc<Child>>.is_identical(&None));
        assert!(!Some(a.clone()).is_identical(&None));
        assert!(vec![a.clone(), b.clone()].is_identical(&vec![a.clone(), b.clone()]));
        assert!(!vec![a.clone(), b.clone()].is_identical(&vec![b, a]));
    }
}
