//! Identity registry backing dependency inheritance.
//!
//! Every [`ChangeSignal`](crate::ChangeSignal) owns one entry in the
//! process-wide [`IdentityRegistry`]; the entry is created with the signal and
//! removed when its last handle is dropped, so entries are keyed "weakly" by
//! the identity of a live observable object.
//!
//! An entry may carry:
//!
//! - a bound [`Dependencies`] snapshot (see [`IdentityRegistry::bind`]), and
//! - a parent resolver (see [`IdentityRegistry::bind_parent`]) that reports the
//!   identity of the object's current logical owner, if it is still alive.
//!
//! Resolving the effective dependencies of an object walks the parent chain to
//! the root-most ancestor and uses whatever is bound there.
//!
//! # Key Types
//!
//! - [`ObjectId`] - Generational handle for an observable identity
//! - [`IdentityRegistry`] - The arena of identities and their links
//! - [`IdentityInfo`] - Point-in-time description of one entry, for debugging

use std::cell::RefCell;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::ReentrantMutex;
use slotmap::{new_key_type, SlotMap};

use crate::dependencies::{Dependencies, DependencyStore};
use crate::logging::targets;
use crate::signal::Subscription;

new_key_type! {
    /// A unique identifier for an observable object's identity.
    ///
    /// `ObjectId`s are generational: once the owning change signal is dropped
    /// the id goes stale and never aliases a later identity.
    pub struct ObjectId;
}

impl ObjectId {
    /// Convert the ObjectId to a raw u64 value.
    #[inline]
    pub fn as_raw(self) -> u64 {
        use slotmap::Key;
        self.data().as_ffi()
    }

    /// Create an ObjectId from a raw u64 value.
    ///
    /// Note: This does not check if the ObjectId exists in the registry.
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self::from(slotmap::KeyData::from_ffi(raw))
    }
}

/// Resolves the identity of an object's current logical parent.
pub type ParentResolver = Arc<dyn Fn() -> Option<ObjectId> + Send + Sync>;

/// A value bound into an entry together with the token of the binding that
/// installed it.
struct Bound<T> {
    token: u64,
    value: T,
}

struct IdentityEntry {
    label: &'static str,
    sequence: u64,
    dependencies: Option<Bound<Dependencies>>,
    parent: Option<Bound<ParentResolver>>,
}

impl IdentityEntry {
    fn new(label: &'static str, sequence: u64) -> Self {
        Self {
            label,
            sequence,
            dependencies: None,
            parent: None,
        }
    }
}

/// Point-in-time description of a registry entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityInfo {
    /// The identity.
    pub id: ObjectId,
    /// Label given when the identity was registered (usually a type name).
    pub label: &'static str,
    /// Registration order; later registrations compare greater.
    pub sequence: u64,
    /// The currently resolved parent, if any.
    pub parent: Option<ObjectId>,
    /// Whether a dependency snapshot is bound to this identity.
    pub has_dependencies: bool,
}

/// The process-wide arena of observable identities.
///
/// All access goes through a recursive lock; resolvers and dependency values
/// are never invoked or dropped while the inner table is borrowed, so user
/// code reached from them may call back into the registry.
pub struct IdentityRegistry {
    entries: ReentrantMutex<RefCell<SlotMap<ObjectId, IdentityEntry>>>,
    next_token: AtomicU64,
    next_sequence: AtomicU64,
}

static REGISTRY: OnceLock<IdentityRegistry> = OnceLock::new();

/// Access the process-wide identity registry.
pub fn identity_registry() -> &'static IdentityRegistry {
    IdentityRegistry::global()
}

impl IdentityRegistry {
    fn new() -> Self {
        Self {
            entries: ReentrantMutex::new(RefCell::new(SlotMap::with_key())),
            next_token: AtomicU64::new(1),
            next_sequence: AtomicU64::new(0),
        }
    }

    /// The process-wide registry.
    pub fn global() -> &'static IdentityRegistry {
        REGISTRY.get_or_init(IdentityRegistry::new)
    }

    fn next_token(&self) -> u64 {
        self.next_token.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a new identity and return its id.
    pub fn register(&self, label: &'static str) -> ObjectId {
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let guard = self.entries.lock();
        let id = guard.borrow_mut().insert(IdentityEntry::new(label, sequence));
        tracing::trace!(target: targets::REGISTRY, ?id, label, "registered identity");
        id
    }

    /// Remove an identity together with its bindings.
    ///
    /// Unknown or stale ids are ignored.
    pub fn unregister(&self, id: ObjectId) {
        let guard = self.entries.lock();
        let removed = guard.borrow_mut().remove(id);
        if removed.is_some() {
            tracing::trace!(target: targets::REGISTRY, ?id, "unregistered identity");
        }
        // Bound values are dropped after the borrow ends.
        drop(removed);
    }

    /// Whether the identity is still registered.
    pub fn contains(&self, id: ObjectId) -> bool {
        self.entries.lock().borrow().contains_key(id)
    }

    /// Number of live identities.
    pub fn object_count(&self) -> usize {
        self.entries.lock().borrow().len()
    }

    /// Bind a dependency snapshot to an identity.
    ///
    /// The binding lasts until the returned subscription is canceled or the
    /// identity goes away. Binding again replaces the previous snapshot; the
    /// replaced binding's subscription then no longer affects the entry.
    pub fn bind(&'static self, dependencies: Dependencies, to: ObjectId) -> Subscription {
        let token = self.next_token();
        let replaced = {
            let guard = self.entries.lock();
            let mut entries = guard.borrow_mut();
            match entries.get_mut(to) {
                Some(entry) => entry.dependencies.replace(Bound {
                    token,
                    value: dependencies,
                }),
                None => {
                    tracing::debug!(target: targets::REGISTRY, id = ?to, "bind on stale identity ignored");
                    return Subscription::empty();
                }
            }
        };
        drop(replaced);
        tracing::debug!(target: targets::REGISTRY, id = ?to, "bound dependencies");

        Subscription::new(move || self.unbind_dependencies(to, token))
    }

    fn unbind_dependencies(&self, id: ObjectId, token: u64) {
        let guard = self.entries.lock();
        let removed = {
            let mut entries = guard.borrow_mut();
            match entries.get_mut(id) {
                Some(entry) if entry.dependencies.as_ref().is_some_and(|b| b.token == token) => {
                    entry.dependencies.take()
                }
                _ => None,
            }
        };
        drop(removed);
    }

    /// Link an identity to its logical parent.
    ///
    /// `resolver` is consulted lazily on every lookup, so the parent may be
    /// bound after the link is made, and a dead parent simply ends the chain.
    /// A later link for the same identity replaces this one; canceling the
    /// replaced link's subscription leaves the newer link in place.
    pub fn bind_parent<F>(&'static self, id: ObjectId, resolver: F) -> Subscription
    where
        F: Fn() -> Option<ObjectId> + Send + Sync + 'static,
    {
        let token = self.next_token();
        let resolver: ParentResolver = Arc::new(resolver);
        let replaced = {
            let guard = self.entries.lock();
            let mut entries = guard.borrow_mut();
            match entries.get_mut(id) {
                Some(entry) => entry.parent.replace(Bound {
                    token,
                    value: resolver,
                }),
                None => {
                    tracing::debug!(target: targets::REGISTRY, ?id, "parent link on stale identity ignored");
                    return Subscription::empty();
                }
            }
        };
        drop(replaced);
        tracing::trace!(target: targets::REGISTRY, ?id, "bound parent link");

        Subscription::new(move || self.unbind_parent(id, token))
    }

    fn unbind_parent(&self, id: ObjectId, token: u64) {
        let guard = self.entries.lock();
        let removed = {
            let mut entries = guard.borrow_mut();
            match entries.get_mut(id) {
                Some(entry) if entry.parent.as_ref().is_some_and(|b| b.token == token) => {
                    entry.parent.take()
                }
                _ => None,
            }
        };
        drop(removed);
    }

    /// The current logical parent of an identity.
    pub fn parent(&self, id: ObjectId) -> Option<ObjectId> {
        let guard = self.entries.lock();
        let resolver = guard
            .borrow()
            .get(id)
            .and_then(|entry| entry.parent.as_ref().map(|b| Arc::clone(&b.value)))?;
        resolver().filter(|parent| self.contains(*parent))
    }

    /// The root-most ancestor of an identity, or `None` if it has no parent.
    ///
    /// A parent chain that revisits an identity is cut at the repeat.
    pub fn root_of(&self, id: ObjectId) -> Option<ObjectId> {
        let _guard = self.entries.lock();
        let mut root = self.parent(id)?;
        let mut visited = HashSet::from([id, root]);
        while let Some(parent) = self.parent(root) {
            if !visited.insert(parent) {
                tracing::warn!(target: targets::REGISTRY, ?id, ?parent, "cycle in parent chain");
                break;
            }
            root = parent;
        }
        Some(root)
    }

    /// The chain of ancestors, nearest first.
    pub fn ancestors(&self, id: ObjectId) -> Vec<ObjectId> {
        let _guard = self.entries.lock();
        let mut chain = Vec::new();
        let mut visited = HashSet::from([id]);
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            if !visited.insert(parent) {
                break;
            }
            chain.push(parent);
            current = parent;
        }
        chain
    }

    /// The dependency snapshot bound directly to an identity.
    pub fn bound_dependencies(&self, id: ObjectId) -> Option<Dependencies> {
        self.entries
            .lock()
            .borrow()
            .get(id)
            .and_then(|entry| entry.dependencies.as_ref().map(|b| b.value.clone()))
    }

    /// Dependencies inherited through the parent chain, without global overrides.
    ///
    /// Uses the snapshot of the root-most ancestor that has one, so unbound
    /// ancestors above a bound one are skipped. Falls back to a snapshot bound
    /// to the object itself.
    pub fn inherited(&self, id: ObjectId) -> Option<Dependencies> {
        let _guard = self.entries.lock();
        self.ancestors(id)
            .into_iter()
            .rev()
            .find_map(|ancestor| self.bound_dependencies(ancestor))
            .or_else(|| self.bound_dependencies(id))
    }

    /// Inherited dependencies with the process-wide override frame applied on
    /// top (override values win) while an override is pushed.
    ///
    /// `None` when neither the object nor any of its ancestors has a binding.
    pub fn resolve_inherited(&self, id: ObjectId) -> Option<Dependencies> {
        // Registry lock is released before the shared store is consulted.
        let mut dependencies = self.inherited(id)?;
        let shared = DependencyStore::shared();
        if shared.has_pushed_dependencies() {
            dependencies.push(&shared.snapshot());
        }
        Some(dependencies)
    }

    /// The effective dependencies for an identity.
    ///
    /// Falls back to the process-wide store's current snapshot when nothing
    /// is inherited.
    pub fn resolve(&self, id: ObjectId) -> Dependencies {
        self.resolve_inherited(id)
            .unwrap_or_else(|| DependencyStore::shared().snapshot())
    }

    /// Describe every live identity.
    pub fn entries(&self) -> Vec<IdentityInfo> {
        let guard = self.entries.lock();
        let raw: Vec<(ObjectId, &'static str, u64, bool)> = guard
            .borrow()
            .iter()
            .map(|(id, entry)| (id, entry.label, entry.sequence, entry.dependencies.is_some()))
            .collect();
        raw.into_iter()
            .map(|(id, label, sequence, has_dependencies)| IdentityInfo {
                id,
                label,
                sequence,
                parent: self.parent(id),
                has_dependencies,
            })
            .collect()
    }

    /// Describe one identity.
    pub fn info(&self, id: ObjectId) -> Option<IdentityInfo> {
        let guard = self.entries.lock();
        let (label, sequence, has_dependencies) = guard
            .borrow()
            .get(id)
            .map(|entry| (entry.label, entry.sequence, entry.dependencies.is_some()))?;
        Some(IdentityInfo {
            id,
            label,
            sequence,
            parent: self.parent(id),
            has_dependencies,
        })
    }
}

static_assertions::assert_impl_all!(IdentityRegistry: Send, Sync);
