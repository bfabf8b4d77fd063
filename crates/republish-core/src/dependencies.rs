//! Hierarchical, typed dependency injection.
//!
//! A [`DependencyKey`] names a dependency and supplies its default value for
//! each [`Environment`](crate::Environment). Values live in [`Dependencies`],
//! a stack of frames: [`push`](Dependencies::push) layers overrides on top of
//! the current frame and [`pop`](Dependencies::pop) restores it.
//!
//! Objects find their dependencies through the identity registry: a
//! [`Dependency<K>`] field resolves `K` against the dependencies bound to the
//! root-most ancestor of its owner, falling back to the process-wide
//! [`DependencyStore::shared`] store. Overrides pushed onto the shared store
//! (for example by [`with_dependencies`]) win over inherited values while
//! they are in effect.
//!
//! # Example
//!
//! ```
//! use republish_core::{with_dependencies, Dependencies, DependencyKey, DependencyStore};
//!
//! struct ApiUrl;
//!
//! impl DependencyKey for ApiUrl {
//!     type Value = String;
//!     fn default_value() -> String {
//!         "https://api.example.com".into()
//!     }
//! }
//!
//! let staging = Dependencies::new().with::<ApiUrl>("https://staging.example.com".into());
//! let url = with_dependencies(&staging, || DependencyStore::shared().resolve::<ApiUrl>());
//! assert_eq!(url, "https://staging.example.com");
//! ```

use std::any::{type_name, Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::{Arc, OnceLock};

use parking_lot::ReentrantMutex;

use crate::change::{ChangeSignal, Observable};
use crate::environment::{environment, Environment};
use crate::logging::targets;
use crate::registry::{identity_registry, ObjectId};
use crate::signal::Subscription;

/// A key identifying a dependency and its per-environment defaults.
pub trait DependencyKey: 'static {
    /// The type of the dependency.
    type Value: Clone + Send + Sync + 'static;

    /// The value used in production.
    fn default_value() -> Self::Value;

    /// The value used under a test harness.
    fn test_value() -> Self::Value {
        Self::default_value()
    }

    /// The value used when rendering previews.
    fn preview_value() -> Self::Value {
        Self::default_value()
    }

    /// The default for the process's current environment.
    fn environment_value() -> Self::Value {
        match environment() {
            Environment::Production => Self::default_value(),
            Environment::Test => Self::test_value(),
            Environment::Preview => Self::preview_value(),
        }
    }
}

#[derive(Clone)]
struct Entry {
    value: Arc<dyn Any + Send + Sync>,
    /// Set through `set`/`with`; defaults cached by `resolve` are not explicit
    /// and are never carried over by `push`.
    explicit: bool,
}

type Frame = HashMap<TypeId, Entry>;

fn downcast<K: DependencyKey>(entry: &Entry) -> K::Value {
    match entry.value.downcast_ref::<K::Value>() {
        Some(value) => value.clone(),
        None => panic!(
            "dependency {} holds a value that is not a {}",
            type_name::<K>(),
            type_name::<K::Value>()
        ),
    }
}

/// A stack of dependency frames.
///
/// Cloning is cheap: frames are shared until written.
#[derive(Clone)]
pub struct Dependencies {
    frames: Vec<Arc<Frame>>,
}

impl Dependencies {
    /// Create an empty set of dependencies.
    pub fn new() -> Self {
        Self {
            frames: vec![Arc::new(Frame::new())],
        }
    }

    /// Create dependencies by configuring an empty set.
    pub fn from_fn(configure: impl FnOnce(&mut Dependencies)) -> Self {
        let mut dependencies = Self::new();
        configure(&mut dependencies);
        dependencies
    }

    /// Builder form of [`set`](Self::set).
    pub fn with<K: DependencyKey>(mut self, value: K::Value) -> Self {
        self.set::<K>(value);
        self
    }

    fn top(&self) -> &Frame {
        // `frames` is never empty.
        &self.frames[self.frames.len() - 1]
    }

    fn top_mut(&mut self) -> &mut Frame {
        let last = self.frames.len() - 1;
        Arc::make_mut(&mut self.frames[last])
    }

    /// Set the value for `K` in the top frame.
    pub fn set<K: DependencyKey>(&mut self, value: K::Value) {
        self.top_mut().insert(
            TypeId::of::<K>(),
            Entry {
                value: Arc::new(value),
                explicit: true,
            },
        );
    }

    /// The value for `K`, or its environment default when unset.
    pub fn get<K: DependencyKey>(&self) -> K::Value {
        self.lookup::<K>().unwrap_or_else(K::environment_value)
    }

    /// The value for `K`, caching the environment default in the top frame.
    pub fn resolve<K: DependencyKey>(&mut self) -> K::Value {
        if let Some(value) = self.lookup::<K>() {
            return value;
        }
        let value = K::environment_value();
        self.cache::<K>(value)
    }

    fn lookup<K: DependencyKey>(&self) -> Option<K::Value> {
        self.top().get(&TypeId::of::<K>()).map(downcast::<K>)
    }

    /// Insert a non-explicit value unless one is already present, returning
    /// the value that ends up stored.
    fn cache<K: DependencyKey>(&mut self, value: K::Value) -> K::Value {
        let entry = self
            .top_mut()
            .entry(TypeId::of::<K>())
            .or_insert_with(|| Entry {
                value: Arc::new(value),
                explicit: false,
            });
        downcast::<K>(entry)
    }

    /// Whether a value for `K` is stored in the top frame.
    pub fn contains<K: DependencyKey>(&self) -> bool {
        self.top().contains_key(&TypeId::of::<K>())
    }

    /// Remove the value for `K` from the top frame.
    pub fn remove<K: DependencyKey>(&mut self) -> Option<K::Value> {
        self.top_mut()
            .remove(&TypeId::of::<K>())
            .map(|entry| downcast::<K>(&entry))
    }

    /// Push a new frame: the current top frame with the explicitly set values
    /// of `overrides`' top frame layered over it.
    pub fn push(&mut self, overrides: &Dependencies) {
        let mut frame = Frame::clone(self.top());
        frame.extend(
            overrides
                .top()
                .iter()
                .filter(|(_, entry)| entry.explicit)
                .map(|(key, entry)| (*key, entry.clone())),
        );
        self.frames.push(Arc::new(frame));
    }

    /// Pop the top frame. Popping the last frame leaves one empty frame.
    pub fn pop(&mut self) {
        self.frames.pop();
        if self.frames.is_empty() {
            self.frames.push(Arc::new(Frame::new()));
        }
    }

    /// Number of frames.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Whether any frame has been pushed over the base frame.
    pub fn has_pushed_dependencies(&self) -> bool {
        self.frames.len() > 1
    }

    /// The effective dependencies for an object.
    ///
    /// Uses the dependencies bound to the object's root-most ancestor (or to
    /// the object itself), with any overrides pushed onto the shared store
    /// layered on top. Without a binding this is the shared store's snapshot.
    pub fn for_object(id: ObjectId) -> Dependencies {
        identity_registry().resolve(id)
    }
}

impl Default for Dependencies {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependencies")
            .field("depth", &self.depth())
            .field("values", &self.top().len())
            .finish()
    }
}

/// A thread-safe, reentrant home for a [`Dependencies`] stack.
///
/// Default functions run by [`resolve`](Self::resolve) may themselves resolve
/// other keys on the same store.
pub struct DependencyStore {
    state: ReentrantMutex<RefCell<Dependencies>>,
}

static SHARED: OnceLock<DependencyStore> = OnceLock::new();

impl DependencyStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            state: ReentrantMutex::new(RefCell::new(Dependencies::new())),
        }
    }

    /// The process-wide store.
    pub fn shared() -> &'static DependencyStore {
        SHARED.get_or_init(DependencyStore::new)
    }

    /// The value for `K`, caching the environment default.
    pub fn resolve<K: DependencyKey>(&self) -> K::Value {
        let guard = self.state.lock();
        if let Some(value) = guard.borrow().lookup::<K>() {
            return value;
        }
        // Computed without a borrow so the default may resolve other keys.
        let value = K::environment_value();
        let value = guard.borrow_mut().cache::<K>(value);
        tracing::trace!(target: targets::DEPENDENCIES, key = type_name::<K>(), "cached default dependency");
        value
    }

    /// The value for `K` without caching.
    pub fn get<K: DependencyKey>(&self) -> K::Value {
        let guard = self.state.lock();
        let stored = guard.borrow().lookup::<K>();
        stored.unwrap_or_else(K::environment_value)
    }

    /// Push overrides. Pair with [`pop`](Self::pop), or use
    /// [`scope`](Self::scope).
    pub fn push(&self, overrides: &Dependencies) {
        let guard = self.state.lock();
        let mut dependencies = guard.borrow_mut();
        dependencies.push(overrides);
        tracing::debug!(target: targets::DEPENDENCIES, depth = dependencies.depth(), "pushed dependencies");
    }

    /// Pop the most recent overrides.
    pub fn pop(&self) {
        let guard = self.state.lock();
        let mut dependencies = guard.borrow_mut();
        dependencies.pop();
        tracing::debug!(target: targets::DEPENDENCIES, depth = dependencies.depth(), "popped dependencies");
    }

    /// Push overrides until the returned guard is dropped.
    pub fn scope(&self, overrides: &Dependencies) -> DependencyScope<'_> {
        self.push(overrides);
        DependencyScope { store: self }
    }

    /// Number of frames.
    pub fn depth(&self) -> usize {
        self.state.lock().borrow().depth()
    }

    /// Whether overrides are pushed.
    pub fn has_pushed_dependencies(&self) -> bool {
        self.state.lock().borrow().has_pushed_dependencies()
    }

    /// A copy of the current stack.
    pub fn snapshot(&self) -> Dependencies {
        self.state.lock().borrow().clone()
    }

    /// Mutate the stack in place.
    ///
    /// # Panics
    ///
    /// `f` must not access this store again.
    pub fn with<R>(&self, f: impl FnOnce(&mut Dependencies) -> R) -> R {
        let guard = self.state.lock();
        let mut dependencies = guard.borrow_mut();
        f(&mut dependencies)
    }
}

impl Default for DependencyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DependencyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyStore")
            .field("depth", &self.depth())
            .finish()
    }
}

/// Pops overrides from a [`DependencyStore`] when dropped.
#[must_use = "the overrides are popped as soon as the scope is dropped"]
pub struct DependencyScope<'a> {
    store: &'a DependencyStore,
}

impl Drop for DependencyScope<'_> {
    fn drop(&mut self) {
        self.store.pop();
    }
}

/// Run `body` with `overrides` pushed onto the shared store.
///
/// The overrides are popped again when `body` returns or unwinds.
pub fn with_dependencies<R>(overrides: &Dependencies, body: impl FnOnce() -> R) -> R {
    let _scope = DependencyStore::shared().scope(overrides);
    body()
}

/// Resolve `K` for the object with identity `id`.
pub fn resolve_for<K: DependencyKey>(id: ObjectId) -> K::Value {
    match identity_registry().resolve_inherited(id) {
        Some(dependencies) => dependencies.get::<K>(),
        None => DependencyStore::shared().resolve::<K>(),
    }
}

/// A dependency field, resolved through its owner's identity.
///
/// ```
/// use republish_core::{ChangeSignal, Dependency, DependencyKey, Observable};
///
/// struct Clock;
/// impl DependencyKey for Clock {
///     type Value = u64;
///     fn default_value() -> u64 {
///         42
///     }
/// }
///
/// struct Model {
///     changed: ChangeSignal,
///     clock: Dependency<Clock>,
/// }
///
/// impl Observable for Model {
///     fn change_signal(&self) -> &ChangeSignal {
///         &self.changed
///     }
/// }
///
/// let model = Model { changed: ChangeSignal::new(), clock: Dependency::new() };
/// assert_eq!(model.clock.get(&model), 42);
/// ```
pub struct Dependency<K> {
    _key: PhantomData<fn() -> K>,
}

impl<K: DependencyKey> Dependency<K> {
    /// Create the field marker.
    pub const fn new() -> Self {
        Self { _key: PhantomData }
    }

    /// Resolve the dependency for `owner`.
    pub fn get<O: Observable + ?Sized>(&self, owner: &O) -> K::Value {
        resolve_for::<K>(owner.object_id())
    }
}

impl<K: DependencyKey> Default for Dependency<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Clone for Dependency<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for Dependency<K> {}

impl<K> fmt::Debug for Dependency<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dependency<{}>", type_name::<K>())
    }
}

/// An object built under dependency overrides that keeps them bound to it.
///
/// The object (and every object inheriting from it) resolves dependencies
/// against `overrides` for as long as the wrapper lives.
pub struct WithDependencies<T> {
    object: Arc<T>,
    _binding: Subscription,
}

impl<T: Observable> WithDependencies<T> {
    /// Build the object with `overrides` pushed, then bind them to it.
    pub fn new(overrides: Dependencies, build: impl FnOnce() -> T) -> Self {
        let object = Arc::new(with_dependencies(&overrides, build));
        let binding = identity_registry().bind(overrides, object.object_id());
        Self {
            object,
            _binding: binding,
        }
    }

    /// The wrapped object.
    pub fn object(&self) -> &Arc<T> {
        &self.object
    }
}

impl<T: Observable> Observable for WithDependencies<T> {
    fn change_signal(&self) -> &ChangeSignal {
        self.object.change_signal()
    }
}

impl<T> Deref for WithDependencies<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.object
    }
}

impl<T: fmt::Debug> fmt::Debug for WithDependencies<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WithDependencies").field(&self.object).finish()
    }
}

static_assertions::assert_impl_all!(Dependencies: Send, Sync, Clone);
static_assertions::assert_impl_all!(DependencyStore: Send, Sync);

/// Serializes tests that push onto the shared store.
#[cfg(test)]
pub(crate) fn test_lock() -> parking_lot::MutexGuard<'static, ()> {
    static LOCK: parking_lot::Mutex<()> = parking_lot::Mutex::new(());
    LOCK.lock()
}
