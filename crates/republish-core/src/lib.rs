//! Core systems for Republish.
//!
//! This crate provides reactive state propagation for trees of observable
//! objects:
//!
//! - **Change Signals**: Will-change notification with object identity
//! - **Published Values**: Leaf fields that notify their owner before changing
//! - **Republishing**: Forwarding child changes to every owning ancestor
//! - **Scoped Projections**: Deduplicated, coalesced views of one value
//! - **Dependencies**: Typed dependency injection inherited along ownership
//! - **Synchronization**: Keeping several published values equal
//!
//! # Republishing Example
//!
//! ```
//! use std::sync::{Arc, Mutex};
//! use republish_core::{ChangeSignal, Observable, Published, Republished};
//!
//! struct Counter {
//!     changed: ChangeSignal,
//!     value: Published<i32>,
//! }
//!
//! impl Observable for Counter {
//!     fn change_signal(&self) -> &ChangeSignal {
//!         &self.changed
//!     }
//! }
//!
//! struct Screen {
//!     changed: ChangeSignal,
//!     counter: Republished<Arc<Counter>>,
//! }
//!
//! let counter = {
//!     let changed = ChangeSignal::new();
//!     Arc::new(Counter { value: Published::with_owner(&changed, 0), changed })
//! };
//! let screen = {
//!     let changed = ChangeSignal::new();
//!     Screen { counter: Republished::with_owner(&changed, counter.clone()), changed }
//! };
//!
//! // Listeners on the screen see the counter's value before each change.
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let (seen_clone, counter_clone) = (seen.clone(), counter.clone());
//! let _sub = screen.changed.subscribe(move || {
//!     seen_clone.lock().unwrap().push(counter_clone.value.get());
//! });
//!
//! counter.value.set(1);
//! counter.value.set(2);
//! assert_eq!(*seen.lock().unwrap(), vec![0, 1]);
//! ```
//!
//! # Dependencies Example
//!
//! ```
//! use republish_core::{with_dependencies, ChangeSignal, Dependencies, Dependency, DependencyKey};
//!
//! struct Greeting;
//!
//! impl DependencyKey for Greeting {
//!     type Value = &'static str;
//!     fn default_value() -> &'static str {
//!         "hello"
//!     }
//! }
//!
//! let owner = ChangeSignal::new();
//! let greeting = Dependency::<Greeting>::new();
//!
//! let overrides = Dependencies::new().with::<Greeting>("bonjour");
//! with_dependencies(&overrides, || assert_eq!(greeting.get(&owner), "bonjour"));
//! assert_eq!(greeting.get(&owner), "hello");
//! ```

mod change;
pub mod dependencies;
pub mod environment;
mod error;
pub mod logging;
mod published;
pub mod registry;
mod republished;
pub mod run_loop;
mod scoped;
pub mod signal;
mod synchronize;

pub use change::{ChangeSignal, Observable, WeakChangeSignal};
pub use dependencies::{
    resolve_for, with_dependencies, Dependencies, Dependency, DependencyKey, DependencyScope,
    DependencyStore, WithDependencies,
};
pub use environment::{environment, set_environment, Environment};
pub use error::{EnvironmentError, RepublishError, Result, ScopeError};
pub use logging::{InheritanceDebug, PerfSpan, TreeFormatOptions, TreeStyle};
pub use published::{Published, WeakPublished};
pub use registry::{identity_registry, IdentityInfo, IdentityRegistry, ObjectId};
pub use republished::{ObservableValue, Republished};
pub use run_loop::{flush_pending_changes, RunLoop};
pub use scoped::Scoped;
pub use signal::{ConnectionId, Signal, Subscription};
pub use synchronize::{synchronize, synchronize2};
