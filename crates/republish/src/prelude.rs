//! Prelude module for Republish.
//!
//! This module re-exports the most commonly used types for convenient importing:
//!
//! ```ignore
//! use republish::prelude::*;
//! ```

// ============================================================================
// Observable Objects
// ============================================================================

// `Observable` names both the trait and its derive macro.
pub use crate::{ChangeSignal, Observable, ObservableValue, Published, Republished};

// ============================================================================
// Signals
// ============================================================================

pub use crate::{Signal, Subscription};

// ============================================================================
// Scoped Projections
// ============================================================================

pub use crate::{flush_pending_changes, RunLoop, Scoped, ScopeError};

// ============================================================================
// Dependencies
// ============================================================================

pub use crate::{
    with_dependencies, Dependencies, Dependency, DependencyKey, DependencyStore, WithDependencies,
};

// ============================================================================
// Synchronization
// ============================================================================

pub use crate::{synchronize, synchronize2};
