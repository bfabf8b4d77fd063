//! Error types for Republish.

use crate::environment::Environment;

/// The main error type for Republish operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepublishError {
    /// Scoped projection error.
    #[error("Scope error: {0}")]
    Scope(#[from] ScopeError),
    /// Environment configuration error.
    #[error("Environment error: {0}")]
    Environment(#[from] EnvironmentError),
}

/// Errors raised by scoped projections.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScopeError {
    /// The projection was read or written before `bind` supplied a root.
    #[error("Scoped value of type {root_type} accessed before a root object was bound")]
    MissingRoot {
        /// Type name of the expected root object.
        root_type: &'static str,
    },
    /// The projection was created without a write closure.
    #[error("Scoped value is read-only")]
    ReadOnly,
}

/// Errors raised by process environment configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvironmentError {
    /// The environment was already chosen (explicitly or by a first read).
    #[error("Environment has already been initialized as {current}")]
    AlreadyInitialized {
        /// The environment currently in effect.
        current: Environment,
    },
}

/// A specialized Result type for Republish operations.
pub type Result<T> = std::result::Result<T, RepublishError>;
