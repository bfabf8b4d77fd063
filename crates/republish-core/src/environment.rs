//! Process environment detection.
//!
//! Dependency keys provide different values for production, tests and
//! previews. The active [`Environment`] is chosen once per process, in this
//! order:
//!
//! 1. an explicit [`set_environment`] call made before the first read;
//! 2. the `REPUBLISH_ENVIRONMENT` variable (`production`, `test` or `preview`);
//! 3. `REPUBLISH_PREVIEW=1`, set by preview hosts;
//! 4. a Cargo test harness (the executable lives in a `deps/` directory, or
//!    `RUST_TEST_THREADS` is set);
//! 5. otherwise production.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::error::EnvironmentError;
use crate::logging::targets;

/// Variable naming the environment explicitly.
pub const ENVIRONMENT_VAR: &str = "REPUBLISH_ENVIRONMENT";

/// Variable set to `1` by preview hosts.
pub const PREVIEW_VAR: &str = "REPUBLISH_PREVIEW";

/// The environment the process runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Environment {
    /// A regular application run.
    Production,
    /// Running under a test harness.
    Test,
    /// Rendering previews.
    Preview,
}

impl Environment {
    /// The lowercase name used in `REPUBLISH_ENVIRONMENT`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Test => "test",
            Self::Preview => "preview",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error parsing an [`Environment`] name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown environment {0:?} (expected production, test or preview)")]
pub struct ParseEnvironmentError(String);

impl FromStr for Environment {
    type Err = ParseEnvironmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            "preview" => Ok(Self::Preview),
            _ => Err(ParseEnvironmentError(s.to_string())),
        }
    }
}

static ENVIRONMENT: OnceLock<Environment> = OnceLock::new();

/// The active environment, detected on first call.
pub fn environment() -> Environment {
    *ENVIRONMENT.get_or_init(|| {
        let env = detect_environment();
        tracing::debug!(target: targets::ENVIRONMENT, %env, "environment detected");
        env
    })
}

/// Choose the environment explicitly.
///
/// Must run before anything reads the environment. Choosing the environment
/// that is already active succeeds.
pub fn set_environment(env: Environment) -> Result<(), EnvironmentError> {
    let mut installed = false;
    let current = *ENVIRONMENT.get_or_init(|| {
        installed = true;
        env
    });
    if installed {
        tracing::debug!(target: targets::ENVIRONMENT, %env, "environment set explicitly");
    }
    if current == env {
        Ok(())
    } else {
        Err(EnvironmentError::AlreadyInitialized { current })
    }
}

/// Detect the environment from process state, ignoring any cached choice.
pub fn detect_environment() -> Environment {
    detect_from(
        |name| std::env::var(name).ok(),
        std::env::current_exe().ok().as_deref(),
    )
}

fn detect_from(var: impl Fn(&str) -> Option<String>, exe: Option<&Path>) -> Environment {
    if let Some(value) = var(ENVIRONMENT_VAR) {
        match value.parse() {
            Ok(env) => return env,
            Err(err) => {
                tracing::warn!(target: targets::ENVIRONMENT, %err, "ignoring {ENVIRONMENT_VAR}")
            }
        }
    }
    if var(PREVIEW_VAR).is_some_and(|value| value.trim() == "1") {
        return Environment::Preview;
    }
    if var("RUST_TEST_THREADS").is_some() || exe.is_some_and(is_test_harness) {
        return Environment::Test;
    }
    Environment::Production
}

fn is_test_harness(exe: &Path) -> bool {
    exe.parent()
        .and_then(Path::file_name)
        .is_some_and(|dir| dir == "deps")
}
