use thiserror::Error;

use crate::types::ScriptState;

/// Error taxonomy for every registry and lifecycle operation.
///
/// Values are cloneable so one in-flight start can hand the same outcome to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("a script named '{0}' is already installed")]
    DuplicateName(String),

    #[error("script not found: {0}")]
    NotFound(String),

    /// Carries the full resolution path, ending with the repeated name.
    #[error("circular dependency: {}", .0.join(" -> "))]
    CircularDependency(Vec<String>),

    #[error("missing dependency '{dependency}' required by '{required_by}' (no download URL)")]
    MissingDependency {
        dependency: String,
        required_by: String,
    },

    #[error("download failed: {}", .0.join("; "))]
    DownloadFailure(Vec<String>),

    #[error("execution of '{name}' failed: {message}")]
    ExecutionFailure { name: String, message: String },

    #[error("cannot {operation} '{name}' while it is {state}")]
    StateConflict {
        name: String,
        state: ScriptState,
        operation: String,
    },

    #[error("invalid script headers: {0}")]
    InvalidHeaders(String),
}

impl ScriptError {
    pub fn state_conflict(name: impl Into<String>, state: ScriptState, operation: &str) -> Self {
        Self::StateConflict {
            name: name.into(),
            state,
            operation: operation.to_string(),
        }
    }

    /// Wrap a collaborator failure raised while running a script's code.
    pub fn execution(name: impl Into<String>, cause: &anyhow::Error) -> Self {
        Self::ExecutionFailure {
            name: name.into(),
            message: format!("{cause:#}"),
        }
    }

    /// The cycle path for `CircularDependency`, if this is one.
    pub fn cycle_path(&self) -> Option<&[String]> {
        match self {
            Self::CircularDependency(path) => Some(path),
            _ => None,
        }
    }
}

pub type ScriptResult<T> = std::result::Result<T, ScriptError>;
