//! Crate-wide error type
//!
//! Errors fall into three families:
//! - configuration errors, raised before the first iteration
//! - state-consistency errors, raised when persisted or tracked state no
//!   longer matches the live model
//! - runtime errors, raised during an iteration; they halt the run
//!
//! Every variant names the component that raised it. Errors raised inside
//! the loop also carry the iteration.

use crate::hooks::HookEvent;
use thiserror::Error;

/// Result type alias for segmentar operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the training core.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration detected before training starts.
    #[error("Configuration error in {component}: {message}")]
    Config { component: String, message: String },

    /// Tracked state disagrees with the live model or a checkpoint.
    #[error("State consistency error in {component}: {message}")]
    StateConsistency { component: String, message: String },

    /// Failure inside the training loop that is not attributable to a hook.
    #[error("Runtime error in {component} at iteration {iteration}: {message}")]
    Runtime { component: String, iteration: usize, message: String },

    /// A collaborator call failed inside the training loop.
    #[error("{component} failed at iteration {iteration}: {source}")]
    Iteration {
        component: String,
        iteration: usize,
        #[source]
        source: Box<Error>,
    },

    /// A hook failed while handling an event.
    #[error("Hook '{hook}' failed during {event} at iteration {iteration}: {source}")]
    Hook {
        hook: String,
        event: HookEvent,
        iteration: usize,
        #[source]
        source: Box<Error>,
    },

    /// IO error with context.
    #[error("IO error: {context}\n  Cause: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create a configuration error.
    pub fn config(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config { component: component.into(), message: message.into() }
    }

    /// Create a state-consistency error.
    pub fn state(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StateConsistency { component: component.into(), message: message.into() }
    }

    /// Create a runtime error.
    pub fn runtime(
        component: impl Into<String>,
        iteration: usize,
        message: impl Into<String>,
    ) -> Self {
        Self::Runtime { component: component.into(), iteration, message: message.into() }
    }

    /// Attach component and iteration context to a collaborator failure.
    pub fn at_iteration(component: impl Into<String>, iteration: usize, source: Error) -> Self {
        Self::Iteration { component: component.into(), iteration, source: Box::new(source) }
    }

    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io { context: context.into(), source }
    }

    /// Name of the component that raised this error.
    pub fn component(&self) -> &str {
        match self {
            Self::Config { component, .. }
            | Self::StateConsistency { component, .. }
            | Self::Runtime { component, .. }
            | Self::Iteration { component, .. } => component,
            Self::Hook { hook, .. } => hook,
            Self::Io { .. } => "io",
            Self::Serialization(_) => "serialization",
        }
    }

    /// Iteration at which the error occurred, when raised inside the loop.
    pub fn iteration(&self) -> Option<usize> {
        match self {
            Self::Runtime { iteration, .. }
            | Self::Iteration { iteration, .. }
            | Self::Hook { iteration, .. } => Some(*iteration),
            _ => None,
        }
    }

    /// Check whether this error (or the error it wraps) is a configuration error.
    pub fn is_config(&self) -> bool {
        match self {
            Self::Config { .. } => true,
            Self::Iteration { source, .. } | Self::Hook { source, .. } => source.is_config(),
            _ => false,
        }
    }

    /// Check whether this error (or the error it wraps) is a state-consistency error.
    pub fn is_state_consistency(&self) -> bool {
        match self {
            Self::StateConsistency { .. } => true,
            Self::Iteration { source, .. } | Self::Hook { source, .. } => {
                source.is_state_consistency()
            }
            _ => false,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(format!("JSON: {e}"))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Serialization(format!("YAML: {e}"))
    }
}
