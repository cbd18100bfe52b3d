// src/error.rs
//! Error types shared by the observer, the enforcement pipeline and the
//! action executors.

use thiserror::Error;

/// Errors surfaced by the public control surface.
#[derive(Debug, Error)]
pub enum GuardError {
    /// Accessibility permission is not granted. Fatal to `start_monitoring`.
    #[error("accessibility permission denied")]
    PermissionDenied,

    /// The OS subscription for window notifications could not be set up.
    #[error("window subscription failed: {0}")]
    SubscriptionFailed(String),

    /// A blocklist entry or redirect target was rejected; the previous
    /// configuration stays active.
    #[error("invalid configuration `{input}`: {reason}")]
    ConfigurationInvalid { input: String, reason: String },

    /// A direct action requested by the host failed.
    #[error(transparent)]
    Action(#[from] ActionError),

    /// The controller could not build its own async runtime.
    #[error("failed to start runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

impl GuardError {
    pub fn invalid(input: impl Into<String>, reason: impl Into<String>) -> Self {
        GuardError::ConfigurationInvalid {
            input: input.into(),
            reason: reason.into(),
        }
    }
}

/// Failures reported by an [`ActionExecutor`](crate::actions::ActionExecutor).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    /// The window the action was aimed at is no longer frontmost.
    #[error("target no longer frontmost (expected {expected}, found {actual})")]
    StaleTarget { expected: String, actual: String },

    /// The OS refused the synthetic event or the browser rejected the load.
    #[error("input rejected: {0}")]
    InputRejected(String),

    /// The requested action is not available for this browser or platform.
    #[error("unsupported action: {0}")]
    Unsupported(String),
}

impl ActionError {
    /// Whether a retry can reasonably succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ActionError::StaleTarget { .. } | ActionError::InputRejected(_)
        )
    }
}

/// Failures while sampling the frontmost window.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("accessibility permission denied")]
    PermissionDenied,
    #[error("probe unavailable: {0}")]
    Unavailable(String),
}

impl From<ProbeError> for GuardError {
    fn from(err: ProbeError) -> Self {
        match err {
            ProbeError::PermissionDenied => GuardError::PermissionDenied,
            ProbeError::Unavailable(reason) => GuardError::SubscriptionFailed(reason),
        }
    }
}

/// Failures while loading a settings file.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T, E = GuardError> = std::result::Result<T, E>;
