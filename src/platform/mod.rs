// src/platform/mod.rs
//! OS backends
//!
//! A [`Platform`] bundles the three OS-facing pieces the controller needs:
//! a window signal source, an action executor and a permission broker.
//! macOS gets the accessibility backend; elsewhere everything reports
//! unsupported and monitoring cannot start.

#[cfg(target_os = "macos")]
pub mod macos;

use std::sync::Arc;
use std::time::Duration;

use crate::actions::{ActionExecutor, KeyFlags};
use crate::core::signal_source::{ManualSignalSource, WindowSignalSource};
use crate::error::ActionError;

/// Accessibility trust checks.
pub trait PermissionBroker: Send + Sync {
    fn is_trusted(&self) -> bool;

    /// Asks the OS to show its permission prompt. Returns the trust state
    /// at the time of the call; the user may grant access later.
    fn request(&self) -> bool;
}

pub struct Platform {
    pub source: Box<dyn WindowSignalSource>,
    pub executor: Arc<dyn ActionExecutor>,
    pub permissions: Arc<dyn PermissionBroker>,
}

impl Platform {
    pub fn new(
        source: impl WindowSignalSource + 'static,
        executor: impl ActionExecutor + 'static,
        permissions: impl PermissionBroker + 'static,
    ) -> Self {
        Self {
            source: Box::new(source),
            executor: Arc::new(executor),
            permissions: Arc::new(permissions),
        }
    }
}

/// The backend for the current OS, polling every `poll_interval`.
pub fn native(poll_interval: Duration) -> Platform {
    #[cfg(target_os = "macos")]
    {
        macos::platform(poll_interval)
    }
    #[cfg(not(target_os = "macos"))]
    {
        let _ = poll_interval;
        unsupported()
    }
}

/// Backend whose permission check always fails.
pub fn unsupported() -> Platform {
    Platform::new(ManualSignalSource::new(), UnsupportedExecutor, Untrusted)
}

pub struct Untrusted;

impl PermissionBroker for Untrusted {
    fn is_trusted(&self) -> bool {
        false
    }

    fn request(&self) -> bool {
        false
    }
}

pub struct UnsupportedExecutor;

impl UnsupportedExecutor {
    fn refuse(&self) -> ActionError {
        ActionError::Unsupported(format!("no action backend for {}", std::env::consts::OS))
    }
}

impl ActionExecutor for UnsupportedExecutor {
    fn frontmost_bundle_id(&self) -> Option<String> {
        None
    }

    fn load_url(&self, _bundle_id: &str, _url: &str) -> Result<(), ActionError> {
        Err(self.refuse())
    }

    fn send_key(&self, _keycode: u16, _flags: KeyFlags) -> Result<(), ActionError> {
        Err(self.refuse())
    }

    fn type_text(&self, _text: &str) -> Result<(), ActionError> {
        Err(self.refuse())
    }
}
