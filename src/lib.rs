//! Focus Guard Library
//!
//! Watches the frontmost window, recognizes browsers, extracts the page URL
//! and redirects windows that land on a blocked domain. The observation and
//! enforcement core is platform independent; OS access lives behind the
//! traits in [`platform`], [`actions`] and [`core::signal_source`].

#![deny(unsafe_op_in_unsafe_fn)]

pub mod actions;
pub mod config;
pub mod core;
pub mod error;
pub mod extractors;
pub mod ffi_api;
pub mod platform;

pub use crate::core::controller::ObserverController;
pub use crate::error::{ActionError, GuardError};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::actions::{ActionExecutor, KeyFlags, RedirectPolicy};
    pub use crate::config::GuardSettings;
    pub use crate::core::{
        Configuration, EnforcementFailure, EpisodeState, ManualSignalSource, ObserverController,
        RetryPolicy, WindowEvent, WindowIdentity, WindowSignalSource,
    };
    pub use crate::error::{ActionError, GuardError, ProbeError};
    pub use crate::extractors::{Extraction, NormalizedUrl, UrlExtractor};
    pub use crate::platform::{PermissionBroker, Platform};
}
