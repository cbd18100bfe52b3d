// src/platform/macos/mod.rs
//! macOS backend: NSWorkspace + accessibility for observation, AppleScript
//! and CGEvent for actions.

mod accessibility;
mod front_window;
mod input;
mod navigation;

use std::time::Duration;

pub use accessibility::{AxPermissions, AxWindowProbe};
pub use front_window::frontmost_window_of;

use super::Platform;
use crate::actions::{ActionExecutor, KeyFlags};
use crate::core::signal_source::PollingSignalSource;
use crate::error::ActionError;

pub struct MacActionExecutor;

impl ActionExecutor for MacActionExecutor {
    fn frontmost_bundle_id(&self) -> Option<String> {
        accessibility::frontmost_app().map(|(_, bundle_id, _)| bundle_id)
    }

    fn load_url(&self, bundle_id: &str, url: &str) -> Result<(), ActionError> {
        navigation::load_url(bundle_id, url)
    }

    fn send_key(&self, keycode: u16, flags: KeyFlags) -> Result<(), ActionError> {
        input::press_key(keycode, flags)
    }

    fn type_text(&self, text: &str) -> Result<(), ActionError> {
        input::type_text(text)
    }
}

pub fn platform(poll_interval: Duration) -> Platform {
    Platform::new(
        PollingSignalSource::with_interval(AxWindowProbe::new(), poll_interval),
        MacActionExecutor,
        AxPermissions,
    )
}
