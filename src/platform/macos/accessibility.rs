// src/platform/macos/accessibility.rs
//! Accessibility-backed window probe and permission broker

use std::sync::{Mutex, PoisonError};

use accessibility_sys::{
    kAXDocumentAttribute, kAXErrorSuccess, kAXFocusedWindowAttribute, kAXTitleAttribute,
    kAXURLAttribute, AXIsProcessTrusted, AXIsProcessTrustedWithOptions,
    AXUIElementCopyAttributeValue, AXUIElementCreateApplication, AXUIElementRef,
};
use core_foundation::base::{CFRelease, TCFType};
use core_foundation::boolean::CFBoolean;
use core_foundation::dictionary::CFDictionary;
use core_foundation::string::{CFString, CFStringRef};
use core_foundation_sys::base::{CFGetTypeID, CFTypeRef};
use core_foundation_sys::string::CFStringGetTypeID;
use core_foundation_sys::url::{CFURLGetString, CFURLGetTypeID, CFURLRef};
use objc2::rc::Retained;
use objc2_app_kit::NSWorkspace;
use objc2_foundation::NSString;
use tracing::trace;

use super::{front_window, navigation};
use crate::core::signal_source::WindowProbe;
use crate::core::window_types::WindowEvent;
use crate::error::ProbeError;
use crate::platform::PermissionBroker;

pub struct AxPermissions;

impl PermissionBroker for AxPermissions {
    fn is_trusted(&self) -> bool {
        unsafe { AXIsProcessTrusted() }
    }

    fn request(&self) -> bool {
        let key = CFString::new("AXTrustedCheckOptionPrompt");
        let options = CFDictionary::from_CFType_pairs(&[(key.as_CFType(), CFBoolean::true_value().as_CFType())]);
        unsafe { AXIsProcessTrustedWithOptions(options.as_concrete_TypeRef()) }
    }
}

/// Reads the frontmost app from NSWorkspace and its focused window from the
/// accessibility tree.
///
/// Chromium browsers expose neither `AXDocument` nor `AXURL`, so their URL is
/// read through AppleScript. Each read spawns `osascript`, so the result is
/// cached per (window, title).
#[derive(Default)]
pub struct AxWindowProbe {
    scripted: Mutex<Option<ScriptedRead>>,
}

struct ScriptedRead {
    bundle_id: String,
    window_id: Option<u64>,
    title: String,
    url: Option<String>,
}

impl AxWindowProbe {
    pub fn new() -> Self {
        Self::default()
    }

    fn scripted_url(&self, bundle_id: &str, window_id: Option<u64>, title: &str) -> Option<String> {
        {
            let cache = self.scripted.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(read) = cache.as_ref() {
                if read.bundle_id == bundle_id && read.window_id == window_id && read.title == title {
                    return read.url.clone();
                }
            }
        }
        let url = navigation::current_url(bundle_id);
        *self.scripted.lock().unwrap_or_else(PoisonError::into_inner) = Some(ScriptedRead {
            bundle_id: bundle_id.to_string(),
            window_id,
            title: title.to_string(),
            url: url.clone(),
        });
        url
    }
}

impl WindowProbe for AxWindowProbe {
    fn prepare(&self) -> Result<(), ProbeError> {
        if unsafe { AXIsProcessTrusted() } {
            Ok(())
        } else {
            Err(ProbeError::PermissionDenied)
        }
    }

    fn sample(&self) -> Result<Option<WindowEvent>, ProbeError> {
        let Some((pid, bundle_id, app_name)) = frontmost_app() else {
            return Ok(None);
        };
        let Some(window) = FocusedWindow::of(pid) else {
            trace!(pid, %bundle_id, "frontmost app has no focused window");
            return Ok(None);
        };

        let title = window.string(kAXTitleAttribute).unwrap_or_default();
        let window_id = front_window::frontmost_window_of(pid);
        let url = window
            .string(kAXDocumentAttribute)
            .or_else(|| window.url(kAXURLAttribute))
            .or_else(|| self.scripted_url(&bundle_id, window_id, &title));
        let mut event = WindowEvent::new(app_name, title, bundle_id, url);
        if let Some(id) = window_id {
            event = event.with_window_id(id);
        }
        Ok(Some(event))
    }
}

/// `(pid, bundle id, localized name)` of the frontmost application.
pub(super) fn frontmost_app() -> Option<(i32, String, String)> {
    unsafe {
        let workspace = NSWorkspace::sharedWorkspace();
        let front = workspace.frontmostApplication()?;
        let bundle: Retained<NSString> = front.bundleIdentifier()?;
        let bundle_id = bundle.to_string();
        let name = front
            .localizedName()
            .map(|s| s.to_string())
            .unwrap_or_else(|| bundle_id.clone());
        Some((front.processIdentifier(), bundle_id, name))
    }
}

/// Owned AX references for an app and its focused window.
struct FocusedWindow {
    app: AXUIElementRef,
    window: AXUIElementRef,
}

impl FocusedWindow {
    fn of(pid: i32) -> Option<Self> {
        unsafe {
            let app = AXUIElementCreateApplication(pid);
            if app.is_null() {
                return None;
            }
            let attr = CFString::from_static_string(kAXFocusedWindowAttribute);
            let mut window: CFTypeRef = std::ptr::null();
            let status =
                AXUIElementCopyAttributeValue(app, attr.as_concrete_TypeRef(), &mut window);
            if status != kAXErrorSuccess || window.is_null() {
                CFRelease(app as CFTypeRef);
                return None;
            }
            Some(Self {
                app,
                window: window as AXUIElementRef,
            })
        }
    }

    fn copy(&self, attribute: &'static str) -> Option<CFTypeRef> {
        let attr = CFString::from_static_string(attribute);
        let mut value: CFTypeRef = std::ptr::null();
        let status = unsafe {
            AXUIElementCopyAttributeValue(self.window, attr.as_concrete_TypeRef(), &mut value)
        };
        (status == kAXErrorSuccess && !value.is_null()).then_some(value)
    }

    fn string(&self, attribute: &'static str) -> Option<String> {
        let value = self.copy(attribute)?;
        unsafe {
            if CFGetTypeID(value) != CFStringGetTypeID() {
                CFRelease(value);
                return None;
            }
            let s = CFString::wrap_under_create_rule(value as CFStringRef).to_string();
            (!s.is_empty()).then_some(s)
        }
    }

    fn url(&self, attribute: &'static str) -> Option<String> {
        let value = self.copy(attribute)?;
        unsafe {
            let result = if CFGetTypeID(value) == CFURLGetTypeID() {
                let s = CFURLGetString(value as CFURLRef);
                (!s.is_null()).then(|| CFString::wrap_under_get_rule(s).to_string())
            } else {
                None
            };
            CFRelease(value);
            result
        }
    }
}

impl Drop for FocusedWindow {
    fn drop(&mut self) {
        unsafe {
            CFRelease(self.window as CFTypeRef);
            CFRelease(self.app as CFTypeRef);
        }
    }
}
