// src/platform/macos/input.rs
//! Synthetic keyboard events through CGEventPost

use std::os::raw::c_void;

use crate::actions::KeyFlags;
use crate::error::ActionError;

type CGEventRef = *mut c_void;
type CGEventSourceRef = *mut c_void;
type CGKeyCode = u16;

#[repr(u32)]
#[derive(Clone, Copy)]
enum CGEventTapLocation {
    Hid = 0,
}

#[repr(i32)]
#[derive(Clone, Copy)]
enum CGEventSourceStateId {
    HidSystemState = 1,
}

#[link(name = "CoreGraphics", kind = "framework")]
extern "C" {
    fn CGEventSourceCreate(state: CGEventSourceStateId) -> CGEventSourceRef;
    fn CGEventCreateKeyboardEvent(
        source: CGEventSourceRef,
        keycode: CGKeyCode,
        key_down: bool,
    ) -> CGEventRef;
    fn CGEventSetFlags(event: CGEventRef, flags: u64);
    fn CGEventKeyboardSetUnicodeString(event: CGEventRef, length: usize, string: *const u16);
    fn CGEventPost(tap: CGEventTapLocation, event: CGEventRef);
}

#[link(name = "CoreFoundation", kind = "framework")]
extern "C" {
    fn CFRelease(cf: *const c_void);
}

/// Longest UTF-16 run a single keyboard event carries.
const CHUNK: usize = 20;

struct Source(CGEventSourceRef);

impl Source {
    fn new() -> Result<Self, ActionError> {
        let source = unsafe { CGEventSourceCreate(CGEventSourceStateId::HidSystemState) };
        if source.is_null() {
            return Err(ActionError::InputRejected("CGEventSourceCreate returned null".into()));
        }
        Ok(Self(source))
    }

    fn post_key(&self, keycode: u16, key_down: bool, flags: KeyFlags, text: Option<&[u16]>) -> Result<(), ActionError> {
        unsafe {
            let event = CGEventCreateKeyboardEvent(self.0, keycode, key_down);
            if event.is_null() {
                return Err(ActionError::InputRejected(format!("no event for keycode {}", keycode)));
            }
            CGEventSetFlags(event, flags.bits());
            if let Some(units) = text {
                CGEventKeyboardSetUnicodeString(event, units.len(), units.as_ptr());
            }
            CGEventPost(CGEventTapLocation::Hid, event);
            CFRelease(event as *const c_void);
        }
        Ok(())
    }
}

impl Drop for Source {
    fn drop(&mut self) {
        unsafe { CFRelease(self.0 as *const c_void) }
    }
}

pub fn press_key(keycode: u16, flags: KeyFlags) -> Result<(), ActionError> {
    let source = Source::new()?;
    source.post_key(keycode, true, flags, None)?;
    source.post_key(keycode, false, flags, None)
}

/// Types `text` as unicode keyboard events, independent of keyboard layout.
pub fn type_text(text: &str) -> Result<(), ActionError> {
    let source = Source::new()?;
    let units: Vec<u16> = text.encode_utf16().collect();
    for chunk in units.chunks(CHUNK) {
        source.post_key(0, true, KeyFlags::empty(), Some(chunk))?;
        source.post_key(0, false, KeyFlags::empty(), Some(chunk))?;
    }
    Ok(())
}
