// src/platform/macos/front_window.rs
//! Window numbers from the CoreGraphics window list
//!
//! The accessibility API has no stable window id, so the episode key comes
//! from the topmost layer-0 window owned by the frontmost process.

#![allow(non_upper_case_globals)]

use std::os::raw::c_void;

type CFIndex = isize;
type CFStringRef = *const c_void;
type CFArrayRef = *const c_void;
type CFDictionaryRef = *const c_void;
type CFTypeRef = *const c_void;

#[link(name = "CoreFoundation", kind = "framework")]
extern "C" {
    fn CFArrayGetCount(theArray: CFArrayRef) -> CFIndex;
    fn CFArrayGetValueAtIndex(theArray: CFArrayRef, idx: CFIndex) -> *const c_void;
    fn CFDictionaryGetValue(theDict: CFDictionaryRef, key: CFTypeRef) -> *const c_void;
    fn CFNumberGetValue(cf: CFTypeRef, theType: i32, valuePtr: *mut c_void) -> bool;
    fn CFRelease(cf: CFTypeRef);
}

const kCFNumberSInt32Type: i32 = 3;
const kCFNumberSInt64Type: i32 = 4;

type CGWindowID = u32;
type CGWindowListOption = u32;

const kCGWindowListOptionOnScreenOnly: CGWindowListOption = 1;
const kCGWindowListExcludeDesktopElements: CGWindowListOption = 1 << 4;
const kCGNullWindowID: CGWindowID = 0;

#[link(name = "CoreGraphics", kind = "framework")]
extern "C" {
    fn CGWindowListCopyWindowInfo(
        options: CGWindowListOption,
        relativeToWindow: CGWindowID,
    ) -> CFArrayRef;

    static kCGWindowOwnerPID: CFStringRef;
    static kCGWindowLayer: CFStringRef;
    static kCGWindowNumber: CFStringRef;
}

/// # Safety
/// `dict` must be a live CFDictionary.
unsafe fn number_i32(dict: CFDictionaryRef, key: CFStringRef) -> Option<i32> {
    let mut out: i32 = 0;
    unsafe {
        let value = CFDictionaryGetValue(dict, key as CFTypeRef);
        (!value.is_null()
            && CFNumberGetValue(value, kCFNumberSInt32Type, &mut out as *mut i32 as *mut c_void))
        .then_some(out)
    }
}

/// # Safety
/// `dict` must be a live CFDictionary.
unsafe fn number_i64(dict: CFDictionaryRef, key: CFStringRef) -> Option<i64> {
    let mut out: i64 = 0;
    unsafe {
        let value = CFDictionaryGetValue(dict, key as CFTypeRef);
        (!value.is_null()
            && CFNumberGetValue(value, kCFNumberSInt64Type, &mut out as *mut i64 as *mut c_void))
        .then_some(out)
    }
}

/// Window number of the topmost on-screen normal-layer window belonging to
/// `pid`. The list is ordered front to back.
pub fn frontmost_window_of(pid: i32) -> Option<u64> {
    unsafe {
        let options = kCGWindowListOptionOnScreenOnly | kCGWindowListExcludeDesktopElements;
        let windows = CGWindowListCopyWindowInfo(options, kCGNullWindowID);
        if windows.is_null() {
            return None;
        }

        let mut found = None;
        for i in 0..CFArrayGetCount(windows) {
            let dict = CFArrayGetValueAtIndex(windows, i) as CFDictionaryRef;
            if dict.is_null() {
                continue;
            }
            if number_i32(dict, kCGWindowLayer) != Some(0) {
                continue;
            }
            if number_i32(dict, kCGWindowOwnerPID) != Some(pid) {
                continue;
            }
            if let Some(number) = number_i64(dict, kCGWindowNumber) {
                found = Some(number as u64);
                break;
            }
        }

        CFRelease(windows);
        found
    }
}
