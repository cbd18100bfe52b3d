// src/ffi_api.rs
//! C ABI over a process-global controller
//!
//! Every function returns an `int` status: `0` for success, `1`/`0` for
//! boolean queries, negative values for errors (see the `STATUS_*`
//! constants). Strings are borrowed NUL-terminated UTF-8; strings passed to
//! the window callback are only valid for the duration of the call.

use std::ffi::{CStr, CString};
use std::sync::OnceLock;

use libc::{c_char, c_int};

use tracing::error;

use crate::actions::KeyFlags;
use crate::core::controller::ObserverController;
use crate::core::signal_source::DEFAULT_POLL_INTERVAL;
use crate::core::window_types::WindowEvent;
use crate::error::GuardError;
use crate::platform;

pub const STATUS_OK: c_int = 0;
pub const STATUS_PERMISSION_DENIED: c_int = -1;
pub const STATUS_SUBSCRIPTION_FAILED: c_int = -2;
pub const STATUS_INVALID_CONFIGURATION: c_int = -3;
pub const STATUS_ACTION_FAILED: c_int = -4;
pub const STATUS_INVALID_ARGUMENT: c_int = -5;
pub const STATUS_UNAVAILABLE: c_int = -6;

/// `(app_name, window_title, bundle_id, url)`; `url` may be null.
pub type WindowChangeCallback =
    extern "C" fn(*const c_char, *const c_char, *const c_char, *const c_char);

static CONTROLLER: OnceLock<Option<ObserverController>> = OnceLock::new();

fn controller() -> Option<&'static ObserverController> {
    CONTROLLER
        .get_or_init(|| {
            match ObserverController::new(platform::native(DEFAULT_POLL_INTERVAL)) {
                Ok(controller) => Some(controller),
                Err(err) => {
                    error!(error = %err, "failed to create controller");
                    None
                }
            }
        })
        .as_ref()
}

fn status_of(result: Result<(), GuardError>) -> c_int {
    match result {
        Ok(()) => STATUS_OK,
        Err(GuardError::PermissionDenied) => STATUS_PERMISSION_DENIED,
        Err(GuardError::SubscriptionFailed(_)) => STATUS_SUBSCRIPTION_FAILED,
        Err(GuardError::ConfigurationInvalid { .. }) => STATUS_INVALID_CONFIGURATION,
        Err(GuardError::Action(_)) => STATUS_ACTION_FAILED,
        Err(GuardError::Runtime(_)) => STATUS_UNAVAILABLE,
    }
}

/// # Safety
/// `ptr` must be null or point to a NUL-terminated string.
unsafe fn borrow_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().ok()
}

macro_rules! with_controller {
    ($ctl:ident => $body:expr) => {
        match controller() {
            Some($ctl) => $body,
            None => STATUS_UNAVAILABLE,
        }
    };
}

/// # Safety
/// `domains` must point to `len` valid string pointers (or be null when
/// `len` is 0); `redirect_url` must be a valid string pointer.
#[no_mangle]
pub unsafe extern "C" fn focus_guard_set_blocked_domains(
    domains: *const *const c_char,
    len: usize,
    redirect_url: *const c_char,
) -> c_int {
    let Some(redirect) = (unsafe { borrow_str(redirect_url) }) else {
        return STATUS_INVALID_ARGUMENT;
    };
    if domains.is_null() && len > 0 {
        return STATUS_INVALID_ARGUMENT;
    }

    let mut list = Vec::with_capacity(len);
    for i in 0..len {
        match unsafe { borrow_str(*domains.add(i)) } {
            Some(domain) => list.push(domain),
            None => return STATUS_INVALID_ARGUMENT,
        }
    }
    with_controller!(ctl => status_of(ctl.set_blocked_domains(list, redirect)))
}

#[no_mangle]
pub extern "C" fn focus_guard_set_enabled(enabled: bool) -> c_int {
    with_controller!(ctl => {
        ctl.set_enabled(enabled);
        STATUS_OK
    })
}

#[no_mangle]
pub extern "C" fn focus_guard_start_monitoring() -> c_int {
    with_controller!(ctl => status_of(ctl.start_monitoring()))
}

#[no_mangle]
pub extern "C" fn focus_guard_stop_monitoring() -> c_int {
    with_controller!(ctl => {
        ctl.stop_monitoring();
        STATUS_OK
    })
}

#[no_mangle]
pub extern "C" fn focus_guard_is_monitoring() -> c_int {
    with_controller!(ctl => c_int::from(ctl.is_active()))
}

#[no_mangle]
pub extern "C" fn focus_guard_request_accessibility_permissions() -> c_int {
    with_controller!(ctl => c_int::from(ctl.request_permissions()))
}

/// # Safety
/// `url` must be null or a valid string pointer.
#[no_mangle]
pub unsafe extern "C" fn focus_guard_control_browser_with_url(url: *const c_char) -> c_int {
    let Some(url) = (unsafe { borrow_str(url) }) else {
        return STATUS_INVALID_ARGUMENT;
    };
    with_controller!(ctl => status_of(ctl.control_browser_with_url(url)))
}

#[no_mangle]
pub extern "C" fn focus_guard_simulate_key_press(keycode: u16, flags: u64) -> c_int {
    with_controller!(ctl => status_of(ctl.simulate_key_press(keycode, KeyFlags::from_bits_truncate(flags))))
}

/// Registers (or with `None`, clears) the window-change callback.
#[no_mangle]
pub extern "C" fn focus_guard_set_window_callback(callback: Option<WindowChangeCallback>) -> c_int {
    with_controller!(ctl => {
        match callback {
            Some(cb) => ctl.on_window_change(move |event: &WindowEvent| invoke(cb, event)),
            None => ctl.clear_window_listener(),
        }
        STATUS_OK
    })
}

fn invoke(cb: WindowChangeCallback, event: &WindowEvent) {
    // Interior NULs cannot cross the boundary; drop them rather than the event
    let c = |s: &str| CString::new(s.replace('\0', "")).unwrap_or_default();
    let app = c(&event.app_name);
    let title = c(&event.window_title);
    let bundle = c(&event.bundle_id);
    let url = event.url.as_deref().map(c);
    cb(
        app.as_ptr(),
        title.as_ptr(),
        bundle.as_ptr(),
        url.as_ref().map_or(std::ptr::null(), |u| u.as_ptr()),
    );
}

/// Feeds an externally observed window change into the pipeline.
///
/// # Safety
/// `app`, `title` and `bundle` must be valid string pointers; `url` may be
/// null.
#[no_mangle]
pub unsafe extern "C" fn focus_guard_push_window_event(
    app: *const c_char,
    title: *const c_char,
    bundle: *const c_char,
    url: *const c_char,
) -> c_int {
    let (Some(app), Some(title), Some(bundle)) =
        (unsafe { (borrow_str(app), borrow_str(title), borrow_str(bundle)) })
    else {
        return STATUS_INVALID_ARGUMENT;
    };
    let url = if url.is_null() {
        None
    } else {
        match unsafe { borrow_str(url) } {
            Some(url) => Some(url.to_string()),
            None => return STATUS_INVALID_ARGUMENT,
        }
    };
    with_controller!(ctl => {
        ctl.ingest(&WindowEvent::new(app, title, bundle, url));
        STATUS_OK
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(status_of(Ok(())), STATUS_OK);
        assert_eq!(status_of(Err(GuardError::PermissionDenied)), STATUS_PERMISSION_DENIED);
        assert_eq!(
            status_of(Err(GuardError::invalid("x", "bad"))),
            STATUS_INVALID_CONFIGURATION
        );
    }

    #[test]
    fn test_null_arguments_rejected() {
        unsafe {
            assert_eq!(
                focus_guard_set_blocked_domains(std::ptr::null(), 1, c"https://safe.example".as_ptr()),
                STATUS_INVALID_ARGUMENT
            );
            assert_eq!(
                focus_guard_set_blocked_domains(std::ptr::null(), 0, std::ptr::null()),
                STATUS_INVALID_ARGUMENT
            );
            assert_eq!(focus_guard_control_browser_with_url(std::ptr::null()), STATUS_INVALID_ARGUMENT);
            assert_eq!(
                focus_guard_push_window_event(std::ptr::null(), std::ptr::null(), std::ptr::null(), std::ptr::null()),
                STATUS_INVALID_ARGUMENT
            );
        }
    }

    #[test]
    fn test_blocked_domains_through_abi() {
        let domains = [c"badsite.com".as_ptr(), c"news.example".as_ptr()];
        let status = unsafe {
            focus_guard_set_blocked_domains(domains.as_ptr(), domains.len(), c"https://safe.example".as_ptr())
        };
        assert_eq!(status, STATUS_OK);

        let bad = [c"https://badsite.com".as_ptr()];
        let status = unsafe {
            focus_guard_set_blocked_domains(bad.as_ptr(), bad.len(), c"https://safe.example".as_ptr())
        };
        assert_eq!(status, STATUS_INVALID_CONFIGURATION);
    }
}
