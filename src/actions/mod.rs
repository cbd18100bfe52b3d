// src/actions/mod.rs
//! Redirect actions against the frontmost browser window
//!
//! Two policies exist. Direct navigation asks the browser to load the target
//! through its scripting interface. Input simulation focuses the address bar
//! and types the target as synthetic keystrokes, which works for browsers
//! without a scripting interface.

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::enforcement::RedirectCommand;
use crate::error::ActionError;

bitflags::bitflags! {
    /// Modifier mask for synthetic key events (CGEventFlags values).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct KeyFlags: u64 {
        const SHIFT   = 0x0002_0000;
        const CONTROL = 0x0004_0000;
        const OPTION  = 0x0008_0000;
        const COMMAND = 0x0010_0000;
    }
}

/// ANSI virtual key codes used by the input plan.
pub mod keycode {
    pub const A: u16 = 0;
    pub const L: u16 = 37;
    pub const RETURN: u16 = 36;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedirectPolicy {
    #[default]
    DirectNavigation,
    InputSimulation,
}

/// OS-level side effects. Implementations must be callable from any thread.
pub trait ActionExecutor: Send + Sync {
    /// Bundle id of the frontmost application, if it can be determined.
    fn frontmost_bundle_id(&self) -> Option<String>;

    /// Loads `url` in the front window of `bundle_id` via scripting.
    fn load_url(&self, bundle_id: &str, url: &str) -> Result<(), ActionError>;

    fn send_key(&self, keycode: u16, flags: KeyFlags) -> Result<(), ActionError>;

    fn type_text(&self, text: &str) -> Result<(), ActionError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputStep {
    Key { keycode: u16, flags: KeyFlags },
    Text(String),
    Settle(Duration),
}

/// Cmd+L, select all, type the target, Return.
pub fn address_bar_sequence(url: &str) -> Vec<InputStep> {
    vec![
        InputStep::Key {
            keycode: keycode::L,
            flags: KeyFlags::COMMAND,
        },
        InputStep::Settle(Duration::from_millis(60)),
        InputStep::Key {
            keycode: keycode::A,
            flags: KeyFlags::COMMAND,
        },
        InputStep::Text(url.to_string()),
        InputStep::Settle(Duration::from_millis(30)),
        InputStep::Key {
            keycode: keycode::RETURN,
            flags: KeyFlags::empty(),
        },
    ]
}

/// Runs `steps` in order, stopping at the first failure.
pub fn run_sequence(executor: &dyn ActionExecutor, steps: &[InputStep]) -> Result<(), ActionError> {
    for step in steps {
        match step {
            InputStep::Key { keycode, flags } => executor.send_key(*keycode, *flags)?,
            InputStep::Text(text) => executor.type_text(text)?,
            InputStep::Settle(pause) => thread::sleep(*pause),
        }
    }
    Ok(())
}

/// Navigates the given browser to `url` under `policy`.
pub fn navigate(
    executor: &dyn ActionExecutor,
    bundle_id: &str,
    url: &str,
    policy: RedirectPolicy,
) -> Result<(), ActionError> {
    match policy {
        RedirectPolicy::DirectNavigation => executor.load_url(bundle_id, url),
        RedirectPolicy::InputSimulation => run_sequence(executor, &address_bar_sequence(url)),
    }
}

/// Executes one redirect attempt. Blocking; call from a worker thread.
///
/// Synthetic input goes to whatever is frontmost, so the attempt is refused
/// with [`ActionError::StaleTarget`] if the offending browser lost focus.
pub fn perform_redirect(
    executor: &dyn ActionExecutor,
    command: &RedirectCommand,
) -> Result<(), ActionError> {
    let expected = &command.identity.bundle_id;
    match executor.frontmost_bundle_id() {
        Some(actual) if actual.eq_ignore_ascii_case(expected) => {}
        actual => {
            return Err(ActionError::StaleTarget {
                expected: expected.clone(),
                actual: actual.unwrap_or_else(|| "nothing".to_string()),
            });
        }
    }

    debug!(
        identity = %command.identity,
        target = %command.target,
        policy = ?command.policy,
        "performing redirect"
    );
    navigate(executor, expected, &command.target, command.policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::window_types::WindowIdentity;
    use crate::extractors::NormalizedUrl;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Load(String, String),
        Key(u16, KeyFlags),
        Text(String),
    }

    struct Recorder {
        frontmost: Option<String>,
        calls: Mutex<Vec<Call>>,
        reject_text: bool,
    }

    impl Recorder {
        fn new(frontmost: Option<&str>) -> Self {
            Self {
                frontmost: frontmost.map(str::to_string),
                calls: Mutex::new(Vec::new()),
                reject_text: false,
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ActionExecutor for Recorder {
        fn frontmost_bundle_id(&self) -> Option<String> {
            self.frontmost.clone()
        }

        fn load_url(&self, bundle_id: &str, url: &str) -> Result<(), ActionError> {
            self.calls.lock().unwrap().push(Call::Load(bundle_id.into(), url.into()));
            Ok(())
        }

        fn send_key(&self, keycode: u16, flags: KeyFlags) -> Result<(), ActionError> {
            self.calls.lock().unwrap().push(Call::Key(keycode, flags));
            Ok(())
        }

        fn type_text(&self, text: &str) -> Result<(), ActionError> {
            if self.reject_text {
                return Err(ActionError::InputRejected("event source unavailable".into()));
            }
            self.calls.lock().unwrap().push(Call::Text(text.into()));
            Ok(())
        }
    }

    fn command(policy: RedirectPolicy) -> RedirectCommand {
        RedirectCommand {
            identity: WindowIdentity {
                bundle_id: "com.google.Chrome".into(),
                window_id: Some(9),
            },
            ticket: 1,
            target: "https://safe.example/".into(),
            policy,
            blocked_url: NormalizedUrl::parse("https://badsite.com").unwrap(),
            pattern: "badsite.com".into(),
        }
    }

    #[test]
    fn test_direct_navigation_loads_target() {
        let exec = Recorder::new(Some("com.google.Chrome"));
        perform_redirect(&exec, &command(RedirectPolicy::DirectNavigation)).unwrap();
        assert_eq!(
            exec.calls(),
            vec![Call::Load("com.google.Chrome".into(), "https://safe.example/".into())]
        );
    }

    #[test]
    fn test_input_simulation_types_into_address_bar() {
        let exec = Recorder::new(Some("com.google.Chrome"));
        perform_redirect(&exec, &command(RedirectPolicy::InputSimulation)).unwrap();
        assert_eq!(
            exec.calls(),
            vec![
                Call::Key(keycode::L, KeyFlags::COMMAND),
                Call::Key(keycode::A, KeyFlags::COMMAND),
                Call::Text("https://safe.example/".into()),
                Call::Key(keycode::RETURN, KeyFlags::empty()),
            ]
        );
    }

    #[test]
    fn test_stale_target_is_refused() {
        let exec = Recorder::new(Some("com.apple.finder"));
        let err = perform_redirect(&exec, &command(RedirectPolicy::InputSimulation)).unwrap_err();
        assert_eq!(
            err,
            ActionError::StaleTarget {
                expected: "com.google.Chrome".into(),
                actual: "com.apple.finder".into(),
            }
        );
        assert!(exec.calls().is_empty());

        let nobody = Recorder::new(None);
        assert!(matches!(
            perform_redirect(&nobody, &command(RedirectPolicy::DirectNavigation)),
            Err(ActionError::StaleTarget { .. })
        ));
    }

    #[test]
    fn test_sequence_stops_at_first_failure() {
        let mut exec = Recorder::new(Some("com.google.Chrome"));
        exec.reject_text = true;
        let err = perform_redirect(&exec, &command(RedirectPolicy::InputSimulation)).unwrap_err();
        assert!(matches!(err, ActionError::InputRejected(_)));
        // Return must not be pressed on a half-typed address bar
        assert_eq!(
            exec.calls(),
            vec![
                Call::Key(keycode::L, KeyFlags::COMMAND),
                Call::Key(keycode::A, KeyFlags::COMMAND),
            ]
        );
    }

    #[test]
    fn test_policy_serde_names() {
        assert_eq!(
            serde_json::to_string(&RedirectPolicy::InputSimulation).unwrap(),
            "\"input_simulation\""
        );
        let parsed: RedirectPolicy = serde_json::from_str("\"direct_navigation\"").unwrap();
        assert_eq!(parsed, RedirectPolicy::DirectNavigation);
    }
}
