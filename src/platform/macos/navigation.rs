// src/platform/macos/navigation.rs
//! URL reads and direct loads through each browser's AppleScript dictionary

use std::process::Command;

use tracing::{debug, trace};

use crate::error::ActionError;
use crate::extractors::{profile_for, ScriptDialect};

/// Escapes a value for use inside an AppleScript string literal.
fn quote(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace(['\n', '\r'], " ")
}

pub(super) fn script_for(dialect: ScriptDialect, bundle_id: &str, url: &str) -> String {
    let bundle_id = quote(bundle_id);
    let url = quote(url);
    match dialect {
        ScriptDialect::Chromium => format!(
            r#"tell application id "{}" to set URL of active tab of front window to "{}""#,
            bundle_id, url
        ),
        ScriptDialect::WebKit => format!(
            r#"tell application id "{}" to set URL of front document to "{}""#,
            bundle_id, url
        ),
    }
}

pub(super) fn read_script_for(dialect: ScriptDialect, bundle_id: &str) -> String {
    let bundle_id = quote(bundle_id);
    match dialect {
        ScriptDialect::Chromium => format!(
            r#"tell application id "{}" to get URL of active tab of front window"#,
            bundle_id
        ),
        ScriptDialect::WebKit => format!(
            r#"tell application id "{}" to get URL of front document"#,
            bundle_id
        ),
    }
}

fn dialect_of(bundle_id: &str) -> Option<ScriptDialect> {
    profile_for(bundle_id).and_then(|p| p.dialect)
}

/// Runs `script`; stdout on success, stderr as the error.
fn run_osascript(script: &str) -> Result<String, String> {
    let output = Command::new("osascript")
        .arg("-e")
        .arg(script)
        .output()
        .map_err(|e| format!("failed to run osascript: {}", e))?;
    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        Err(String::from_utf8_lossy(&output.stderr).trim().to_string())
    }
}

/// URL of the active tab, for browsers that do not expose it through the
/// accessibility tree. `None` when the browser is not scriptable or refuses.
pub fn current_url(bundle_id: &str) -> Option<String> {
    let dialect = dialect_of(bundle_id)?;
    match run_osascript(&read_script_for(dialect, bundle_id)) {
        Ok(url) if !url.is_empty() && url != "missing value" => Some(url),
        Ok(_) => None,
        Err(reason) => {
            trace!(%bundle_id, %reason, "could not read browser URL");
            None
        }
    }
}

pub fn load_url(bundle_id: &str, url: &str) -> Result<(), ActionError> {
    let dialect = dialect_of(bundle_id)
        .ok_or_else(|| ActionError::Unsupported(format!("{} has no scripting interface", bundle_id)))?;

    debug!(%bundle_id, "running navigation script");
    run_osascript(&script_for(dialect, bundle_id, url))
        .map(|_| ())
        .map_err(ActionError::InputRejected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_escapes_quotes() {
        let script = script_for(ScriptDialect::WebKit, "com.apple.Safari", "https://a.example/?q=\"x\"");
        assert_eq!(
            script,
            r#"tell application id "com.apple.Safari" to set URL of front document to "https://a.example/?q=\"x\"""#
        );
    }

    #[test]
    fn test_read_script_per_dialect() {
        assert_eq!(
            read_script_for(ScriptDialect::Chromium, "com.brave.Browser"),
            r#"tell application id "com.brave.Browser" to get URL of active tab of front window"#
        );
        assert_eq!(
            read_script_for(ScriptDialect::WebKit, "com.apple.Safari"),
            r#"tell application id "com.apple.Safari" to get URL of front document"#
        );
    }

    #[test]
    fn test_unscriptable_browser_has_no_url() {
        assert_eq!(current_url("org.mozilla.firefox"), None);
        assert_eq!(current_url("com.microsoft.VSCode"), None);
    }

    #[test]
    fn test_browser_without_dialect_is_unsupported() {
        assert!(matches!(
            load_url("org.mozilla.firefox", "https://safe.example/"),
            Err(ActionError::Unsupported(_))
        ));
    }
}
