// src/extractors/browsers.rs
//! Known browser table.
//!
//! Everything browser-specific lives in this table: which bundle ids are
//! browsers, how their window titles are decorated, and how (if at all) they
//! accept a scripted URL load. Supporting a new browser is a new row.

/// How a browser accepts a direct "load this URL" instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptDialect {
    /// `set URL of active tab of front window to ...`
    Chromium,
    /// `set URL of front document to ...`
    WebKit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrowserProfile {
    pub bundle_id: &'static str,
    pub name: &'static str,
    /// Decorations appended to the page title in the window title.
    pub title_suffixes: &'static [&'static str],
    /// `None` when the browser has no usable scripting interface.
    pub dialect: Option<ScriptDialect>,
}

const CHROME_SUFFIXES: &[&str] = &[" - Google Chrome"];
const EDGE_SUFFIXES: &[&str] = &[" - Microsoft Edge", " - Microsoft\u{200b} Edge"];
const FIREFOX_SUFFIXES: &[&str] = &[" \u{2014} Mozilla Firefox", " - Mozilla Firefox"];
const NO_SUFFIXES: &[&str] = &[];

macro_rules! browser {
    ($bundle:expr, $name:expr, $suffixes:expr, $dialect:expr) => {
        BrowserProfile {
            bundle_id: $bundle,
            name: $name,
            title_suffixes: $suffixes,
            dialect: $dialect,
        }
    };
}

pub static KNOWN_BROWSERS: &[BrowserProfile] = &[
    // Chromium-based browsers
    browser!("com.google.Chrome", "Google Chrome", CHROME_SUFFIXES, Some(ScriptDialect::Chromium)),
    browser!("com.google.Chrome.beta", "Google Chrome Beta", CHROME_SUFFIXES, Some(ScriptDialect::Chromium)),
    browser!("com.google.Chrome.dev", "Google Chrome Dev", CHROME_SUFFIXES, Some(ScriptDialect::Chromium)),
    browser!("com.google.Chrome.canary", "Google Chrome Canary", CHROME_SUFFIXES, Some(ScriptDialect::Chromium)),
    browser!("org.chromium.Chromium", "Chromium", &[" - Chromium"], Some(ScriptDialect::Chromium)),
    browser!("com.microsoft.edgemac", "Microsoft Edge", EDGE_SUFFIXES, Some(ScriptDialect::Chromium)),
    browser!("com.microsoft.edgemac.Beta", "Microsoft Edge Beta", EDGE_SUFFIXES, Some(ScriptDialect::Chromium)),
    browser!("com.microsoft.edgemac.Dev", "Microsoft Edge Dev", EDGE_SUFFIXES, Some(ScriptDialect::Chromium)),
    browser!("com.brave.Browser", "Brave Browser", &[" - Brave"], Some(ScriptDialect::Chromium)),
    browser!("com.operasoftware.Opera", "Opera", &[" - Opera"], None),
    browser!("com.vivaldi.Vivaldi", "Vivaldi", &[" - Vivaldi"], Some(ScriptDialect::Chromium)),
    browser!("company.thebrowser.Browser", "Arc", NO_SUFFIXES, Some(ScriptDialect::Chromium)),
    // WebKit-based browsers
    browser!("com.apple.Safari", "Safari", NO_SUFFIXES, Some(ScriptDialect::WebKit)),
    browser!("com.apple.SafariTechnologyPreview", "Safari Technology Preview", NO_SUFFIXES, Some(ScriptDialect::WebKit)),
    browser!("com.kagi.kagimacOS", "Orion", NO_SUFFIXES, None),
    // Gecko-based browsers
    browser!("org.mozilla.firefox", "Firefox", FIREFOX_SUFFIXES, None),
    browser!("org.mozilla.firefoxdeveloperedition", "Firefox Developer Edition", FIREFOX_SUFFIXES, None),
    browser!("org.mozilla.nightly", "Firefox Nightly", FIREFOX_SUFFIXES, None),
    browser!("org.torproject.torbrowser", "Tor Browser", &[" - Tor Browser"], None),
];

/// Looks up a browser by exact bundle id (case-insensitive).
pub fn profile_for(bundle_id: &str) -> Option<&'static BrowserProfile> {
    KNOWN_BROWSERS
        .iter()
        .find(|p| p.bundle_id.eq_ignore_ascii_case(bundle_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_table_has_unique_bundle_ids() {
        let mut seen = HashSet::new();
        for profile in KNOWN_BROWSERS {
            assert!(
                seen.insert(profile.bundle_id.to_ascii_lowercase()),
                "duplicate entry for {}",
                profile.bundle_id
            );
        }
    }

    #[test]
    fn test_lookup_is_exact() {
        assert_eq!(profile_for("com.apple.safari").map(|p| p.name), Some("Safari"));
        assert!(profile_for("com.apple.Safari.helper").is_none());
        assert!(profile_for("com.microsoft.VSCode").is_none());
    }
}
