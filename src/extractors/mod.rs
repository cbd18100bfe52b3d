// src/extractors/mod.rs
//! Browser URL extraction from raw window events
//!
//! Extraction is string parsing only: no network, no DOM access, no OS calls.
//! Malformed or partial input degrades to [`Extraction::Unknown`].

pub mod browsers;

use std::fmt;

use serde::Serialize;
use url::Url;

use crate::core::window_types::WindowEvent;

pub use browsers::{profile_for, BrowserProfile, ScriptDialect, KNOWN_BROWSERS};

/// A URL reduced to `scheme://host/path`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct NormalizedUrl {
    scheme: String,
    host: String,
    path: String,
}

impl NormalizedUrl {
    /// Parses an http(s) URL. Input without a scheme is accepted when it
    /// starts with something that looks like a host (`example.com/page`).
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() || raw.chars().any(char::is_whitespace) {
            return None;
        }

        let has_scheme = raw.contains("://");
        let url = if has_scheme {
            Url::parse(raw).ok()?
        } else {
            Url::parse(&format!("https://{}", raw)).ok()?
        };

        let scheme = url.scheme();
        if scheme != "http" && scheme != "https" {
            return None;
        }

        let host = url.host_str()?.trim_end_matches('.').to_ascii_lowercase();
        if host.is_empty() {
            return None;
        }
        if !has_scheme && !plausible_bare_host(&host) {
            return None;
        }

        Some(Self {
            scheme: scheme.to_string(),
            host,
            path: url.path().to_string(),
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for NormalizedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", self.scheme, self.host, self.path)
    }
}

/// `localhost`, or a dotted name whose last label is alphabetic.
fn plausible_bare_host(host: &str) -> bool {
    if host == "localhost" {
        return true;
    }
    let mut labels = host.rsplit('.');
    let tld = labels.next().unwrap_or_default();
    let has_more = labels.next().is_some();
    has_more
        && (tld.starts_with("xn--")
            || (tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic())))
}

/// Why no URL came out of an event. Not an error; the pipeline treats it as
/// non-actionable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownReason {
    UnrecognizedBrowser,
    NoUrl,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Url(NormalizedUrl),
    Unknown(UnknownReason),
}

impl Extraction {
    pub fn url(&self) -> Option<&NormalizedUrl> {
        match self {
            Extraction::Url(url) => Some(url),
            Extraction::Unknown(_) => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Extraction::Unknown(_))
    }
}

/// Derives normalized URLs from window events of recognized browsers.
#[derive(Debug, Clone)]
pub struct UrlExtractor {
    profiles: Vec<BrowserProfile>,
}

impl UrlExtractor {
    pub fn new() -> Self {
        Self::with_profiles(KNOWN_BROWSERS.iter().copied())
    }

    pub fn with_profiles(profiles: impl IntoIterator<Item = BrowserProfile>) -> Self {
        Self {
            profiles: profiles.into_iter().collect(),
        }
    }

    /// Adds or replaces the row for `profile.bundle_id`.
    pub fn add_profile(&mut self, profile: BrowserProfile) {
        self.profiles
            .retain(|p| !p.bundle_id.eq_ignore_ascii_case(profile.bundle_id));
        self.profiles.push(profile);
    }

    pub fn profile(&self, bundle_id: &str) -> Option<&BrowserProfile> {
        self.profiles
            .iter()
            .find(|p| p.bundle_id.eq_ignore_ascii_case(bundle_id))
    }

    pub fn is_browser(&self, bundle_id: &str) -> bool {
        self.profile(bundle_id).is_some()
    }

    pub fn extract(&self, event: &WindowEvent) -> Extraction {
        let Some(profile) = self.profile(&event.bundle_id) else {
            return Extraction::Unknown(UnknownReason::UnrecognizedBrowser);
        };

        if let Some(url) = event.url.as_deref().and_then(NormalizedUrl::parse) {
            return Extraction::Url(url);
        }

        match Self::url_from_title(&event.window_title, profile) {
            Some(url) => Extraction::Url(url),
            None => Extraction::Unknown(UnknownReason::NoUrl),
        }
    }

    fn url_from_title(title: &str, profile: &BrowserProfile) -> Option<NormalizedUrl> {
        // An explicit URL anywhere in the title
        let explicit = title
            .split_whitespace()
            .map(|token| {
                token.trim_matches(|c: char| {
                    matches!(c, '(' | ')' | '[' | ']' | '<' | '>' | ',' | '"' | '\'')
                })
            })
            .filter(|token| token.starts_with("http://") || token.starts_with("https://"))
            .find_map(NormalizedUrl::parse);
        if explicit.is_some() {
            return explicit;
        }

        // Pages without a <title> show their host as the window title
        let page = profile
            .title_suffixes
            .iter()
            .find_map(|suffix| title.strip_suffix(suffix))
            .unwrap_or(title)
            .trim();
        NormalizedUrl::parse(page)
    }
}

impl Default for UrlExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn chrome(title: &str, url: Option<&str>) -> WindowEvent {
        WindowEvent::new("Google Chrome", title, "com.google.Chrome", url.map(str::to_string))
    }

    #[test]
    fn test_unrecognized_bundle_is_unknown() {
        let extractor = UrlExtractor::new();
        let event = WindowEvent::new(
            "Code",
            "https://badsite.com/page",
            "com.microsoft.VSCode",
            Some("https://badsite.com/page".into()),
        );
        assert_eq!(
            extractor.extract(&event),
            Extraction::Unknown(UnknownReason::UnrecognizedBrowser)
        );
    }

    #[test]
    fn test_url_field_is_normalized() {
        let extractor = UrlExtractor::new();
        let event = chrome("Bad", Some("HTTPS://Sub.BadSite.com./a/b?q=1#frag"));
        let url = extractor.extract(&event).url().cloned().unwrap();
        assert_eq!(url.to_string(), "https://sub.badsite.com/a/b");
        assert_eq!(url.host(), "sub.badsite.com");
    }

    #[test]
    fn test_bare_address_bar_value() {
        let extractor = UrlExtractor::new();
        let event = WindowEvent::new(
            "Safari",
            "Start Page",
            "com.apple.Safari",
            Some("badsite.com/page".into()),
        );
        assert_eq!(
            extractor.extract(&event).url().map(ToString::to_string),
            Some("https://badsite.com/page".to_string())
        );
    }

    #[test]
    fn test_title_heuristics() {
        let extractor = UrlExtractor::new();

        let explicit = chrome("Moved (https://badsite.com/x) - Google Chrome", None);
        assert_eq!(
            extractor.extract(&explicit).url().map(ToString::to_string),
            Some("https://badsite.com/x".to_string())
        );

        let host_title = chrome("badsite.com - Google Chrome", None);
        assert_eq!(
            extractor.extract(&host_title).url().map(NormalizedUrl::host),
            Some("badsite.com")
        );

        let plain = chrome("Rust 1.0 release notes - Google Chrome", None);
        assert_eq!(
            extractor.extract(&plain),
            Extraction::Unknown(UnknownReason::NoUrl)
        );
    }

    #[test]
    fn test_malformed_input_never_fails() {
        let extractor = UrlExtractor::new();
        let samples = [
            "",
            "   ",
            "\u{2014}",
            "https://",
            "http://[::1",
            "chrome://settings",
            "about:blank",
            "Inbox (3)",
            "日本語のタイトル - Google Chrome",
            "1.0",
        ];
        for sample in samples {
            let by_title = chrome(sample, None);
            let by_url = chrome("x", Some(sample));
            assert!(extractor.extract(&by_title).is_unknown(), "title {:?}", sample);
            assert!(extractor.extract(&by_url).is_unknown(), "url {:?}", sample);
        }
    }

    #[test]
    fn test_added_profile_is_recognized() {
        let mut extractor = UrlExtractor::with_profiles(Vec::new());
        let event = WindowEvent::new("Min", "x", "com.electron.min", Some("https://a.example.com".into()));
        assert!(extractor.extract(&event).is_unknown());

        extractor.add_profile(BrowserProfile {
            bundle_id: "com.electron.min",
            name: "Min",
            title_suffixes: &[],
            dialect: None,
        });
        assert!(!extractor.extract(&event).is_unknown());
    }
}
