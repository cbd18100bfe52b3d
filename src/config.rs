// src/config.rs
//! Host settings file
//!
//! ```json
//! {
//!   "blocked_domains": ["badsite.com", "news.example.com"],
//!   "redirect_url": "https://safe.example",
//!   "enabled": true,
//!   "policy": "direct_navigation",
//!   "max_retries": 3,
//!   "retry_backoff_ms": 250,
//!   "poll_interval_ms": 150
//! }
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::actions::RedirectPolicy;
use crate::core::configuration::Configuration;
use crate::core::enforcement::RetryPolicy;
use crate::core::signal_source::DEFAULT_POLL_INTERVAL;
use crate::error::{GuardError, Result, SettingsError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GuardSettings {
    pub blocked_domains: Vec<String>,
    pub redirect_url: Option<String>,
    pub enabled: bool,
    pub policy: RedirectPolicy,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for GuardSettings {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            blocked_domains: Vec::new(),
            redirect_url: None,
            enabled: true,
            policy: RedirectPolicy::default(),
            max_retries: retry.max_retries,
            retry_backoff_ms: retry.backoff.as_millis() as u64,
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
        }
    }
}

impl GuardSettings {
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let raw = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| SettingsError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }

    /// Never below 10 ms.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(10))
    }

    /// Validates the settings into the controller's initial configuration.
    /// A blocklist without a redirect target is rejected.
    pub fn configuration(&self) -> Result<Configuration> {
        let base = Configuration::default()
            .with_policy(self.policy)
            .with_enabled(self.enabled);
        let configured = match (&self.redirect_url, self.blocked_domains.is_empty()) {
            (Some(redirect), _) => base.with_blocklist(&self.blocked_domains, redirect)?,
            (None, true) => base,
            (None, false) => {
                return Err(GuardError::invalid(
                    self.blocked_domains.join(","),
                    "blocked domains need a redirect_url",
                ))
            }
        };
        Ok(Configuration {
            revision: 0,
            ..configured
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_for_missing_fields() {
        let file = write(r#"{ "blocked_domains": ["badsite.com"], "redirect_url": "https://safe.example" }"#);
        let settings = GuardSettings::load(file.path()).unwrap();
        assert_eq!(
            settings,
            GuardSettings {
                blocked_domains: vec!["badsite.com".into()],
                redirect_url: Some("https://safe.example".into()),
                ..GuardSettings::default()
            }
        );
        assert_eq!(settings.retry_policy(), RetryPolicy::default());
        assert_eq!(settings.poll_interval(), Duration::from_millis(150));
    }

    #[test]
    fn test_full_settings() {
        let file = write(
            r#"{
                "blocked_domains": ["a.com", "b.com"],
                "redirect_url": "https://safe.example/focus",
                "enabled": false,
                "policy": "input_simulation",
                "max_retries": 1,
                "retry_backoff_ms": 40,
                "poll_interval_ms": 1
            }"#,
        );
        let settings = GuardSettings::load(file.path()).unwrap();
        let config = settings.configuration().unwrap();
        assert!(!config.enabled);
        assert_eq!(config.policy, RedirectPolicy::InputSimulation);
        assert_eq!(config.blocklist.len(), 2);
        assert_eq!(config.redirect_url, "https://safe.example/focus");
        assert_eq!(config.revision, 0);
        assert_eq!(settings.retry_policy().backoff, Duration::from_millis(40));
        assert_eq!(settings.poll_interval(), Duration::from_millis(10));
    }

    #[test]
    fn test_load_errors() {
        let missing = GuardSettings::load(Path::new("/nonexistent/focus-guard.json"));
        assert!(matches!(missing, Err(SettingsError::Io { .. })));

        let unknown = write(r#"{ "blocklist": [] }"#);
        assert!(matches!(
            GuardSettings::load(unknown.path()),
            Err(SettingsError::Parse { .. })
        ));
    }

    #[test]
    fn test_blocklist_requires_redirect() {
        let settings = GuardSettings {
            blocked_domains: vec!["badsite.com".into()],
            ..GuardSettings::default()
        };
        assert!(matches!(
            settings.configuration(),
            Err(GuardError::ConfigurationInvalid { .. })
        ));
        assert!(GuardSettings::default().configuration().unwrap().blocklist.is_empty());
    }
}
