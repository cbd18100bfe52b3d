// src/core/configuration.rs
//! Enforcement configuration and its copy-on-write store
//!
//! Every evaluation reads one immutable [`Configuration`] snapshot, so a
//! concurrent update is seen either entirely or not at all.

use std::sync::{Arc, PoisonError, RwLock};

use url::Url;

use crate::actions::RedirectPolicy;
use crate::core::domain_matcher::Blocklist;
use crate::error::{GuardError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub blocklist: Blocklist,
    /// Absolute http(s) URL; empty until a blocklist is installed.
    pub redirect_url: String,
    pub enabled: bool,
    pub policy: RedirectPolicy,
    /// Bumped on every successful update.
    pub revision: u64,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            blocklist: Blocklist::default(),
            redirect_url: String::new(),
            enabled: true,
            policy: RedirectPolicy::default(),
            revision: 0,
        }
    }
}

impl Configuration {
    /// Builds the next revision with a new blocklist and redirect target.
    pub fn with_blocklist<I, S>(&self, domains: I, redirect_url: &str) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let blocklist = Blocklist::parse(domains)?;
        let redirect_url = validate_redirect(redirect_url, &blocklist)?;
        Ok(Self {
            blocklist,
            redirect_url,
            revision: self.revision + 1,
            ..self.clone()
        })
    }

    pub fn with_enabled(&self, enabled: bool) -> Self {
        Self {
            enabled,
            revision: self.revision + 1,
            ..self.clone()
        }
    }

    pub fn with_policy(&self, policy: RedirectPolicy) -> Self {
        Self {
            policy,
            revision: self.revision + 1,
            ..self.clone()
        }
    }
}

/// The redirect must be an absolute http(s) URL that the new list itself
/// does not block, otherwise every redirect would trigger another one. The
/// caller's text is kept as given, minus surrounding whitespace.
fn validate_redirect(raw: &str, blocklist: &Blocklist) -> Result<String> {
    let trimmed = raw.trim();
    let url = Url::parse(trimmed).map_err(|e| GuardError::invalid(raw, e.to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(GuardError::invalid(raw, "redirect must be an http(s) URL"));
    }
    let Some(host) = url.host_str() else {
        return Err(GuardError::invalid(raw, "redirect has no host"));
    };
    let verdict = blocklist.match_host(host);
    if verdict.matched {
        return Err(GuardError::invalid(
            raw,
            format!(
                "redirect host is blocked by `{}`",
                verdict.pattern.unwrap_or_default()
            ),
        ));
    }
    Ok(trimmed.to_string())
}

/// Holds the current configuration. Readers clone an `Arc`; writers publish
/// a whole new value.
#[derive(Debug, Default)]
pub struct ConfigStore {
    current: RwLock<Arc<Configuration>>,
}

impl ConfigStore {
    pub fn new(initial: Configuration) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    pub fn snapshot(&self) -> Arc<Configuration> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Computes the next configuration from the current one and publishes it.
    /// On error nothing changes.
    pub fn update<F>(&self, next: F) -> Result<Arc<Configuration>>
    where
        F: FnOnce(&Configuration) -> Result<Configuration>,
    {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let updated = Arc::new(next(guard.as_ref())?);
        *guard = Arc::clone(&updated);
        Ok(updated)
    }
}
