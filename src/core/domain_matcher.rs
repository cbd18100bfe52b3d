// src/core/domain_matcher.rs
//! Domain blocklist matching
//!
//! A pattern `example.com` blocks the exact host and every subdomain of it.
//! Hosts are compared case-insensitively; paths and queries never take part.

use std::fmt;

use url::{Host, Url};

use crate::error::{GuardError, Result};
use crate::extractors::{Extraction, NormalizedUrl};

/// A validated blocklist entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainPattern {
    host: String,
}

impl DomainPattern {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(GuardError::invalid(raw, "empty domain pattern"));
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(GuardError::invalid(raw, "whitespace in domain pattern"));
        }
        if trimmed.contains("://") {
            return Err(GuardError::invalid(raw, "patterns are hosts, not URLs"));
        }
        if let Some(c) = trimmed.chars().find(|c| matches!(c, '/' | '?' | '#' | '@' | ':')) {
            return Err(GuardError::invalid(
                raw,
                format!("unexpected `{}`: patterns cannot match ports, paths or queries", c),
            ));
        }

        let bare = trimmed.strip_prefix("*.").unwrap_or(trimmed);
        if bare.contains('*') {
            return Err(GuardError::invalid(raw, "only a leading `*.` wildcard is allowed"));
        }
        let bare = bare.trim_end_matches('.');
        if bare.is_empty() {
            return Err(GuardError::invalid(raw, "empty domain pattern"));
        }

        // Let the URL parser do IDNA mapping and lowercasing
        let parsed = Url::parse(&format!("http://{}/", bare))
            .map_err(|e| GuardError::invalid(raw, e.to_string()))?;
        let host = match parsed.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(_)) | None => {
                return Err(GuardError::invalid(raw, "not a domain name"));
            }
        };
        if host.split('.').any(str::is_empty) {
            return Err(GuardError::invalid(raw, "empty label in domain pattern"));
        }

        Ok(Self { host })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Exact host or any subdomain of it.
    pub fn matches_host(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        host == self.host
            || host
                .strip_suffix(self.host.as_str())
                .map_or(false, |prefix| prefix.ends_with('.'))
    }
}

impl fmt::Display for DomainPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.host)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MatchResult {
    pub matched: bool,
    /// The first pattern in list order that matched.
    pub pattern: Option<String>,
}

impl MatchResult {
    pub fn no_match() -> Self {
        Self::default()
    }

    fn hit(pattern: &DomainPattern) -> Self {
        Self {
            matched: true,
            pattern: Some(pattern.host.clone()),
        }
    }
}

/// Ordered, de-duplicated set of domain patterns.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Blocklist {
    patterns: Vec<DomainPattern>,
}

impl Blocklist {
    /// Validates every entry; the first invalid one fails the whole list.
    pub fn parse<I, S>(domains: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut patterns: Vec<DomainPattern> = Vec::new();
        for raw in domains {
            let pattern = DomainPattern::parse(raw.as_ref())?;
            if !patterns.contains(&pattern) {
                patterns.push(pattern);
            }
        }
        Ok(Self { patterns })
    }

    pub fn patterns(&self) -> &[DomainPattern] {
        &self.patterns
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn match_host(&self, host: &str) -> MatchResult {
        if host.is_empty() {
            return MatchResult::no_match();
        }
        self.patterns
            .iter()
            .find(|p| p.matches_host(host))
            .map(MatchResult::hit)
            .unwrap_or_default()
    }

    pub fn match_url(&self, url: &NormalizedUrl) -> MatchResult {
        self.match_host(url.host())
    }

    /// Convenience for raw strings; anything that does not parse is no match.
    pub fn match_str(&self, url: &str) -> MatchResult {
        NormalizedUrl::parse(url)
            .map(|u| self.match_url(&u))
            .unwrap_or_default()
    }

    /// Unknown extractions never match.
    pub fn evaluate(&self, extraction: &Extraction) -> MatchResult {
        match extraction {
            Extraction::Url(url) => self.match_url(url),
            Extraction::Unknown(_) => MatchResult::no_match(),
        }
    }
}
