// src/core/window_types.rs
//! Common types for frontmost-window observation

use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A raw window-change event as reported by a signal source.
#[derive(Debug, Clone, Serialize)]
pub struct WindowEvent {
    pub app_name: String,
    pub window_title: String,
    pub bundle_id: String,
    /// Best-effort URL read from the accessibility tree, if any.
    pub url: Option<String>,
    /// OS window number, when the source can resolve one.
    pub window_id: Option<u64>,
    pub observed_at: DateTime<Utc>,
}

impl WindowEvent {
    pub fn new(
        app_name: impl Into<String>,
        window_title: impl Into<String>,
        bundle_id: impl Into<String>,
        url: Option<String>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            window_title: window_title.into(),
            bundle_id: bundle_id.into(),
            url,
            window_id: None,
            observed_at: Utc::now(),
        }
    }

    pub fn with_window_id(mut self, window_id: u64) -> Self {
        self.window_id = Some(window_id);
        self
    }

    /// Compares everything except the capture time.
    pub fn same_state_as(&self, other: &WindowEvent) -> bool {
        self.app_name == other.app_name
            && self.window_title == other.window_title
            && self.bundle_id == other.bundle_id
            && self.url == other.url
            && self.window_id == other.window_id
    }

    pub fn identity(&self) -> WindowIdentity {
        WindowIdentity::of(self)
    }
}

impl fmt::Display for WindowEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) \"{}\"", self.app_name, self.bundle_id, self.window_title)?;
        if let Some(url) = &self.url {
            write!(f, " <{}>", url)?;
        }
        Ok(())
    }
}

/// Scopes a violation episode to one browser window.
///
/// Titles change on every navigation, including the redirect itself, so they
/// are never part of the key. Without an OS window number the episode is
/// scoped to the whole application.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WindowIdentity {
    pub bundle_id: String,
    pub window_id: Option<u64>,
}

impl WindowIdentity {
    pub fn of(event: &WindowEvent) -> Self {
        Self {
            bundle_id: event.bundle_id.clone(),
            window_id: event.window_id,
        }
    }

    pub(crate) fn shard(&self, shards: usize) -> usize {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.hash(&mut hasher);
        (hasher.finish() % shards.max(1) as u64) as usize
    }
}

impl fmt::Display for WindowIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.window_id {
            Some(id) => write!(f, "{}#{}", self.bundle_id, id),
            None => write!(f, "{}", self.bundle_id),
        }
    }
}
