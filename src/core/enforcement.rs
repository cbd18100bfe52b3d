// src/core/enforcement.rs
//! Per-window enforcement state machine
//!
//! Each [`WindowIdentity`] moves through
//! `Idle -> Violating -> Redirecting -> (Failed -> Redirecting)* -> Idle`.
//! Only the `Idle -> Violating` edge produces a redirect command, so repeated
//! events for a window that is already being redirected coalesce into the
//! in-flight attempt. Results carry the ticket of the episode they belong to;
//! a result whose episode is gone or was replaced is discarded.
//!
//! Abandoning an episode (superseded, disabled, reset) while its executor
//! call is running leaves the window draining: a new violation waits in
//! `Violating` and is handed to the dispatcher when the old call returns.
//! At most one executor call per window is ever outstanding.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::actions::RedirectPolicy;
use crate::core::configuration::Configuration;
use crate::core::window_types::WindowIdentity;
use crate::error::ActionError;
use crate::extractors::{Extraction, NormalizedUrl};

const SHARDS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EpisodeState {
    Idle,
    /// Transient: a blocked URL was seen and a command is being issued.
    Violating,
    Redirecting,
    /// Waiting out the backoff before the next attempt.
    Failed,
}

impl fmt::Display for EpisodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EpisodeState::Idle => "idle",
            EpisodeState::Violating => "violating",
            EpisodeState::Redirecting => "redirecting",
            EpisodeState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Duration::from_millis(250),
        }
    }
}

/// Instruction to move one window to the redirect target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectCommand {
    pub identity: WindowIdentity,
    pub ticket: u64,
    pub target: String,
    pub policy: RedirectPolicy,
    /// The URL that triggered the episode.
    pub blocked_url: NormalizedUrl,
    pub pattern: String,
}

/// What the machine made of one observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Enforcement is off.
    Disabled,
    /// Nothing pending and nothing blocked.
    Clean,
    /// New episode; the command must be dispatched.
    Dispatch(RedirectCommand),
    /// An attempt is already in flight for this window, or an abandoned one
    /// is still running and the new violation waits for it.
    Coalesced,
    /// The window left the blocked site on its own; the pending attempt is
    /// dropped.
    Superseded,
}

/// Terminal failure of an episode, after retries were exhausted or the
/// error was not recoverable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnforcementFailure {
    pub identity: WindowIdentity,
    pub blocked_url: String,
    pub pattern: String,
    pub target: String,
    pub attempts: u32,
    pub error: ActionError,
    pub failed_at: DateTime<Utc>,
}

impl fmt::Display for EnforcementFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "redirect of {} ({}) to {} failed after {} attempt(s): {}",
            self.identity, self.blocked_url, self.target, self.attempts, self.error
        )
    }
}

pub type FailureSink = Arc<dyn Fn(&EnforcementFailure) + Send + Sync>;

/// What the dispatcher does after an attempt reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The redirect landed; the episode is closed.
    Completed,
    Retry { delay: Duration, attempt: u32 },
    GiveUp(EnforcementFailure),
    /// The episode was superseded or reset while the attempt ran.
    Discarded,
    /// The attempt belonged to an abandoned episode and a newer violation
    /// for the same window was waiting on it. Run this command next.
    Handoff(RedirectCommand),
}

#[derive(Debug)]
struct Episode {
    state: EpisodeState,
    ticket: u64,
    attempts: u32,
    command: RedirectCommand,
}

#[derive(Debug)]
enum Slot {
    Active(Episode),
    /// The episode was abandoned but its executor call has not returned.
    /// Nothing else runs for the window until `ticket` reports back; `next`
    /// holds a violation seen in the meantime.
    Draining { ticket: u64, next: Option<Episode> },
}

impl Slot {
    fn state(&self) -> EpisodeState {
        match self {
            Slot::Active(episode) => episode.state,
            Slot::Draining { next: Some(episode), .. } => episode.state,
            Slot::Draining { next: None, .. } => EpisodeState::Idle,
        }
    }

    /// Drops the episode. A call still on the executor keeps the window
    /// blocked as `Draining`; a backed-off episode has none and just goes.
    fn abandon(self) -> Option<Slot> {
        match self {
            Slot::Active(episode) if episode.state == EpisodeState::Redirecting => Some(Slot::Draining {
                ticket: episode.ticket,
                next: None,
            }),
            Slot::Active(_) => None,
            Slot::Draining { ticket, .. } => Some(Slot::Draining { ticket, next: None }),
        }
    }

    fn holds_episode(&self) -> bool {
        matches!(self, Slot::Active(_) | Slot::Draining { next: Some(_), .. })
    }
}

/// Who a reporting ticket belongs to.
enum Owner {
    Active,
    Draining,
}

type Shard = HashMap<WindowIdentity, Slot>;

pub struct EnforcementMachine {
    shards: Vec<Mutex<Shard>>,
    retry: RetryPolicy,
    next_ticket: AtomicU64,
    violations: AtomicU64,
}

impl EnforcementMachine {
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            shards: (0..SHARDS).map(|_| Mutex::new(HashMap::new())).collect(),
            retry,
            next_ticket: AtomicU64::new(1),
            violations: AtomicU64::new(0),
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    fn shard(&self, identity: &WindowIdentity) -> MutexGuard<'_, Shard> {
        self.shards[identity.shard(self.shards.len())]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn owner(shard: &Shard, identity: &WindowIdentity, ticket: u64) -> Option<Owner> {
        match shard.get(identity)? {
            Slot::Active(episode) if episode.ticket == ticket => Some(Owner::Active),
            Slot::Draining { ticket: running, .. } if *running == ticket => Some(Owner::Draining),
            _ => None,
        }
    }

    /// Opens an episode for a fresh violation.
    fn open(
        &self,
        identity: &WindowIdentity,
        url: &NormalizedUrl,
        pattern: Option<String>,
        config: &Configuration,
        state: EpisodeState,
    ) -> Episode {
        self.violations.fetch_add(1, Ordering::Relaxed);
        trace!(%identity, from = %EpisodeState::Idle, to = %EpisodeState::Violating);

        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        if state == EpisodeState::Redirecting {
            trace!(%identity, from = %EpisodeState::Violating, to = %state, ticket);
        }
        Episode {
            state,
            ticket,
            attempts: 1,
            command: RedirectCommand {
                identity: identity.clone(),
                ticket,
                target: config.redirect_url.clone(),
                policy: config.policy,
                blocked_url: url.clone(),
                pattern: pattern.unwrap_or_default(),
            },
        }
    }

    pub fn observe(
        &self,
        identity: &WindowIdentity,
        extraction: &Extraction,
        config: &Configuration,
    ) -> Decision {
        let mut shard = self.shard(identity);

        if !config.enabled {
            if let Some(slot) = shard.remove(identity) {
                debug!(%identity, "enforcement disabled, dropping pending redirect");
                if let Some(draining) = slot.abandon() {
                    shard.insert(identity.clone(), draining);
                }
            }
            return Decision::Disabled;
        }

        let verdict = config.blocklist.evaluate(extraction);
        let blocked = match (verdict.matched, extraction.url()) {
            (true, Some(url)) => Some(url),
            _ => None,
        };
        // Unknown is not evidence the user left the site
        let still_there = blocked.is_some() || extraction.is_unknown();

        match shard.remove(identity) {
            None => {}
            Some(Slot::Active(episode)) => {
                if still_there {
                    shard.insert(identity.clone(), Slot::Active(episode));
                    trace!(%identity, "redirect already in flight");
                    return Decision::Coalesced;
                }
                info!(%identity, "window left blocked site, cancelling redirect");
                if let Some(draining) = Slot::Active(episode).abandon() {
                    shard.insert(identity.clone(), draining);
                }
                return Decision::Superseded;
            }
            Some(Slot::Draining { ticket, next }) => {
                let (next, decision) = match (next, blocked) {
                    (Some(waiting), _) if still_there => (Some(waiting), Decision::Coalesced),
                    (Some(_), _) => (None, Decision::Superseded),
                    (None, Some(url)) => {
                        debug!(%identity, running = ticket, "previous redirect still finishing, queueing");
                        let waiting = self.open(identity, url, verdict.pattern.clone(), config, EpisodeState::Violating);
                        (Some(waiting), Decision::Coalesced)
                    }
                    (None, None) => (None, Decision::Clean),
                };
                shard.insert(identity.clone(), Slot::Draining { ticket, next });
                return decision;
            }
        }

        let Some(url) = blocked else {
            return Decision::Clean;
        };
        let episode = self.open(identity, url, verdict.pattern, config, EpisodeState::Redirecting);
        let command = episode.command.clone();
        shard.insert(identity.clone(), Slot::Active(episode));
        Decision::Dispatch(command)
    }

    /// Releases a draining window, promoting the violation that waited on it.
    fn hand_off(shard: &mut Shard, identity: &WindowIdentity) -> Resolution {
        match shard.remove(identity) {
            Some(Slot::Draining { next: Some(mut episode), .. }) => {
                episode.state = EpisodeState::Redirecting;
                trace!(%identity, from = %EpisodeState::Violating, to = %episode.state, ticket = episode.ticket);
                let command = episode.command.clone();
                shard.insert(identity.clone(), Slot::Active(episode));
                Resolution::Handoff(command)
            }
            _ => Resolution::Discarded,
        }
    }

    pub fn record_success(&self, identity: &WindowIdentity, ticket: u64) -> Resolution {
        let mut shard = self.shard(identity);
        match Self::owner(&shard, identity, ticket) {
            Some(Owner::Active) => {
                shard.remove(identity);
                Resolution::Completed
            }
            Some(Owner::Draining) => Self::hand_off(&mut shard, identity),
            None => Resolution::Discarded,
        }
    }

    pub fn record_failure(
        &self,
        identity: &WindowIdentity,
        ticket: u64,
        error: ActionError,
    ) -> Resolution {
        let mut shard = self.shard(identity);
        match Self::owner(&shard, identity, ticket) {
            Some(Owner::Active) => {}
            Some(Owner::Draining) => {
                debug!(%identity, error = %error, "abandoned redirect attempt failed");
                return Self::hand_off(&mut shard, identity);
            }
            None => return Resolution::Discarded,
        }
        let Some(Slot::Active(episode)) = shard.get_mut(identity) else {
            return Resolution::Discarded;
        };

        if error.is_recoverable() && episode.attempts <= self.retry.max_retries {
            episode.state = EpisodeState::Failed;
            debug!(
                %identity,
                attempt = episode.attempts,
                error = %error,
                "redirect attempt failed, will retry"
            );
            return Resolution::Retry {
                delay: self.retry.backoff,
                attempt: episode.attempts + 1,
            };
        }

        let attempts = episode.attempts;
        let command = match shard.remove(identity) {
            Some(Slot::Active(episode)) => episode.command,
            _ => return Resolution::Discarded,
        };
        Resolution::GiveUp(EnforcementFailure {
            identity: command.identity,
            blocked_url: command.blocked_url.to_string(),
            pattern: command.pattern,
            target: command.target,
            attempts,
            error,
            failed_at: Utc::now(),
        })
    }

    /// Moves a backed-off episode back to `Redirecting`. Returns `false` if
    /// the episode no longer wants the attempt.
    pub fn resume(&self, identity: &WindowIdentity, ticket: u64) -> bool {
        let mut shard = self.shard(identity);
        match shard.get_mut(identity) {
            Some(Slot::Active(episode))
                if episode.ticket == ticket && episode.state == EpisodeState::Failed =>
            {
                episode.state = EpisodeState::Redirecting;
                episode.attempts += 1;
                true
            }
            _ => false,
        }
    }

    pub fn state_of(&self, identity: &WindowIdentity) -> EpisodeState {
        self.shard(identity)
            .get(identity)
            .map(Slot::state)
            .unwrap_or(EpisodeState::Idle)
    }

    /// Windows with a redirect outstanding, including abandoned attempts
    /// that have not returned yet.
    pub fn pending_count(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.lock().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    /// Returns every window to `Idle` and reports how many episodes were
    /// dropped. Attempts still on the executor keep their window draining
    /// until they report back.
    pub fn reset_all(&self) -> usize {
        let mut cleared = 0;
        for shard in &self.shards {
            let mut shard = shard.lock().unwrap_or_else(PoisonError::into_inner);
            let slots: Vec<_> = shard.drain().collect();
            for (identity, slot) in slots {
                if slot.holds_episode() {
                    cleared += 1;
                }
                if let Some(draining) = slot.abandon() {
                    shard.insert(identity, draining);
                }
            }
        }
        if cleared > 0 {
            warn!(cleared, "pending redirects dropped");
        }
        cleared
    }

    /// Number of `Idle -> Violating` transitions so far.
    pub fn violation_count(&self) -> u64 {
        self.violations.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::window_types::WindowEvent;
    use crate::extractors::UrlExtractor;
    use pretty_assertions::assert_eq;

    fn config() -> Configuration {
        Configuration::default()
            .with_blocklist(["badsite.com"], "https://safe.example")
            .unwrap()
    }

    fn chrome(url: &str, window: u64) -> (WindowIdentity, Extraction) {
        let event = WindowEvent::new("Google Chrome", "", "com.google.Chrome", Some(url.into()))
            .with_window_id(window);
        (event.identity(), UrlExtractor::new().extract(&event))
    }

    fn dispatched(decision: Decision) -> RedirectCommand {
        match decision {
            Decision::Dispatch(cmd) => cmd,
            other => panic!("expected dispatch, got {:?}", other),
        }
    }

    #[test]
    fn test_blocked_url_dispatches_once() {
        let machine = EnforcementMachine::new(RetryPolicy::default());
        let config = config();
        let (id, bad) = chrome("https://badsite.com/page", 1);

        let cmd = dispatched(machine.observe(&id, &bad, &config));
        assert_eq!(cmd.target, "https://safe.example");
        assert_eq!(cmd.pattern, "badsite.com");
        assert_eq!(machine.state_of(&id), EpisodeState::Redirecting);

        for _ in 0..5 {
            assert_eq!(machine.observe(&id, &bad, &config), Decision::Coalesced);
        }
        assert_eq!(machine.record_success(&id, cmd.ticket), Resolution::Completed);
        assert_eq!(machine.state_of(&id), EpisodeState::Idle);
        assert_eq!(machine.violation_count(), 1);
    }

    #[test]
    fn test_clean_and_disabled() {
        let machine = EnforcementMachine::new(RetryPolicy::default());
        let (id, good) = chrome("https://docs.rs", 1);
        assert_eq!(machine.observe(&id, &good, &config()), Decision::Clean);

        let (id, bad) = chrome("https://badsite.com", 1);
        let off = config().with_enabled(false);
        assert_eq!(machine.observe(&id, &bad, &off), Decision::Disabled);
        assert_eq!(machine.pending_count(), 0);
    }

    #[test]
    fn test_leaving_site_supersedes_pending() {
        let machine = EnforcementMachine::new(RetryPolicy::default());
        let config = config();
        let (id, bad) = chrome("https://badsite.com", 1);
        let (_, good) = chrome("https://docs.rs", 1);

        let cmd = dispatched(machine.observe(&id, &bad, &config));
        assert_eq!(machine.observe(&id, &good, &config), Decision::Superseded);
        assert_eq!(machine.state_of(&id), EpisodeState::Idle);
        // Still counted until the running call returns
        assert_eq!(machine.pending_count(), 1);

        assert_eq!(
            machine.record_failure(&id, cmd.ticket, ActionError::InputRejected("x".into())),
            Resolution::Discarded
        );
        assert_eq!(machine.pending_count(), 0);
        assert_eq!(machine.record_success(&id, cmd.ticket), Resolution::Discarded);
    }

    #[test]
    fn test_violation_waits_for_abandoned_attempt() {
        let machine = EnforcementMachine::new(RetryPolicy::default());
        let config = config();
        let (id, bad) = chrome("https://badsite.com/a", 1);
        let (_, good) = chrome("https://docs.rs", 1);
        let (_, again) = chrome("https://badsite.com/b", 1);

        let first = dispatched(machine.observe(&id, &bad, &config));
        assert_eq!(machine.observe(&id, &good, &config), Decision::Superseded);

        // The first call has not returned, so nothing new is dispatched
        assert_eq!(machine.observe(&id, &again, &config), Decision::Coalesced);
        assert_eq!(machine.state_of(&id), EpisodeState::Violating);
        assert_eq!(machine.observe(&id, &again, &config), Decision::Coalesced);
        assert_eq!(machine.violation_count(), 2);

        let second = match machine.record_success(&id, first.ticket) {
            Resolution::Handoff(cmd) => cmd,
            other => panic!("expected handoff, got {:?}", other),
        };
        assert_ne!(second.ticket, first.ticket);
        assert_eq!(second.blocked_url.to_string(), "https://badsite.com/b");
        assert_eq!(machine.state_of(&id), EpisodeState::Redirecting);
        assert_eq!(machine.record_success(&id, second.ticket), Resolution::Completed);
        assert_eq!(machine.pending_count(), 0);
    }

    #[test]
    fn test_waiting_violation_can_be_superseded() {
        let machine = EnforcementMachine::new(RetryPolicy::default());
        let config = config();
        let (id, bad) = chrome("https://badsite.com", 1);
        let (_, good) = chrome("https://docs.rs", 1);

        let first = dispatched(machine.observe(&id, &bad, &config));
        machine.observe(&id, &good, &config);
        machine.observe(&id, &bad, &config);
        assert_eq!(machine.observe(&id, &good, &config), Decision::Superseded);
        assert_eq!(machine.state_of(&id), EpisodeState::Idle);
        assert_eq!(machine.record_success(&id, first.ticket), Resolution::Discarded);
    }

    #[test]
    fn test_disable_while_redirecting_holds_window() {
        let machine = EnforcementMachine::new(RetryPolicy::default());
        let (id, bad) = chrome("https://badsite.com", 1);
        let cmd = dispatched(machine.observe(&id, &bad, &config()));

        let off = config().with_enabled(false);
        assert_eq!(machine.observe(&id, &bad, &off), Decision::Disabled);
        assert_eq!(machine.state_of(&id), EpisodeState::Idle);

        // Re-enabled before the call returned
        assert_eq!(machine.observe(&id, &bad, &config()), Decision::Coalesced);
        assert!(matches!(
            machine.record_failure(&id, cmd.ticket, ActionError::Unsupported("x".into())),
            Resolution::Handoff(_)
        ));
    }

    #[test]
    fn test_unknown_does_not_supersede() {
        let machine = EnforcementMachine::new(RetryPolicy::default());
        let config = config();
        let (id, bad) = chrome("https://badsite.com", 1);
        dispatched(machine.observe(&id, &bad, &config));
        assert_eq!(
            machine.observe(&id, &Extraction::Unknown(crate::extractors::UnknownReason::NoUrl), &config),
            Decision::Coalesced
        );
    }

    #[test]
    fn test_windows_are_independent() {
        let machine = EnforcementMachine::new(RetryPolicy::default());
        let config = config();
        let (first, bad) = chrome("https://badsite.com", 1);
        let (second, _) = chrome("https://badsite.com", 2);

        dispatched(machine.observe(&first, &bad, &config));
        dispatched(machine.observe(&second, &bad, &config));
        assert_eq!(machine.pending_count(), 2);
    }

    #[test]
    fn test_retry_until_exhausted() {
        let machine = EnforcementMachine::new(RetryPolicy {
            max_retries: 2,
            backoff: Duration::from_millis(5),
        });
        let (id, bad) = chrome("https://badsite.com", 1);
        let cmd = dispatched(machine.observe(&id, &bad, &config()));
        let rejected = || ActionError::InputRejected("post failed".into());

        for expected_attempt in 2..=3 {
            assert_eq!(
                machine.record_failure(&id, cmd.ticket, rejected()),
                Resolution::Retry {
                    delay: Duration::from_millis(5),
                    attempt: expected_attempt,
                }
            );
            assert_eq!(machine.state_of(&id), EpisodeState::Failed);
            assert!(machine.resume(&id, cmd.ticket));
        }

        match machine.record_failure(&id, cmd.ticket, rejected()) {
            Resolution::GiveUp(failure) => {
                assert_eq!(failure.attempts, 3);
                assert_eq!(failure.blocked_url, "https://badsite.com/");
            }
            other => panic!("expected give up, got {:?}", other),
        }
        assert_eq!(machine.state_of(&id), EpisodeState::Idle);
    }

    #[test]
    fn test_unsupported_gives_up_immediately() {
        let machine = EnforcementMachine::new(RetryPolicy::default());
        let (id, bad) = chrome("https://badsite.com", 1);
        let cmd = dispatched(machine.observe(&id, &bad, &config()));
        assert!(matches!(
            machine.record_failure(&id, cmd.ticket, ActionError::Unsupported("no scripting".into())),
            Resolution::GiveUp(EnforcementFailure { attempts: 1, .. })
        ));
    }

    #[test]
    fn test_reset_discards_in_flight() {
        let machine = EnforcementMachine::new(RetryPolicy::default());
        let (id, bad) = chrome("https://badsite.com", 1);
        let cmd = dispatched(machine.observe(&id, &bad, &config()));
        assert_eq!(
            machine.record_failure(&id, cmd.ticket, ActionError::InputRejected("x".into())),
            Resolution::Retry {
                delay: Duration::from_millis(250),
                attempt: 2,
            }
        );

        // Backing off, nothing is running: the window is free at once
        assert_eq!(machine.reset_all(), 1);
        assert_eq!(machine.pending_count(), 0);
        assert!(!machine.resume(&id, cmd.ticket));

        // A fresh violation gets a fresh ticket
        let again = dispatched(machine.observe(&id, &bad, &config()));
        assert_ne!(again.ticket, cmd.ticket);
        assert_eq!(machine.record_success(&id, cmd.ticket), Resolution::Discarded);
        assert_eq!(machine.state_of(&id), EpisodeState::Redirecting);
    }

    #[test]
    fn test_reset_keeps_running_call_draining() {
        let machine = EnforcementMachine::new(RetryPolicy::default());
        let (id, bad) = chrome("https://badsite.com", 1);
        let cmd = dispatched(machine.observe(&id, &bad, &config()));

        assert_eq!(machine.reset_all(), 1);
        assert_eq!(machine.state_of(&id), EpisodeState::Idle);
        assert_eq!(machine.pending_count(), 1);
        assert_eq!(machine.observe(&id, &bad, &config()), Decision::Coalesced);
        assert_eq!(machine.reset_all(), 1);
        assert_eq!(machine.record_success(&id, cmd.ticket), Resolution::Discarded);
        assert_eq!(machine.pending_count(), 0);
    }

    #[test]
    fn test_dispatches_never_exceed_violations() {
        let machine = EnforcementMachine::new(RetryPolicy::default());
        let config = config();
        let urls = [
            "https://badsite.com/a",
            "https://badsite.com/b",
            "https://docs.rs",
            "https://m.badsite.com",
            "https://docs.rs/x",
            "https://docs.rs/y",
            "https://badsite.com",
        ];
        let mut dispatches = 0;
        let mut running: HashMap<WindowIdentity, u64> = HashMap::new();
        for (i, url) in urls.iter().cycle().take(70).enumerate() {
            let (id, extraction) = chrome(url, (i % 3) as u64);
            if let Decision::Dispatch(cmd) = machine.observe(&id, &extraction, &config) {
                dispatches += 1;
                assert!(running.insert(id.clone(), cmd.ticket).is_none(), "two calls for {}", id);
            }
            if i % 4 == 0 {
                if let Some(ticket) = running.remove(&id) {
                    if let Resolution::Handoff(next) = machine.record_success(&id, ticket) {
                        dispatches += 1;
                        running.insert(id.clone(), next.ticket);
                    }
                }
            }
        }
        assert!(dispatches > 0);
        assert!(dispatches as u64 <= machine.violation_count());
    }
}
