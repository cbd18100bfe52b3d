// src/core/dispatcher.rs
//! Runs redirect commands off the observation thread
//!
//! Each command becomes one tokio task. The blocking executor call runs on
//! the blocking pool and backoff waits are async sleeps, so the observer
//! never waits on an action.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::actions::{self, ActionExecutor};
use crate::core::enforcement::{
    EnforcementFailure, EnforcementMachine, FailureSink, RedirectCommand, Resolution,
};
use crate::error::ActionError;

/// Slot for the host's failure listener, shared with the controller.
pub type FailureSlot = Arc<RwLock<Option<FailureSink>>>;

#[derive(Clone)]
pub struct ActionDispatcher {
    runtime: Handle,
    executor: Arc<dyn ActionExecutor>,
    machine: Arc<EnforcementMachine>,
    live: Arc<AtomicBool>,
    failures: FailureSlot,
}

impl ActionDispatcher {
    pub fn new(
        runtime: Handle,
        executor: Arc<dyn ActionExecutor>,
        machine: Arc<EnforcementMachine>,
        live: Arc<AtomicBool>,
        failures: FailureSlot,
    ) -> Self {
        Self {
            runtime,
            executor,
            machine,
            live,
            failures,
        }
    }

    /// Schedules `command`; returns immediately.
    pub fn dispatch(&self, command: RedirectCommand) {
        let this = self.clone();
        self.runtime.spawn(async move { this.run(command).await });
    }

    /// Drives one window's redirect to completion. A handed-off command
    /// continues on the same task, so a window never has two executor calls
    /// at once.
    async fn run(self, mut command: RedirectCommand) {
        let mut attempt = 1;
        loop {
            if !self.live.load(Ordering::Acquire) {
                return;
            }

            let executor = Arc::clone(&self.executor);
            let cmd = command.clone();
            let outcome = tokio::task::spawn_blocking(move || {
                actions::perform_redirect(executor.as_ref(), &cmd)
            })
            .await
            .unwrap_or_else(|e| Err(ActionError::InputRejected(format!("executor task failed: {}", e))));

            let identity = &command.identity;
            if !self.live.load(Ordering::Acquire) {
                debug!(%identity, "session ended, discarding redirect result");
                return;
            }

            let resolution = match outcome {
                Ok(()) => self.machine.record_success(identity, command.ticket),
                Err(error) => self.machine.record_failure(identity, command.ticket, error),
            };

            match resolution {
                Resolution::Completed => {
                    info!(%identity, target = %command.target, attempt, "redirected");
                    return;
                }
                Resolution::Retry { delay, attempt: next } => {
                    tokio::time::sleep(delay).await;
                    if !self.live.load(Ordering::Acquire) || !self.machine.resume(identity, command.ticket) {
                        debug!(%identity, "retry abandoned");
                        return;
                    }
                    attempt = next;
                }
                Resolution::GiveUp(failure) => {
                    self.report(&failure);
                    return;
                }
                Resolution::Discarded => {
                    debug!(%identity, ticket = command.ticket, "stale redirect result discarded");
                    return;
                }
                Resolution::Handoff(next) => {
                    info!(
                        %identity,
                        url = %next.blocked_url,
                        ticket = next.ticket,
                        "previous attempt finished, redirecting again"
                    );
                    command = next;
                    attempt = 1;
                }
            }
        }
    }

    fn report(&self, failure: &EnforcementFailure) {
        warn!(
            identity = %failure.identity,
            url = %failure.blocked_url,
            attempts = failure.attempts,
            error = %failure.error,
            "redirect failed"
        );
        let sink = self
            .failures
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(sink) = sink {
            sink(failure);
        }
    }
}
