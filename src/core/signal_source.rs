// src/core/signal_source.rs
//! Window-change signal sources
//!
//! A source pushes [`WindowEvent`]s into a callback until it is stopped.
//! After `stop` returns the callback is never invoked again.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::core::window_types::WindowEvent;
use crate::error::{GuardError, ProbeError, Result};

pub type WindowCallback = Arc<dyn Fn(&WindowEvent) + Send + Sync>;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(150);

pub trait WindowSignalSource: Send {
    /// Subscribes `callback`. Starting an active source is a no-op.
    fn start(&mut self, callback: WindowCallback) -> Result<()>;

    fn stop(&mut self);

    fn is_active(&self) -> bool;
}

/// Reads the current frontmost window.
pub trait WindowProbe: Send + Sync + 'static {
    /// Checks that sampling can work at all (permissions, OS services).
    fn prepare(&self) -> Result<(), ProbeError> {
        Ok(())
    }

    /// `Ok(None)` when nothing with a window is frontmost.
    fn sample(&self) -> Result<Option<WindowEvent>, ProbeError>;
}

struct Worker {
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Samples a [`WindowProbe`] on a background thread and reports changes.
pub struct PollingSignalSource<P: WindowProbe> {
    probe: Arc<P>,
    interval: Duration,
    worker: Option<Worker>,
}

impl<P: WindowProbe> PollingSignalSource<P> {
    pub fn new(probe: P) -> Self {
        Self::with_interval(probe, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_interval(probe: P, interval: Duration) -> Self {
        Self {
            probe: Arc::new(probe),
            interval,
            worker: None,
        }
    }

    fn poll_loop(probe: Arc<P>, interval: Duration, running: Arc<AtomicBool>, callback: WindowCallback) {
        let mut last: Option<WindowEvent> = None;
        let mut failing = false;

        while running.load(Ordering::Acquire) {
            match probe.sample() {
                Ok(Some(event)) => {
                    failing = false;
                    let changed = last.as_ref().map_or(true, |prev| !prev.same_state_as(&event));
                    if changed && running.load(Ordering::Acquire) {
                        callback(&event);
                        last = Some(event);
                    }
                }
                Ok(None) => failing = false,
                Err(err) => {
                    // Log once per failure streak
                    if !failing {
                        warn!(error = %err, "window probe failed");
                        failing = true;
                    }
                }
            }
            thread::park_timeout(interval);
        }
        debug!("window poller exited");
    }
}

impl<P: WindowProbe> WindowSignalSource for PollingSignalSource<P> {
    fn start(&mut self, callback: WindowCallback) -> Result<()> {
        if self.is_active() {
            debug!("poller already running");
            return Ok(());
        }
        self.probe.prepare()?;

        let running = Arc::new(AtomicBool::new(true));
        let probe = Arc::clone(&self.probe);
        let interval = self.interval;
        let flag = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name("focus-guard-poller".into())
            .spawn(move || Self::poll_loop(probe, interval, flag, callback))
            .map_err(|e| GuardError::SubscriptionFailed(e.to_string()))?;

        info!(interval_ms = interval.as_millis() as u64, "window poller started");
        self.worker = Some(Worker { running, handle });
        Ok(())
    }

    fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        worker.running.store(false, Ordering::Release);
        worker.handle.thread().unpark();
        // Joining ourselves would deadlock when stopped from inside the callback
        if worker.handle.thread().id() != thread::current().id() && worker.handle.join().is_err() {
            warn!("window poller panicked");
        }
        info!("window poller stopped");
    }

    fn is_active(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|w| w.running.load(Ordering::Acquire) && !w.handle.is_finished())
    }
}

impl<P: WindowProbe> Drop for PollingSignalSource<P> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Default)]
struct ManualState {
    callback: RwLock<Option<WindowCallback>>,
    subscriptions: AtomicUsize,
    refuse: RwLock<Option<String>>,
}

/// A source driven by the embedder: events arrive through [`emit`].
///
/// Clones share one subscription, so a host can keep a handle for emitting
/// while the controller owns another.
///
/// [`emit`]: ManualSignalSource::emit
#[derive(Clone, Default)]
pub struct ManualSignalSource {
    state: Arc<ManualState>,
}

impl ManualSignalSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent `start` calls fail with `SubscriptionFailed`.
    pub fn refuse_subscriptions(&self, reason: Option<String>) {
        *self.state.refuse.write().unwrap_or_else(PoisonError::into_inner) = reason;
    }

    /// Delivers `event` to the subscriber. Returns `false` when stopped.
    ///
    /// The callback runs under a read lock so `stop` waits for in-flight
    /// deliveries; it must not stop this source itself.
    pub fn emit(&self, event: &WindowEvent) -> bool {
        let guard = self.state.callback.read().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(callback) => {
                callback(event);
                true
            }
            None => false,
        }
    }

    /// How many times a subscription was actually established.
    pub fn subscription_count(&self) -> usize {
        self.state.subscriptions.load(Ordering::SeqCst)
    }
}

impl WindowSignalSource for ManualSignalSource {
    fn start(&mut self, callback: WindowCallback) -> Result<()> {
        if let Some(reason) = self.state.refuse.read().unwrap_or_else(PoisonError::into_inner).clone() {
            return Err(GuardError::SubscriptionFailed(reason));
        }
        let mut slot = self.state.callback.write().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(callback);
            self.state.subscriptions.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.state
            .callback
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn is_active(&self) -> bool {
        self.state
            .callback
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}
