// src/core/controller.rs
//! Observer controller: the control surface hosts talk to
//!
//! The controller owns the signal source, the configuration store and the
//! enforcement pipeline. Window events flow
//! `source -> extractor -> matcher -> state machine -> dispatcher`; the
//! observation thread never waits on an action.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tokio::runtime::{Handle, Runtime};
use tracing::{debug, error, info, trace};
use url::Url;

use crate::actions::{self, ActionExecutor, KeyFlags, RedirectPolicy};
use crate::core::configuration::{ConfigStore, Configuration};
use crate::core::dispatcher::{ActionDispatcher, FailureSlot};
use crate::core::enforcement::{
    Decision, EnforcementFailure, EnforcementMachine, EpisodeState, RetryPolicy,
};
use crate::core::signal_source::{WindowCallback, WindowSignalSource};
use crate::core::window_types::{WindowEvent, WindowIdentity};
use crate::error::{ActionError, GuardError, Result};
use crate::extractors::UrlExtractor;
use crate::platform::{PermissionBroker, Platform};

type ListenerSlot = Arc<RwLock<Option<WindowCallback>>>;

/// One monitoring run, from `start_monitoring` to `stop_monitoring`.
pub struct ObservationSession {
    live: Arc<AtomicBool>,
    last_event: Mutex<Option<WindowEvent>>,
    machine: Arc<EnforcementMachine>,
    dispatcher: ActionDispatcher,
}

impl ObservationSession {
    fn new(
        runtime: Handle,
        executor: Arc<dyn ActionExecutor>,
        retry: RetryPolicy,
        failures: FailureSlot,
    ) -> Self {
        let live = Arc::new(AtomicBool::new(true));
        let machine = Arc::new(EnforcementMachine::new(retry));
        let dispatcher = ActionDispatcher::new(
            runtime,
            executor,
            Arc::clone(&machine),
            Arc::clone(&live),
            failures,
        );
        Self {
            live,
            last_event: Mutex::new(None),
            machine,
            dispatcher,
        }
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    pub fn last_event(&self) -> Option<WindowEvent> {
        self.last_event
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn close(&self) {
        self.live.store(false, Ordering::Release);
        self.machine.reset_all();
    }
}

/// Per-event processing shared between the source callback and host pushes.
struct Pipeline {
    session: Arc<ObservationSession>,
    config: Arc<ConfigStore>,
    extractor: Arc<UrlExtractor>,
    listener: ListenerSlot,
}

impl Pipeline {
    fn handle(&self, event: &WindowEvent) {
        if !self.session.is_live() {
            return;
        }
        *self
            .session
            .last_event
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(event.clone());

        let listener = self
            .listener
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(listener) = listener {
            listener(event);
        }

        let extraction = self.extractor.extract(event);
        let config = self.config.snapshot();
        let identity = event.identity();
        match self.session.machine.observe(&identity, &extraction, &config) {
            Decision::Dispatch(command) => {
                info!(
                    %identity,
                    url = %command.blocked_url,
                    pattern = %command.pattern,
                    target = %command.target,
                    "blocked site, redirecting"
                );
                self.session.dispatcher.dispatch(command);
            }
            Decision::Coalesced => trace!(%identity, "coalesced into pending redirect"),
            Decision::Superseded => debug!(%identity, "pending redirect superseded"),
            Decision::Clean | Decision::Disabled => {
                trace!(%identity, revision = config.revision, "no action")
            }
        }
    }
}

enum RuntimeHandle {
    Owned(Option<Runtime>, Handle),
    Shared(Handle),
}

impl RuntimeHandle {
    fn handle(&self) -> Handle {
        match self {
            RuntimeHandle::Owned(_, handle) | RuntimeHandle::Shared(handle) => handle.clone(),
        }
    }
}

pub struct ControllerBuilder {
    platform: Platform,
    retry: RetryPolicy,
    extractor: UrlExtractor,
    initial: Configuration,
    runtime: Option<Handle>,
}

impl ControllerBuilder {
    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn extractor(mut self, extractor: UrlExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn configuration(mut self, initial: Configuration) -> Self {
        self.initial = initial;
        self
    }

    /// Runs redirect tasks on an existing runtime instead of a private one.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    pub fn build(self) -> Result<ObserverController> {
        let runtime = match self.runtime {
            Some(handle) => RuntimeHandle::Shared(handle),
            None => {
                let rt = tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(1)
                    .thread_name("focus-guard-actions")
                    .enable_time()
                    .build()?;
                let handle = rt.handle().clone();
                RuntimeHandle::Owned(Some(rt), handle)
            }
        };

        Ok(ObserverController {
            config: Arc::new(ConfigStore::new(self.initial)),
            extractor: Arc::new(self.extractor),
            source: Mutex::new(self.platform.source),
            executor: self.platform.executor,
            permissions: self.platform.permissions,
            retry: self.retry,
            lifecycle: Mutex::new(()),
            session: Mutex::new(None),
            listener: Arc::new(RwLock::new(None)),
            failures: Arc::new(RwLock::new(None)),
            runtime,
        })
    }
}

pub struct ObserverController {
    config: Arc<ConfigStore>,
    extractor: Arc<UrlExtractor>,
    source: Mutex<Box<dyn WindowSignalSource>>,
    executor: Arc<dyn ActionExecutor>,
    permissions: Arc<dyn PermissionBroker>,
    retry: RetryPolicy,
    /// Serializes start and stop. Never taken from the event path.
    lifecycle: Mutex<()>,
    /// Only held long enough to read or swap the slot.
    session: Mutex<Option<Arc<ObservationSession>>>,
    listener: ListenerSlot,
    failures: FailureSlot,
    runtime: RuntimeHandle,
}

impl ObserverController {
    pub fn builder(platform: Platform) -> ControllerBuilder {
        ControllerBuilder {
            platform,
            retry: RetryPolicy::default(),
            extractor: UrlExtractor::new(),
            initial: Configuration::default(),
            runtime: None,
        }
    }

    pub fn new(platform: Platform) -> Result<Self> {
        Self::builder(platform).build()
    }

    // Configuration

    /// Replaces the blocklist and redirect target atomically. On error the
    /// previous configuration stays in effect.
    pub fn set_blocked_domains<I, S>(&self, domains: I, redirect_url: &str) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let updated = self
            .config
            .update(|current| current.with_blocklist(domains, redirect_url))?;
        info!(
            domains = updated.blocklist.len(),
            redirect = %updated.redirect_url,
            revision = updated.revision,
            "blocklist updated"
        );
        Ok(())
    }

    /// Disabling also drops every pending redirect.
    pub fn set_enabled(&self, enabled: bool) {
        let updated = self.config.update(|current| Ok(current.with_enabled(enabled)));
        if let Ok(config) = updated {
            info!(enabled, revision = config.revision, "enforcement toggled");
        }
        if !enabled {
            if let Some(session) = self.current_session() {
                session.machine.reset_all();
            }
        }
    }

    pub fn set_policy(&self, policy: RedirectPolicy) {
        if let Ok(config) = self.config.update(|current| Ok(current.with_policy(policy))) {
            info!(?policy, revision = config.revision, "redirect policy changed");
        }
    }

    pub fn configuration(&self) -> Arc<Configuration> {
        self.config.snapshot()
    }

    // Observation

    pub fn start_monitoring(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        if self.current_session().is_some_and(|s| s.is_live()) {
            debug!("already monitoring");
            return Ok(());
        }
        if !self.permissions.is_trusted() {
            return Err(GuardError::PermissionDenied);
        }

        let session = Arc::new(ObservationSession::new(
            self.runtime.handle(),
            Arc::clone(&self.executor),
            self.retry.clone(),
            Arc::clone(&self.failures),
        ));
        let pipeline = Arc::new(self.pipeline_for(&session));
        let callback: WindowCallback = Arc::new(move |event: &WindowEvent| pipeline.handle(event));

        self.source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .start(callback)
            .inspect_err(|err| error!(error = %err, "failed to subscribe to window changes"))?;

        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = Some(session);
        info!("monitoring started");
        Ok(())
    }

    /// Idempotent. No window callback fires after this returns, and results
    /// of in-flight redirects are discarded.
    ///
    /// Stopping waits for a delivery in progress, which may itself call back
    /// into the controller; must not be called from the window listener.
    pub fn stop_monitoring(&self) {
        let _lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(session) = self.session.lock().unwrap_or_else(PoisonError::into_inner).take() else {
            return;
        };
        session.close();
        self.source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stop();
        info!("monitoring stopped");
    }

    /// `true` from a successful `start_monitoring` until `stop_monitoring`
    /// begins.
    pub fn is_active(&self) -> bool {
        self.current_session().is_some_and(|s| s.is_live())
    }

    pub fn request_permissions(&self) -> bool {
        self.permissions.request()
    }

    pub fn has_permissions(&self) -> bool {
        self.permissions.is_trusted()
    }

    /// Feeds a host-observed event through the pipeline. Ignored unless
    /// monitoring.
    pub fn ingest(&self, event: &WindowEvent) {
        if let Some(session) = self.current_session() {
            self.pipeline_for(&session).handle(event);
        }
    }

    pub fn last_event(&self) -> Option<WindowEvent> {
        self.current_session().and_then(|s| s.last_event())
    }

    pub fn on_window_change<F>(&self, listener: F)
    where
        F: Fn(&WindowEvent) + Send + Sync + 'static,
    {
        *self.listener.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(listener));
    }

    pub fn clear_window_listener(&self) {
        self.listener
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn on_enforcement_failure<F>(&self, sink: F)
    where
        F: Fn(&EnforcementFailure) + Send + Sync + 'static,
    {
        *self.failures.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(sink));
    }

    pub fn episode_state(&self, identity: &WindowIdentity) -> EpisodeState {
        self.current_session()
            .map(|s| s.machine.state_of(identity))
            .unwrap_or(EpisodeState::Idle)
    }

    pub fn pending_redirects(&self) -> usize {
        self.current_session()
            .map(|s| s.machine.pending_count())
            .unwrap_or(0)
    }

    // Direct actions

    /// Navigates the frontmost browser to `url` under the current policy.
    pub fn control_browser_with_url(&self, url: &str) -> Result<()> {
        let parsed = Url::parse(url.trim()).map_err(|e| GuardError::invalid(url, e.to_string()))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(GuardError::invalid(url, "only http(s) URLs can be loaded"));
        }

        let bundle_id = self.executor.frontmost_bundle_id().ok_or_else(|| {
            ActionError::Unsupported("no frontmost application".to_string())
        })?;
        if !self.extractor.is_browser(&bundle_id) {
            return Err(ActionError::Unsupported(format!("{} is not a known browser", bundle_id)).into());
        }

        let policy = self.config.snapshot().policy;
        info!(%bundle_id, url = %parsed, ?policy, "loading URL in frontmost browser");
        actions::navigate(self.executor.as_ref(), &bundle_id, parsed.as_str(), policy)?;
        Ok(())
    }

    pub fn simulate_key_press(&self, keycode: u16, flags: KeyFlags) -> Result<()> {
        debug!(keycode, ?flags, "simulating key press");
        self.executor.send_key(keycode, flags)?;
        Ok(())
    }

    fn current_session(&self) -> Option<Arc<ObservationSession>> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn pipeline_for(&self, session: &Arc<ObservationSession>) -> Pipeline {
        Pipeline {
            session: Arc::clone(session),
            config: Arc::clone(&self.config),
            extractor: Arc::clone(&self.extractor),
            listener: Arc::clone(&self.listener),
        }
    }
}

impl Drop for ObserverController {
    fn drop(&mut self) {
        self.stop_monitoring();
        if let RuntimeHandle::Owned(rt, _) = &mut self.runtime {
            if let Some(rt) = rt.take() {
                rt.shutdown_background();
            }
        }
    }
}
