// src/core/mod.rs
//! Observation and enforcement core

pub mod configuration;
pub mod controller;
pub mod dispatcher;
pub mod domain_matcher;
pub mod enforcement;
pub mod signal_source;
pub mod window_types;

pub use configuration::{ConfigStore, Configuration};
pub use controller::{ControllerBuilder, ObservationSession, ObserverController};
pub use domain_matcher::{Blocklist, DomainPattern, MatchResult};
pub use enforcement::{
    Decision, EnforcementFailure, EnforcementMachine, EpisodeState, RedirectCommand, RetryPolicy,
};
pub use signal_source::{
    ManualSignalSource, PollingSignalSource, WindowCallback, WindowProbe, WindowSignalSource,
};
pub use window_types::{WindowEvent, WindowIdentity};
