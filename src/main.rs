// src/main.rs
//! Focus Guard command line runner
//!
//! Watches the frontmost window, prints every change and redirects browser
//! windows that land on a blocked domain until interrupted.

#![deny(unsafe_op_in_unsafe_fn)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};

use focus_guard::actions::RedirectPolicy;
use focus_guard::config::GuardSettings;
use focus_guard::core::enforcement::EnforcementFailure;
use focus_guard::core::window_types::WindowEvent;
use focus_guard::extractors::UrlExtractor;
use focus_guard::platform;
use focus_guard::ObserverController;

/// Command line interface for the focus guard
#[derive(Debug, Parser)]
#[command(
    name = "focus-guard",
    about = "Redirects browsers away from blocked domains",
    long_about = "Observes the frontmost window through the accessibility API, extracts the URL of recognized browsers and redirects windows showing a blocked domain to a safe page."
)]
struct Args {
    /// JSON settings file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Domain to block (repeatable; adds to the settings file)
    #[arg(long = "block", value_name = "DOMAIN")]
    block: Vec<String>,

    /// Where blocked windows are sent
    #[arg(long, value_name = "URL")]
    redirect: Option<String>,

    /// How the redirect is performed
    #[arg(long, value_enum)]
    policy: Option<PolicyArg>,

    /// Start with enforcement off (observe only)
    #[arg(long)]
    disabled: bool,

    /// Output format for events
    #[arg(long, default_value = "human", value_enum)]
    format: OutputFormat,

    /// Verbosity level for logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Show the accessibility permission prompt if access is missing
    #[arg(long)]
    prompt: bool,

    /// Check permissions and exit
    #[arg(long, help = "Check required permissions and exit")]
    check_permissions: bool,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum PolicyArg {
    /// Load the target through the browser's scripting interface
    Direct,
    /// Type the target into the address bar
    Input,
}

impl From<PolicyArg> for RedirectPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Direct => RedirectPolicy::DirectNavigation,
            PolicyArg::Input => RedirectPolicy::InputSimulation,
        }
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum OutputFormat {
    /// Human-readable output
    Human,
    /// One JSON object per line
    Json,
}

fn setup_logging(args: &Args) {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_target(args.verbose > 1)
        .with_thread_ids(args.verbose > 2)
        .init();
}

/// Settings file first, then command line overrides.
fn resolve_settings(args: &Args) -> Result<GuardSettings> {
    let mut settings = match &args.config {
        Some(path) => GuardSettings::load(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => GuardSettings::default(),
    };

    settings.blocked_domains.extend(args.block.iter().cloned());
    if let Some(redirect) = &args.redirect {
        settings.redirect_url = Some(redirect.clone());
    }
    if let Some(policy) = args.policy {
        settings.policy = policy.into();
    }
    if args.disabled {
        settings.enabled = false;
    }
    Ok(settings)
}

/// Prints window changes as they arrive.
struct EventPrinter {
    format: OutputFormat,
    extractor: UrlExtractor,
    count: AtomicUsize,
}

impl EventPrinter {
    fn new(format: OutputFormat) -> Self {
        Self {
            format,
            extractor: UrlExtractor::new(),
            count: AtomicUsize::new(0),
        }
    }

    fn window_changed(&self, event: &WindowEvent) {
        let n = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        let extracted = self.extractor.extract(event);
        let url = extracted.url().map(ToString::to_string);

        match self.format {
            OutputFormat::Human => {
                println!("\n#{} {} ({})", n, event.app_name, event.bundle_id);
                if !event.window_title.is_empty() {
                    println!("   Window: {}", event.window_title);
                }
                if let Some(id) = event.window_id {
                    println!("   Window id: {}", id);
                }
                if let Some(url) = &url {
                    println!("   URL: {}", url);
                }
            }
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "event_number": n,
                    "kind": "window_change",
                    "timestamp": event.observed_at.to_rfc3339(),
                    "app": event.app_name,
                    "bundle_id": event.bundle_id,
                    "window_title": event.window_title,
                    "window_id": event.window_id,
                    "url": url,
                });
                println!("{}", json);
            }
        }
    }

    fn enforcement_failed(&self, failure: &EnforcementFailure) {
        match self.format {
            OutputFormat::Human => println!("\n!! {}", failure),
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "kind": "enforcement_failure",
                    "timestamp": failure.failed_at.to_rfc3339(),
                    "window": failure.identity.to_string(),
                    "blocked_url": failure.blocked_url,
                    "pattern": failure.pattern,
                    "target": failure.target,
                    "attempts": failure.attempts,
                    "error": failure.error.to_string(),
                });
                println!("{}", json);
            }
        }
    }
}

fn report_permissions(controller: &ObserverController) {
    println!("Checking required permissions...\n");
    if controller.has_permissions() {
        println!("Accessibility: granted");
    } else {
        println!("Accessibility: NOT granted");
        println!("   Enable it in System Settings > Privacy & Security > Accessibility,");
        println!("   or run again with --prompt.");
    }
}

/// Calls `run_slice` until `interrupted` is set. A slice returning `true` had
/// nothing to run (no sources attached yet), so the thread sleeps instead of
/// spinning.
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn pump_until(
    interrupted: &AtomicBool,
    period: Duration,
    mut run_slice: impl FnMut(Duration) -> bool,
) {
    while !interrupted.load(Ordering::Acquire) {
        if run_slice(period) {
            std::thread::sleep(period);
        }
    }
}

/// Pumps the main run loop until Ctrl+C. NSWorkspace only refreshes the
/// frontmost application from notifications delivered on this loop, so the
/// poller would otherwise see the launch-time app forever.
#[cfg(target_os = "macos")]
async fn run_until_interrupted() -> Result<()> {
    use core_foundation::runloop::{kCFRunLoopDefaultMode, CFRunLoop, CFRunLoopRunResult};

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for Ctrl+C");
        }
        flag.store(true, Ordering::Release);
        CFRunLoop::get_main().stop();
    });

    tokio::task::block_in_place(|| {
        pump_until(&interrupted, Duration::from_millis(250), |slice| {
            let result = objc2::rc::autoreleasepool(|_| {
                CFRunLoop::run_in_mode(unsafe { kCFRunLoopDefaultMode }, slice, false)
            });
            matches!(result, CFRunLoopRunResult::Finished)
        })
    });
    Ok(())
}

#[cfg(not(target_os = "macos"))]
async fn run_until_interrupted() -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(&args);

    let settings = resolve_settings(&args)?;
    let initial = settings
        .configuration()
        .context("Invalid blocklist configuration")?;

    let controller = ObserverController::builder(platform::native(settings.poll_interval()))
        .retry_policy(settings.retry_policy())
        .configuration(initial)
        .runtime(tokio::runtime::Handle::current())
        .build()
        .context("Failed to create controller")?;

    if args.check_permissions {
        report_permissions(&controller);
        return Ok(());
    }

    if !controller.has_permissions() {
        if !args.prompt {
            report_permissions(&controller);
            bail!("accessibility permission is required");
        }
        if !controller.request_permissions() {
            warn!("Permission prompt shown; grant access and run again");
            bail!("accessibility permission is required");
        }
    }

    let printer = Arc::new(EventPrinter::new(args.format));
    let on_window = Arc::clone(&printer);
    controller.on_window_change(move |event| on_window.window_changed(event));
    let on_failure = Arc::clone(&printer);
    controller.on_enforcement_failure(move |failure| on_failure.enforcement_failed(failure));

    controller
        .start_monitoring()
        .context("Failed to start monitoring")?;

    let config = controller.configuration();
    info!(
        domains = config.blocklist.len(),
        enabled = config.enabled,
        policy = ?config.policy,
        "focus guard running, press Ctrl+C to stop"
    );

    run_until_interrupted().await?;

    controller.stop_monitoring();
    info!("stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_loop_pump_stops_when_interrupted() {
        let interrupted = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&interrupted);
        let setter = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            flag.store(true, Ordering::Release);
        });

        let mut slices = 0;
        pump_until(&interrupted, Duration::from_millis(5), |_| {
            slices += 1;
            true
        });
        setter.join().unwrap();
        assert!(slices > 0);
        // Idle slices sleep, so the pump did not spin
        assert!(slices < 50, "spun {} times", slices);
    }

    #[test]
    fn test_cli_overrides_settings() {
        let args = Args::parse_from([
            "focus-guard",
            "--block",
            "badsite.com",
            "--block",
            "news.example.com",
            "--redirect",
            "https://safe.example",
            "--policy",
            "input",
            "--disabled",
        ]);
        let settings = resolve_settings(&args).unwrap();
        assert_eq!(settings.blocked_domains, vec!["badsite.com", "news.example.com"]);
        assert_eq!(settings.policy, RedirectPolicy::InputSimulation);
        assert!(!settings.enabled);
        assert!(settings.configuration().is_ok());
    }
}
