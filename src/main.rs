//! supertap-daemon: turns a clean modifier-key tap into a synthesized keystroke
//!
//! The daemon runs as a system service and provides:
//! - Monitoring of every physical keyboard and pointer via evdev
//! - Hotplug handling for devices connected while running
//! - A tap detector that ignores the trigger when used in a chord,
//!   with a mouse button, or while scrolling
//! - Injection of the configured key(s) through a uinput virtual device
//!
//! Without access to /dev/uinput the daemon still detects and logs taps but
//! injects nothing. Without access to /dev/input it exits with an error.

mod config;
mod daemon;
mod device;
mod events;
mod hotkey;
mod hotplug;
mod inject;
mod lifecycle;
mod state;

use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::daemon::Daemon;
use crate::lifecycle::ShutdownSignal;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "supertap-daemon starting"
    );

    // Load configuration
    let config_path = config::resolve_config_path();
    let config = Config::load(config_path.as_deref());
    info!(
        trigger = %config.trigger_key,
        injection = %config.injection_display(),
        tap_timeout_ms = config.tap_timeout.as_millis() as u64,
        "configuration loaded"
    );

    let shutdown = ShutdownSignal::new();
    let daemon = Daemon::new(config);

    if let Err(e) = daemon.run(shutdown.wait()).await {
        error!(error = %e, "daemon failed");
        return Err(e.into());
    }

    info!("supertap-daemon stopped");

    Ok(())
}
