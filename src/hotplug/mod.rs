//! Device hotplug detection
//!
//! Two interchangeable strategies behind [`DeviceWatcher`]:
//! - notifications on the input directory (preferred)
//! - periodic rescanning when notifications are unavailable

mod inotify;
mod poll;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

pub use inotify::NotifyWatcher;
pub use poll::PollingWatcher;

/// Delay between a node appearing and probing it
pub const ADD_SETTLE: Duration = Duration::from_millis(500);

/// Rescan period for the polling fallback
pub const SCAN_INTERVAL: Duration = Duration::from_secs(5);

/// Receiver of hotplug decisions. Both calls must be idempotent.
pub trait DeviceHandler: Send + Sync + 'static {
    /// Start monitoring `path` if it is eligible and not already monitored
    fn add_device(&self, path: &Path) -> bool;

    /// Stop monitoring `path`; a no-op if it is not monitored
    fn remove_device(&self, path: &Path) -> bool;

    /// Paths currently monitored
    fn monitored_paths(&self) -> Vec<PathBuf>;
}

/// The hotplug strategy chosen at startup
pub enum DeviceWatcher {
    Notify(NotifyWatcher),
    Polling(PollingWatcher),
}

impl DeviceWatcher {
    /// Prefer notifications on `dir`; fall back to polling if they cannot be
    /// set up.
    pub fn select(dir: &Path) -> Self {
        match NotifyWatcher::new(dir, ADD_SETTLE) {
            Ok(watcher) => DeviceWatcher::Notify(watcher),
            Err(e) => {
                warn!(error = %e, "device notifications unavailable, falling back to polling");
                DeviceWatcher::Polling(PollingWatcher::new(dir, SCAN_INTERVAL))
            }
        }
    }

    pub fn strategy(&self) -> &'static str {
        match self {
            DeviceWatcher::Notify(_) => "notify",
            DeviceWatcher::Polling(_) => "polling",
        }
    }

    /// Run until cancelled. Devices already being monitored are unaffected by
    /// cancellation.
    pub async fn watch<H: DeviceHandler>(self, handler: Arc<H>, cancel: CancellationToken) {
        match self {
            DeviceWatcher::Notify(watcher) => watcher.run(handler, cancel).await,
            DeviceWatcher::Polling(watcher) => watcher.run(handler, cancel).await,
        }
    }
}
