//! Polling hotplug fallback: rescan the input directory on an interval

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::DeviceHandler;
use crate::device::list_event_nodes;

/// Periodic rescanner
pub struct PollingWatcher {
    dir: PathBuf,
    interval: Duration,
}

impl PollingWatcher {
    pub fn new(dir: &Path, interval: Duration) -> Self {
        Self {
            dir: dir.to_path_buf(),
            interval,
        }
    }

    pub async fn run<H: DeviceHandler>(self, handler: Arc<H>, cancel: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs_f64(),
            "device hotplug monitoring enabled (polling)"
        );

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }

            if let Err(e) = self.rescan(handler.as_ref()) {
                warn!(dir = %self.dir.display(), error = %e, "device rescan failed");
            }
        }

        info!("device hotplug monitoring stopped");
    }

    /// One diff pass against the monitored set.
    ///
    /// New nodes are added. Monitored nodes whose file is gone are removed;
    /// normally their monitor has already noticed the read error, and a
    /// second removal is a no-op.
    pub fn rescan<H: DeviceHandler>(&self, handler: &H) -> std::io::Result<()> {
        let current: HashSet<PathBuf> = list_event_nodes(&self.dir)?.into_iter().collect();
        let monitored: HashSet<PathBuf> = handler.monitored_paths().into_iter().collect();

        let mut added: Vec<&PathBuf> = current.difference(&monitored).collect();
        added.sort();
        for path in added {
            handler.add_device(path);
        }

        for path in monitored.difference(&current) {
            if !path.exists() {
                handler.remove_device(path);
            }
        }

        Ok(())
    }
}
