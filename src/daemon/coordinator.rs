//! Daemon lifecycle: startup scan, hotplug, tap detection and shutdown

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::manager::DeviceManager;
use crate::config::Config;
use crate::device::{list_event_nodes, INPUT_DIR};
use crate::hotplug::DeviceWatcher;
use crate::inject::Injector;
use crate::state::TapDetector;

/// Depth of the queue between device monitors and the tap detector
const EVENT_QUEUE_DEPTH: usize = 256;

/// Errors that stop the daemon
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("cannot enumerate input devices in {dir}: {source} - run as root or join the 'input' group")]
    Enumeration {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Owns every long-running part of the daemon
pub struct Daemon {
    config: Config,
    input_dir: PathBuf,
}

impl Daemon {
    pub fn new(config: Config) -> Self {
        Self::with_input_dir(config, Path::new(INPUT_DIR))
    }

    /// Use a different device directory (tests)
    pub fn with_input_dir(config: Config, input_dir: &Path) -> Self {
        Self {
            config,
            input_dir: input_dir.to_path_buf(),
        }
    }

    /// Run until `shutdown` resolves.
    ///
    /// Only an unreadable device directory is an error; everything else
    /// degrades and is logged.
    pub async fn run<F>(self, shutdown: F) -> Result<(), DaemonError>
    where
        F: Future<Output = ()>,
    {
        // Fail before creating anything if devices cannot be listed at all
        let nodes = list_event_nodes(&self.input_dir).map_err(|source| DaemonError::Enumeration {
            dir: self.input_dir.clone(),
            source,
        })?;

        let injector = Arc::new(Injector::create(&self.config));

        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let detector = TapDetector::new(self.config.trigger_key.code(), self.config.tap_timeout);
        let detector_task = tokio::spawn(detector.run(event_rx, Arc::clone(&injector)));

        let cancel = CancellationToken::new();
        let manager = Arc::new(DeviceManager::new(event_tx, cancel.clone()));

        for path in &nodes {
            manager.add(path);
        }
        if manager.device_count() == 0 {
            warn!("no input devices found, waiting for devices to be connected");
        }
        for device in manager.devices() {
            info!(path = %device.path.display(), name = %device.name, kind = %device.kind, "found device");
        }

        let watcher = DeviceWatcher::select(&self.input_dir);
        let watcher_cancel = cancel.child_token();
        info!(strategy = watcher.strategy(), "starting hotplug watcher");
        let watcher_task = tokio::spawn(watcher.watch(Arc::clone(&manager), watcher_cancel.clone()));

        info!(devices = manager.device_count(), "daemon initialized, entering main loop");

        shutdown.await;
        info!("shutting down...");

        // Children first: watcher, then monitors, then the detector queue
        watcher_cancel.cancel();
        if let Err(e) = watcher_task.await {
            warn!(error = %e, "hotplug watcher task failed");
        }

        manager.shutdown().await;
        drop(manager);

        if let Err(e) = detector_task.await {
            warn!(error = %e, "tap detector task failed");
        }

        injector.close().await;

        Ok(())
    }
}
