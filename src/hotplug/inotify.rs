//! Event-driven hotplug using filesystem notifications on `/dev/input`

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::event::EventKind;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::DeviceHandler;
use crate::device::is_event_node;

/// A device node change reported by the kernel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HotplugEvent {
    Added(PathBuf),
    Removed(PathBuf),
}

/// Translate a raw notification into event-node arrivals and removals
pub fn classify(event: &notify::Event) -> Vec<HotplugEvent> {
    let wrap: fn(PathBuf) -> HotplugEvent = match event.kind {
        EventKind::Create(_) => HotplugEvent::Added,
        EventKind::Remove(_) => HotplugEvent::Removed,
        _ => return Vec::new(),
    };

    event
        .paths
        .iter()
        .filter(|path| is_event_node(path))
        .cloned()
        .map(wrap)
        .collect()
}

/// Watches the input directory for created and removed nodes
pub struct NotifyWatcher {
    // Dropping the watcher stops the notifications
    _watcher: RecommendedWatcher,
    rx: mpsc::UnboundedReceiver<notify::Result<notify::Event>>,
    settle: Duration,
}

impl NotifyWatcher {
    /// Subscribe to changes in `dir`
    pub fn new(dir: &Path, settle: Duration) -> notify::Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            // Receiver gone means the watcher is shutting down
            let _ = tx.send(res);
        })?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;

        Ok(Self {
            _watcher: watcher,
            rx,
            settle,
        })
    }

    pub async fn run<H: DeviceHandler>(mut self, handler: Arc<H>, cancel: CancellationToken) {
        info!("device hotplug monitoring enabled (notifications)");

        // Adds still waiting out their settle delay
        let mut pending = JoinSet::new();

        loop {
            let result = tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                Some(_) = pending.join_next(), if !pending.is_empty() => continue,

                result = self.rx.recv() => match result {
                    Some(result) => result,
                    None => break,
                },
            };

            let event = match result {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "device notification error");
                    continue;
                }
            };

            for change in classify(&event) {
                match change {
                    HotplugEvent::Added(path) => {
                        debug!(path = %path.display(), "device node created");
                        self.add_after_settle(&mut pending, path, &handler, &cancel);
                    }
                    HotplugEvent::Removed(path) => {
                        debug!(path = %path.display(), "device node removed");
                        handler.remove_device(&path);
                    }
                }
            }
        }

        pending.abort_all();
        while pending.join_next().await.is_some() {}

        info!("device hotplug monitoring stopped");
    }

    /// Give the kernel and udev time to finish setting up the node before
    /// probing its capabilities.
    fn add_after_settle<H: DeviceHandler>(
        &self,
        pending: &mut JoinSet<()>,
        path: PathBuf,
        handler: &Arc<H>,
        cancel: &CancellationToken,
    ) {
        let handler = Arc::clone(handler);
        let cancel = cancel.clone();
        let settle = self.settle;

        pending.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(settle) => {
                    handler.add_device(&path);
                }
            }
        });
    }
}
