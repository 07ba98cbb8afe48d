//! Owns the device table and starts or stops device monitors

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::device::{
    open_if_eligible, DeviceKind, DeviceSummary, DeviceTable, EventSource, Monitor, MonitorEntry,
};
use crate::events::DeviceEvent;
use crate::hotplug::DeviceHandler;

/// Adds and removes device monitors; shared by startup scan and hotplug
pub struct DeviceManager {
    table: DeviceTable,
    events: mpsc::Sender<DeviceEvent>,
    cancel: CancellationToken,
}

impl DeviceManager {
    /// `cancel` is the parent of every monitor's token
    pub fn new(events: mpsc::Sender<DeviceEvent>, cancel: CancellationToken) -> Self {
        Self {
            table: DeviceTable::new(),
            events,
            cancel,
        }
    }

    /// Open, classify and start monitoring a device node.
    ///
    /// Returns false if the node is already monitored, ineligible or
    /// unreadable, or the manager is shutting down.
    pub fn add(&self, path: &Path) -> bool {
        self.insert_monitor(path, || {
            let (device, profile, kind) = open_if_eligible(path)?;
            match device.into_event_stream() {
                Ok(stream) => Some((profile.name, kind, stream)),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to create event stream");
                    None
                }
            }
        })
    }

    /// Start a monitor for `path` over the source produced by `open`.
    ///
    /// `open` only runs if the path is not already monitored, and runs
    /// outside the table lock. If another add wins the race meanwhile, the
    /// freshly opened source is dropped.
    pub fn insert_monitor<S, F>(&self, path: &Path, open: F) -> bool
    where
        S: EventSource,
        F: FnOnce() -> Option<(String, DeviceKind, S)>,
    {
        if self.cancel.is_cancelled() || self.table.contains(path) {
            return false;
        }
        let Some((name, kind, source)) = open() else {
            return false;
        };

        let inserted = self.table.insert_with(path, |generation| {
            if self.cancel.is_cancelled() {
                return None;
            }
            Some(self.spawn_monitor(path, name.clone(), kind, generation, source))
        });
        if !inserted {
            debug!(path = %path.display(), "device added concurrently, closing duplicate");
            return false;
        }

        info!(
            path = %path.display(),
            %name,
            %kind,
            total = self.table.len(),
            "monitoring device"
        );
        true
    }

    fn spawn_monitor<S: EventSource>(
        &self,
        path: &Path,
        name: String,
        kind: DeviceKind,
        generation: u64,
        source: S,
    ) -> MonitorEntry {
        let cancel = self.cancel.child_token();
        let monitor = Monitor {
            path: Arc::new(path.to_path_buf()),
            name: name.clone(),
            generation,
            events: self.events.clone(),
            cancel: cancel.clone(),
            table: self.table.clone(),
        };

        let task = tokio::spawn(async move {
            monitor.run(source).await;
        });

        MonitorEntry::new(name, kind, generation, cancel, task)
    }

    /// Stop monitoring `path`. Absent paths are a no-op.
    pub fn remove(&self, path: &Path) -> bool {
        match self.table.remove(path) {
            Some(entry) => {
                info!(
                    path = %path.display(),
                    name = %entry.name,
                    remaining = self.table.len(),
                    "device removed"
                );
                true
            }
            None => false,
        }
    }

    pub fn device_count(&self) -> usize {
        self.table.len()
    }

    pub fn devices(&self) -> Vec<DeviceSummary> {
        self.table.snapshot()
    }

    /// Refuse further additions, cancel every monitor and wait for each to
    /// release its device.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let entries = self.table.drain();
        let count = entries.len();
        for entry in entries {
            entry.stop().await;
        }
        info!(count, "all device monitors stopped");
    }
}

impl DeviceHandler for DeviceManager {
    fn add_device(&self, path: &Path) -> bool {
        self.add(path)
    }

    fn remove_device(&self, path: &Path) -> bool {
        self.remove(path)
    }

    fn monitored_paths(&self) -> Vec<PathBuf> {
        self.table.paths()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::time::Duration;

    use evdev::{EventType, InputEvent, Key};

    use crate::device::testing::ChannelSource;
    use crate::inject::testing::RecordingSink;
    use crate::inject::Injector;
    use crate::state::TapDetector;

    type Feed = mpsc::UnboundedSender<io::Result<InputEvent>>;

    fn attach(manager: &DeviceManager, path: &str) -> (bool, Feed) {
        let (feed, source) = ChannelSource::new();
        let added = manager.insert_monitor(Path::new(path), move || {
            Some(("Test Device".to_string(), DeviceKind::Combo, source))
        });
        (added, feed)
    }

    fn key(feed: &Feed, key: Key, value: i32) {
        feed.send(Ok(InputEvent::new(EventType::KEY, key.code(), value)))
            .unwrap();
    }

    /// Poll `condition` until it holds, failing the test after two seconds
    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_add_twice_keeps_one_entry() {
        let (tx, _rx) = mpsc::channel(16);
        let manager = DeviceManager::new(tx, CancellationToken::new());

        let (first, _feed1) = attach(&manager, "/dev/input/event3");
        let (second, _feed2) = attach(&manager, "/dev/input/event3");

        assert!(first);
        assert!(!second);
        assert_eq!(manager.device_count(), 1);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_remove_absent_is_noop() {
        let (tx, _rx) = mpsc::channel(16);
        let manager = DeviceManager::new(tx, CancellationToken::new());

        assert!(!manager.remove(Path::new("/dev/input/event42")));
        assert!(!manager.remove_device(Path::new("/dev/input/event42")));
    }

    #[tokio::test]
    async fn test_add_ineligible_path_is_rejected() {
        let (tx, _rx) = mpsc::channel(16);
        let manager = DeviceManager::new(tx, CancellationToken::new());

        assert!(!manager.add(Path::new("/nonexistent/event0")));
        assert_eq!(manager.device_count(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_removes_device() {
        let (tx, _rx) = mpsc::channel(16);
        let manager = DeviceManager::new(tx, CancellationToken::new());

        let (_, feed) = attach(&manager, "/dev/input/event5");
        assert_eq!(manager.monitored_paths(), vec![PathBuf::from("/dev/input/event5")]);

        drop(feed);
        wait_until(|| manager.device_count() == 0).await;
    }

    #[tokio::test]
    async fn test_open_runs_outside_table_lock() {
        let (tx, _rx) = mpsc::channel(16);
        let manager = DeviceManager::new(tx, CancellationToken::new());
        let (_feed, source) = ChannelSource::new();

        let added = manager.insert_monitor(Path::new("/dev/input/event3"), || {
            // Would deadlock if the table were locked while opening
            assert_eq!(manager.device_count(), 0);
            assert!(manager.devices().is_empty());
            Some(("Slow Device".to_string(), DeviceKind::Keyboard, source))
        });

        assert!(added);
        assert_eq!(manager.device_count(), 1);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_losing_add_race_closes_duplicate() {
        let (tx, _rx) = mpsc::channel(16);
        let manager = DeviceManager::new(tx, CancellationToken::new());
        let path = "/dev/input/event6";
        let (late_feed, late_source) = ChannelSource::new();
        let mut winner_feed = None;

        let added = manager.insert_monitor(Path::new(path), || {
            // Another add for the same node completes while this one opens
            let (won, feed) = attach(&manager, path);
            assert!(won);
            winner_feed = Some(feed);
            Some(("Test Device".to_string(), DeviceKind::Combo, late_source))
        });

        assert!(!added);
        assert_eq!(manager.device_count(), 1);
        // The duplicate source was dropped; the winner's is still read
        assert!(late_feed
            .send(Ok(InputEvent::new(EventType::KEY, Key::KEY_A.code(), 1)))
            .is_err());
        assert!(winner_feed
            .unwrap()
            .send(Ok(InputEvent::new(EventType::KEY, Key::KEY_A.code(), 1)))
            .is_ok());
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_no_additions_after_shutdown() {
        let (tx, _rx) = mpsc::channel(16);
        let manager = DeviceManager::new(tx, CancellationToken::new());
        let (_, _feed) = attach(&manager, "/dev/input/event1");

        manager.shutdown().await;
        assert_eq!(manager.device_count(), 0);

        let (added, _feed) = attach(&manager, "/dev/input/event2");
        assert!(!added);
    }

    #[tokio::test]
    async fn test_disconnect_mid_session_then_fresh_tap() {
        let (tx, rx) = mpsc::channel(64);
        let manager = DeviceManager::new(tx, CancellationToken::new());

        let (sink, log) = RecordingSink::new();
        let injector = Arc::new(Injector::with_sink(
            sink,
            vec![Key::KEY_LEFTCTRL],
            Duration::from_millis(1),
        ));
        let detector = TapDetector::new(Key::KEY_LEFTMETA, Duration::from_millis(500));
        let detector_task = tokio::spawn(detector.run(rx, Arc::clone(&injector)));

        let (_, keyboard_a) = attach(&manager, "/dev/input/event1");
        let (_, keyboard_b) = attach(&manager, "/dev/input/event2");

        // Trigger goes down on A, then A is unplugged before the release
        // A's monitor forwards the press before it sees the disconnect
        key(&keyboard_a, Key::KEY_LEFTMETA, 1);
        drop(keyboard_a);
        wait_until(|| manager.device_count() == 1).await;
        assert!(log.batches().is_empty());

        // A fresh tap on B behaves normally
        key(&keyboard_b, Key::KEY_LEFTMETA, 1);
        key(&keyboard_b, Key::KEY_LEFTMETA, 0);
        wait_until(|| log.batches().len() == 2).await;

        manager.shutdown().await;
        drop(manager);
        detector_task.await.unwrap();

        // Exactly one injection (press batch + release batch) from the fresh tap
        assert_eq!(log.batches().len(), 2);
    }
}
