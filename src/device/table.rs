//! Table of monitored devices, keyed by device node path

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::classifier::DeviceKind;

/// One monitored device: its monitor task and the token that stops it
#[derive(Debug)]
pub struct MonitorEntry {
    pub name: String,
    pub kind: DeviceKind,
    generation: u64,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl MonitorEntry {
    pub fn new(
        name: String,
        kind: DeviceKind,
        generation: u64,
        cancel: CancellationToken,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            name,
            kind,
            generation,
            cancel,
            task,
        }
    }

    /// Stop the monitor and wait for it to release its device
    pub async fn stop(self) {
        self.cancel.cancel();
        // A panicked monitor has already dropped its device
        let _ = self.task.await;
    }
}

/// Diagnostic view of one table entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSummary {
    pub path: PathBuf,
    pub name: String,
    pub kind: DeviceKind,
}

#[derive(Debug, Default)]
struct TableInner {
    entries: HashMap<PathBuf, MonitorEntry>,
    next_generation: u64,
}

/// Shared device table.
///
/// Each path appears at most once. All check-then-mutate sequences happen
/// under one lock, so concurrent adds or removes of the same path are safe.
#[derive(Debug, Clone, Default)]
pub struct DeviceTable {
    inner: Arc<Mutex<TableInner>>,
}

impl DeviceTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TableInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert an entry built by `start` unless `path` is already present.
    ///
    /// `start` receives the generation number for the new entry and runs
    /// under the table lock; it must not block, so open devices before
    /// calling this. Returns whether an entry was inserted.
    pub fn insert_with<F>(&self, path: &Path, start: F) -> bool
    where
        F: FnOnce(u64) -> Option<MonitorEntry>,
    {
        let mut inner = self.lock();
        if inner.entries.contains_key(path) {
            return false;
        }

        let generation = inner.next_generation;
        match start(generation) {
            Some(entry) => {
                inner.next_generation += 1;
                inner.entries.insert(path.to_path_buf(), entry);
                true
            }
            None => false,
        }
    }

    /// Remove and cancel the entry for `path`. Absent paths are a no-op.
    pub fn remove(&self, path: &Path) -> Option<MonitorEntry> {
        let entry = self.lock().entries.remove(path)?;
        entry.cancel.cancel();
        Some(entry)
    }

    /// Remove the entry for `path` only if it is still the given generation.
    ///
    /// Used by a monitor cleaning up after itself, so it cannot evict a newer
    /// monitor for the same node.
    pub fn remove_if_current(&self, path: &Path, generation: u64) -> bool {
        let mut inner = self.lock();
        match inner.entries.get(path) {
            Some(entry) if entry.generation == generation => {
                inner.entries.remove(path);
                true
            }
            _ => false,
        }
    }

    /// Remove every entry, cancelling each monitor
    pub fn drain(&self) -> Vec<MonitorEntry> {
        let entries: Vec<MonitorEntry> = self.lock().entries.drain().map(|(_, e)| e).collect();
        for entry in &entries {
            entry.cancel.cancel();
        }
        entries
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.lock().entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.lock().entries.keys().cloned().collect()
    }

    /// Sorted summary of every monitored device
    pub fn snapshot(&self) -> Vec<DeviceSummary> {
        let mut summary: Vec<DeviceSummary> = self
            .lock()
            .entries
            .iter()
            .map(|(path, entry)| DeviceSummary {
                path: path.clone(),
                name: entry.name.clone(),
                kind: entry.kind,
            })
            .collect();
        summary.sort_by(|a, b| a.path.cmp(&b.path));
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idle_entry(name: &str, generation: u64) -> (MonitorEntry, CancellationToken) {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn({
            let token = token.clone();
            async move { token.cancelled().await }
        });
        (
            MonitorEntry::new(name.to_string(), DeviceKind::Keyboard, generation, cancel, task),
            token,
        )
    }

    #[tokio::test]
    async fn test_insert_is_idempotent() {
        let table = DeviceTable::new();
        let path = Path::new("/dev/input/event3");

        assert!(table.insert_with(path, |g| Some(idle_entry("kbd", g).0)));

        let mut called = false;
        assert!(!table.insert_with(path, |g| {
            called = true;
            Some(idle_entry("kbd", g).0)
        }));
        assert!(!called, "second add must not open the device again");
        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn test_declined_start_inserts_nothing() {
        let table = DeviceTable::new();
        assert!(!table.insert_with(Path::new("/dev/input/event1"), |_| None));
        assert_eq!(table.len(), 0);
    }

    #[tokio::test]
    async fn test_remove_cancels_monitor() {
        let table = DeviceTable::new();
        let path = Path::new("/dev/input/event4");
        let mut token = None;
        table.insert_with(path, |g| {
            let (entry, t) = idle_entry("mouse", g);
            token = Some(t);
            Some(entry)
        });

        let entry = table.remove(path).unwrap();
        assert!(token.unwrap().is_cancelled());
        entry.stop().await;
        assert!(!table.contains(path));
    }

    #[tokio::test]
    async fn test_remove_absent_is_noop() {
        let table = DeviceTable::new();
        assert!(table.remove(Path::new("/dev/input/event9")).is_none());
        assert!(!table.remove_if_current(Path::new("/dev/input/event9"), 0));
    }

    #[tokio::test]
    async fn test_stale_generation_does_not_evict() {
        let table = DeviceTable::new();
        let path = Path::new("/dev/input/event5");

        let mut first = None;
        table.insert_with(path, |g| {
            first = Some(g);
            Some(idle_entry("old", g).0)
        });
        table.remove(path).unwrap().stop().await;

        table.insert_with(path, |g| Some(idle_entry("new", g).0));

        // The old monitor's cleanup arrives late
        assert!(!table.remove_if_current(path, first.unwrap()));
        assert!(table.contains(path));
    }

    #[tokio::test]
    async fn test_drain_and_snapshot() {
        let table = DeviceTable::new();
        table.insert_with(Path::new("/dev/input/event2"), |g| Some(idle_entry("b", g).0));
        table.insert_with(Path::new("/dev/input/event1"), |g| Some(idle_entry("a", g).0));

        let snapshot = table.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].path, Path::new("/dev/input/event1"));
        assert_eq!(snapshot[0].name, "a");

        let drained = table.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(table.len(), 0);
        for entry in drained {
            entry.stop().await;
        }
    }
}
