//! Physical input devices: classification, per-device monitoring and the
//! table of devices currently being monitored.

mod classifier;
mod monitor;
mod table;

use std::io;
use std::path::{Path, PathBuf};

pub use classifier::{open_if_eligible, DeviceKind};
pub use monitor::{EventSource, Monitor};
pub use table::{DeviceSummary, DeviceTable, MonitorEntry};

#[cfg(test)]
pub(crate) use monitor::testing;

/// Directory holding the evdev device nodes
pub const INPUT_DIR: &str = "/dev/input";

/// Whether a path names an evdev event node (`eventN`)
pub fn is_event_node(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with("event"))
}

/// List the event nodes under `dir`, sorted.
///
/// An unreadable directory is an error; callers treat it as fatal at startup.
pub fn list_event_nodes(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut nodes: Vec<PathBuf> = std::fs::read_dir(dir)?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| is_event_node(path))
        .collect();
    nodes.sort();
    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_is_event_node() {
        assert!(is_event_node(Path::new("/dev/input/event0")));
        assert!(is_event_node(Path::new("/dev/input/event12")));
        assert!(!is_event_node(Path::new("/dev/input/mice")));
        assert!(!is_event_node(Path::new("/dev/input/js0")));
        assert!(!is_event_node(Path::new("/dev/input/by-id")));
    }

    #[test]
    fn test_list_event_nodes() {
        let dir = tempdir().unwrap();
        for name in ["event2", "event0", "mouse0", "mice"] {
            fs::write(dir.path().join(name), "").unwrap();
        }

        let nodes = list_event_nodes(dir.path()).unwrap();
        assert_eq!(
            nodes,
            vec![dir.path().join("event0"), dir.path().join("event2")]
        );
    }

    #[test]
    fn test_list_missing_dir_is_error() {
        let dir = tempdir().unwrap();
        assert!(list_event_nodes(&dir.path().join("input")).is_err());
    }
}
