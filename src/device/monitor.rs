//! Per-device reader task
//!
//! Reads one device's event stream, decodes the events the tap detector
//! needs and forwards them in arrival order. A read error means the device
//! went away: the monitor drops its handle and removes itself from the table.

use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use evdev::{EventStream, InputEvent};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::table::DeviceTable;
use crate::events::{DeviceEvent, InputKind};

/// An async source of raw input events
pub trait EventSource: Send + 'static {
    fn next_event(&mut self) -> impl Future<Output = io::Result<InputEvent>> + Send;
}

impl EventSource for EventStream {
    fn next_event(&mut self) -> impl Future<Output = io::Result<InputEvent>> + Send {
        EventStream::next_event(self)
    }
}

/// Why a monitor stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorExit {
    /// Cancelled by shutdown or explicit removal
    Cancelled,
    /// Read error, usually an unplugged device
    Disconnected,
    /// The tap detector is gone
    DetectorClosed,
}

/// Everything a monitor needs besides its event source
pub struct Monitor {
    pub path: Arc<PathBuf>,
    pub name: String,
    pub generation: u64,
    pub events: mpsc::Sender<DeviceEvent>,
    pub cancel: CancellationToken,
    pub table: DeviceTable,
}

impl Monitor {
    /// Read events until cancelled, disconnected, or the detector stops.
    ///
    /// The source is dropped (closing the device) before this returns.
    pub async fn run<S: EventSource>(self, mut source: S) -> MonitorExit {
        debug!(path = %self.path.display(), name = %self.name, "monitoring device");

        let exit = loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    break MonitorExit::Cancelled;
                }

                result = source.next_event() => {
                    match result {
                        Ok(raw) => {
                            let Some(kind) = InputKind::decode(&raw) else {
                                continue;
                            };
                            let event = DeviceEvent {
                                source: Arc::clone(&self.path),
                                at: Instant::now(),
                                kind,
                            };
                            if self.events.send(event).await.is_err() {
                                break MonitorExit::DetectorClosed;
                            }
                        }
                        Err(e) => {
                            warn!(
                                path = %self.path.display(),
                                name = %self.name,
                                error = %e,
                                "device disconnected"
                            );
                            break MonitorExit::Disconnected;
                        }
                    }
                }
            }
        };

        drop(source);

        if exit != MonitorExit::Cancelled
            && self.table.remove_if_current(&self.path, self.generation)
        {
            info!(
                path = %self.path.display(),
                remaining = self.table.len(),
                "device removed from monitoring"
            );
        }

        debug!(path = %self.path.display(), ?exit, "stopped monitoring device");
        exit
    }
}
