//! Virtual keyboard that emits the configured injection keys

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, EventType, InputEvent, Key};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::Config;

/// Name of the daemon's own virtual device; the classifier skips it
pub const VIRTUAL_DEVICE_NAME: &str = "Supertap Virtual Keyboard";

/// Something that accepts a batch of input events.
///
/// Each call must write the batch followed by a `SYN_REPORT`, which is
/// what [`VirtualDevice::emit`] does.
pub trait KeySink: Send + 'static {
    fn emit(&mut self, events: &[InputEvent]) -> io::Result<()>;
}

impl KeySink for VirtualDevice {
    fn emit(&mut self, events: &[InputEvent]) -> io::Result<()> {
        VirtualDevice::emit(self, events)
    }
}

/// Errors that can occur while injecting
#[derive(Debug, thiserror::Error)]
pub enum InjectError {
    #[error("injection is disabled (no virtual device)")]
    Disabled,

    #[error("failed to write key press: {0}")]
    Press(#[source] io::Error),

    #[error("failed to write key release: {0}")]
    Release(#[source] io::Error),
}

/// Emits the injection keys as a press/release pair
pub struct Injector<S> {
    sink: Mutex<Option<S>>,
    enabled: AtomicBool,
    keys: Vec<Key>,
    settle: Duration,
}

impl Injector<VirtualDevice> {
    /// Create the uinput device for the configured injection keys.
    ///
    /// Failure is logged and yields a disabled injector.
    pub fn create(config: &Config) -> Self {
        let keys: Vec<Key> = config.injection_keys.iter().map(|k| k.code()).collect();

        match build_virtual_device(&keys) {
            Ok(device) => {
                info!(
                    name = VIRTUAL_DEVICE_NAME,
                    keys = %config.injection_display(),
                    "virtual input device created"
                );
                Self::with_sink(device, keys, config.settle)
            }
            Err(e) => {
                warn!(error = %e, "failed to create virtual input device");
                warn!("continuing in detect-only mode - check access to /dev/uinput");
                Self::disabled(keys, config.settle)
            }
        }
    }
}

fn build_virtual_device(keys: &[Key]) -> io::Result<VirtualDevice> {
    let mut supported = AttributeSet::<Key>::new();
    for key in keys {
        supported.insert(*key);
    }

    VirtualDeviceBuilder::new()?
        .name(VIRTUAL_DEVICE_NAME)
        .with_keys(&supported)?
        .build()
}

impl<S: KeySink> Injector<S> {
    /// Wrap an existing sink
    pub fn with_sink(sink: S, keys: Vec<Key>, settle: Duration) -> Self {
        Self {
            sink: Mutex::new(Some(sink)),
            enabled: AtomicBool::new(true),
            keys,
            settle,
        }
    }

    /// An injector that only reports [`InjectError::Disabled`]
    pub fn disabled(keys: Vec<Key>, settle: Duration) -> Self {
        Self {
            sink: Mutex::new(None),
            enabled: AtomicBool::new(false),
            keys,
            settle,
        }
    }

    /// Check whether a virtual device is available
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Press every key in order, wait the settle interval, then release in
    /// reverse order. Concurrent calls are serialized.
    pub async fn inject(&self) -> Result<(), InjectError> {
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(InjectError::Disabled)?;

        debug!(keys = ?self.keys, "injecting keys");

        let presses: Vec<InputEvent> = self.keys.iter().map(|k| key_event(*k, 1)).collect();
        sink.emit(&presses).map_err(InjectError::Press)?;

        tokio::time::sleep(self.settle).await;

        let releases: Vec<InputEvent> = self.keys.iter().rev().map(|k| key_event(*k, 0)).collect();
        sink.emit(&releases).map_err(InjectError::Release)?;

        Ok(())
    }

    /// Drop the virtual device. Later injections report `Disabled`.
    pub async fn close(&self) {
        self.enabled.store(false, Ordering::SeqCst);
        if self.sink.lock().await.take().is_some() {
            info!("virtual input device closed");
        }
    }
}

fn key_event(key: Key, value: i32) -> InputEvent {
    InputEvent::new(EventType::KEY, key.code(), value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inject::testing::RecordingSink;

    fn codes(batch: &[InputEvent]) -> Vec<(u16, i32)> {
        batch.iter().map(|e| (e.code(), e.value())).collect()
    }

    #[tokio::test]
    async fn test_press_then_release_in_reverse() {
        let (sink, log) = RecordingSink::new();
        let injector = Injector::with_sink(
            sink,
            vec![Key::KEY_LEFTCTRL, Key::KEY_LEFTMETA],
            Duration::from_millis(1),
        );

        injector.inject().await.unwrap();

        let batches = log.batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(
            codes(&batches[0]),
            vec![(Key::KEY_LEFTCTRL.code(), 1), (Key::KEY_LEFTMETA.code(), 1)]
        );
        assert_eq!(
            codes(&batches[1]),
            vec![(Key::KEY_LEFTMETA.code(), 0), (Key::KEY_LEFTCTRL.code(), 0)]
        );
        assert!(batches
            .iter()
            .flatten()
            .all(|e| e.event_type() == EventType::KEY));
    }

    #[test]
    fn test_disabled_injector() {
        let injector: Injector<RecordingSink> =
            Injector::disabled(vec![Key::KEY_LEFTCTRL], Duration::from_millis(1));
        assert!(!injector.is_enabled());

        let result = tokio_test::block_on(injector.inject());
        assert!(matches!(result, Err(InjectError::Disabled)));
    }

    #[tokio::test]
    async fn test_write_failure_is_reported() {
        let (sink, log) = RecordingSink::failing();
        let injector = Injector::with_sink(sink, vec![Key::KEY_LEFTCTRL], Duration::from_millis(1));

        assert!(matches!(injector.inject().await, Err(InjectError::Press(_))));
        assert!(log.batches().is_empty());
        // Still usable afterwards; no retry, no state change
        assert!(injector.is_enabled());
    }

    #[tokio::test]
    async fn test_close_disables() {
        let (sink, log) = RecordingSink::new();
        let injector = Injector::with_sink(sink, vec![Key::KEY_LEFTCTRL], Duration::from_millis(1));

        injector.close().await;
        assert!(!injector.is_enabled());
        assert!(matches!(injector.inject().await, Err(InjectError::Disabled)));
        assert!(log.batches().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_injections_do_not_interleave() {
        let (sink, log) = RecordingSink::new();
        let injector = std::sync::Arc::new(Injector::with_sink(
            sink,
            vec![Key::KEY_LEFTCTRL],
            Duration::from_millis(5),
        ));

        let a = tokio::spawn({
            let injector = injector.clone();
            async move { injector.inject().await }
        });
        let b = tokio::spawn({
            let injector = injector.clone();
            async move { injector.inject().await }
        });
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let values: Vec<i32> = log.batches().iter().map(|b| b[0].value()).collect();
        assert_eq!(values, vec![1, 0, 1, 0]);
    }
}
