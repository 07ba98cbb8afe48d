//! Synthetic key injection through a uinput virtual device
//!
//! One virtual keyboard is created at startup. If that fails (no access to
//! `/dev/uinput`), the injector is built disabled and the daemon keeps
//! detecting taps without emitting anything.

mod uinput;

pub use uinput::{Injector, KeySink, VIRTUAL_DEVICE_NAME};
