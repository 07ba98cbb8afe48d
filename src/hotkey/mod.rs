//! Key definitions shared by configuration, detection and injection
//!
//! Maps the configurable key names onto evdev key codes and decodes the
//! press / release / repeat value of key events.

mod keys;

pub use keys::{KeyName, KeyState};
