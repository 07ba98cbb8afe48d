//! Key name definitions and the static key-code table
//!
//! Configuration refers to keys by their evdev names. Only a fixed set of
//! modifier keys is accepted for both the trigger and the injection.

use std::fmt;

use evdev::Key;

/// A modifier key that can be used as trigger or injection key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyName {
    LeftMeta,
    RightMeta,
    LeftCtrl,
    RightCtrl,
}

/// Name → evdev code table
const KEY_TABLE: [(KeyName, &str, Key); 4] = [
    (KeyName::LeftMeta, "KEY_LEFTMETA", Key::KEY_LEFTMETA),
    (KeyName::RightMeta, "KEY_RIGHTMETA", Key::KEY_RIGHTMETA),
    (KeyName::LeftCtrl, "KEY_LEFTCTRL", Key::KEY_LEFTCTRL),
    (KeyName::RightCtrl, "KEY_RIGHTCTRL", Key::KEY_RIGHTCTRL),
];

impl KeyName {
    /// Look up a key by its evdev name (e.g. `KEY_LEFTMETA`)
    pub fn from_name(name: &str) -> Option<Self> {
        KEY_TABLE
            .iter()
            .find(|(_, n, _)| *n == name)
            .map(|(key, _, _)| *key)
    }

    /// The evdev name of this key
    pub fn name(self) -> &'static str {
        KEY_TABLE
            .iter()
            .find(|(key, _, _)| *key == self)
            .map(|(_, n, _)| *n)
            .unwrap_or("KEY_UNKNOWN")
    }

    /// The evdev key code of this key
    pub fn code(self) -> Key {
        match self {
            KeyName::LeftMeta => Key::KEY_LEFTMETA,
            KeyName::RightMeta => Key::KEY_RIGHTMETA,
            KeyName::LeftCtrl => Key::KEY_LEFTCTRL,
            KeyName::RightCtrl => Key::KEY_RIGHTCTRL,
        }
    }
}

impl fmt::Display for KeyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The three values an evdev `EV_KEY` event can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Release,
    Press,
    /// Auto-repeat while held
    Repeat,
}

impl KeyState {
    /// Decode the raw `value` field of a key event
    pub fn from_value(value: i32) -> Option<Self> {
        match value {
            0 => Some(KeyState::Release),
            1 => Some(KeyState::Press),
            2 => Some(KeyState::Repeat),
            _ => None,
        }
    }
}
