//! Decides which input devices are worth monitoring

use std::fmt;
use std::path::Path;

use evdev::{Device, EventType, Key};
use tracing::debug;

use crate::inject::VIRTUAL_DEVICE_NAME;

/// `BUS_VIRTUAL` from linux/input.h
const BUS_VIRTUAL: u16 = 0x06;

/// Proxy devices that re-emit real input and would double-count it
const PROXY_DEVICE_NAMES: &[&str] = &["Tiling Shell Proxy Device"];

/// Diagnostic classification; does not affect eligibility
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Keyboard,
    Pointer,
    /// Both keyboard-like and pointer-like
    Combo,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Keyboard => write!(f, "Keyboard"),
            DeviceKind::Pointer => write!(f, "Pointer"),
            DeviceKind::Combo => write!(f, "Combo"),
        }
    }
}

/// The metadata the classifier looks at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProfile {
    pub name: String,
    pub bus_type: u16,
    /// Has both a letter key and space
    pub keyboard_like: bool,
    /// Declares relative axes
    pub pointer_like: bool,
}

impl DeviceProfile {
    /// Read the profile of an open device
    pub fn probe(device: &Device) -> Self {
        let keyboard_like = device
            .supported_keys()
            .is_some_and(|keys| keys.contains(Key::KEY_A) && keys.contains(Key::KEY_SPACE));
        let pointer_like = device.supported_events().contains(EventType::RELATIVE);

        Self {
            name: device.name().unwrap_or("Unknown").to_string(),
            bus_type: device.input_id().bus_type().0,
            keyboard_like,
            pointer_like,
        }
    }

    pub fn kind(&self) -> Option<DeviceKind> {
        match (self.keyboard_like, self.pointer_like) {
            (true, true) => Some(DeviceKind::Combo),
            (true, false) => Some(DeviceKind::Keyboard),
            (false, true) => Some(DeviceKind::Pointer),
            (false, false) => None,
        }
    }
}

/// Check whether a device should be monitored
pub fn is_eligible(profile: &DeviceProfile) -> bool {
    if profile.name == VIRTUAL_DEVICE_NAME {
        return false;
    }
    if PROXY_DEVICE_NAMES
        .iter()
        .any(|proxy| profile.name.contains(proxy))
    {
        return false;
    }
    if profile.bus_type == BUS_VIRTUAL {
        return false;
    }
    profile.kind().is_some()
}

/// Open a device node and keep it only if it is eligible.
///
/// Open errors (permissions, node already gone) make the device ineligible.
/// Rejected devices are dropped here, which closes their descriptor.
pub fn open_if_eligible(path: &Path) -> Option<(Device, DeviceProfile, DeviceKind)> {
    let device = match Device::open(path) {
        Ok(device) => device,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "cannot open input device");
            return None;
        }
    };

    let profile = DeviceProfile::probe(&device);
    if !is_eligible(&profile) {
        debug!(path = %path.display(), name = %profile.name, "skipping input device");
        return None;
    }

    let kind = profile.kind()?;
    Some((device, profile, kind))
}
