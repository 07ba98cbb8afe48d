//! Events flowing from device monitors to the tap detector, and the
//! decisions the detector reaches on a trigger release.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use evdev::{InputEvent, InputEventKind, Key, RelativeAxisType};

use crate::hotkey::KeyState;

/// A decoded input event, stamped with the monotonic time it was read
#[derive(Debug, Clone)]
pub struct DeviceEvent {
    /// Node the event was read from
    pub source: Arc<PathBuf>,
    /// Monotonic arrival time
    pub at: Instant,
    pub kind: InputKind,
}

/// The subset of evdev events the tap detector cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// `EV_KEY`: keyboard keys and mouse buttons alike
    Key { key: Key, state: KeyState },
    /// `REL_WHEEL` / `REL_HWHEEL`
    Wheel { delta: i32 },
}

impl InputKind {
    /// Decode a raw evdev event. Motion, sync and misc events yield `None`.
    pub fn decode(event: &InputEvent) -> Option<Self> {
        match event.kind() {
            InputEventKind::Key(key) => {
                KeyState::from_value(event.value()).map(|state| InputKind::Key { key, state })
            }
            InputEventKind::RelAxis(RelativeAxisType::REL_WHEEL)
            | InputEventKind::RelAxis(RelativeAxisType::REL_HWHEEL) => {
                Some(InputKind::Wheel { delta: event.value() })
            }
            _ => None,
        }
    }
}

/// Why a trigger release did not produce an injection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectCause {
    /// Another key, button or wheel was used while the trigger was held
    Interference,
    /// The trigger was held for at least the tap timeout
    HeldTooLong,
}

impl fmt::Display for RejectCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectCause::Interference => write!(f, "other action"),
            RejectCause::HeldTooLong => write!(f, "held too long"),
        }
    }
}

/// Result of a completed tap session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapOutcome {
    /// Clean tap; the injection key should be emitted
    Tap { elapsed: Duration },
    /// Release ignored
    Rejected { cause: RejectCause, elapsed: Duration },
}

impl TapOutcome {
    pub fn is_tap(&self) -> bool {
        matches!(self, TapOutcome::Tap { .. })
    }
}

impl fmt::Display for TapOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TapOutcome::Tap { elapsed } => {
                write!(f, "TAP ({}ms)", elapsed.as_millis())
            }
            TapOutcome::Rejected { cause, elapsed } => {
                write!(f, "REJECTED: {} ({}ms)", cause, elapsed.as_millis())
            }
        }
    }
}
