//! Tap detection state machine
//!
//! Tracks the trigger key between its press and release and decides, on
//! release, whether the press was a clean tap. Events from every monitored
//! device arrive through one queue, so interference on one device is seen
//! in order relative to the trigger on another.

use std::sync::Arc;
use std::time::{Duration, Instant};

use evdev::Key;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::events::{DeviceEvent, InputKind, RejectCause, TapOutcome};
use crate::hotkey::KeyState;
use crate::inject::{Injector, KeySink};

/// The two states of the detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TapState {
    /// Trigger key is up
    #[default]
    Idle,
    /// Trigger key is held; a tap session is open
    TriggerDown,
}

impl std::fmt::Display for TapState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TapState::Idle => write!(f, "Idle"),
            TapState::TriggerDown => write!(f, "TriggerDown"),
        }
    }
}

/// State held while the trigger key is down
#[derive(Debug, Clone, Copy)]
struct TapSession {
    pressed_at: Instant,
    /// Sticky for the lifetime of the session
    interference: bool,
}

/// Decides whether a trigger press/release pair was a clean tap
pub struct TapDetector {
    trigger: Key,
    timeout: Duration,
    session: Option<TapSession>,
}

impl TapDetector {
    /// Create a detector for `trigger` with the given tap timeout
    pub fn new(trigger: Key, timeout: Duration) -> Self {
        Self {
            trigger,
            timeout,
            session: None,
        }
    }

    /// Get the current state
    pub fn state(&self) -> TapState {
        match self.session {
            Some(_) => TapState::TriggerDown,
            None => TapState::Idle,
        }
    }

    /// Feed one event through the state machine.
    ///
    /// Returns an outcome only when a trigger release closes a session.
    pub fn handle(&mut self, event: &DeviceEvent) -> Option<TapOutcome> {
        match event.kind {
            InputKind::Key { key, state } if key == self.trigger => {
                self.handle_trigger(state, event.at)
            }
            InputKind::Key {
                key,
                state: KeyState::Press,
            } => {
                self.mark_interference(event, || format!("{:?}", key));
                None
            }
            InputKind::Wheel { delta } if delta != 0 => {
                self.mark_interference(event, || "scroll".to_string());
                None
            }
            _ => None,
        }
    }

    fn handle_trigger(&mut self, state: KeyState, at: Instant) -> Option<TapOutcome> {
        match (state, self.session) {
            (KeyState::Press, previous) => {
                // A second press edge can only come from another device (or a
                // release lost with an unplugged one); it starts over.
                if previous.is_some() {
                    debug!("trigger pressed again, previous session discarded");
                }
                self.session = Some(TapSession {
                    pressed_at: at,
                    interference: false,
                });
                debug!(trigger = ?self.trigger, "trigger pressed, tracking started");
                None
            }
            (KeyState::Release, Some(session)) => {
                self.session = None;
                let outcome = self.decide(session, at);
                match outcome {
                    TapOutcome::Tap { elapsed } => {
                        info!(elapsed_ms = elapsed.as_millis() as u64, "clean tap detected");
                    }
                    TapOutcome::Rejected { cause, elapsed } => {
                        info!(
                            %cause,
                            elapsed_ms = elapsed.as_millis() as u64,
                            "trigger release ignored"
                        );
                    }
                }
                Some(outcome)
            }
            // Auto-repeat, or a release with no open session
            _ => None,
        }
    }

    fn decide(&self, session: TapSession, released_at: Instant) -> TapOutcome {
        let elapsed = released_at.saturating_duration_since(session.pressed_at);

        if session.interference {
            TapOutcome::Rejected {
                cause: RejectCause::Interference,
                elapsed,
            }
        } else if elapsed >= self.timeout {
            TapOutcome::Rejected {
                cause: RejectCause::HeldTooLong,
                elapsed,
            }
        } else {
            TapOutcome::Tap { elapsed }
        }
    }

    fn mark_interference(&mut self, event: &DeviceEvent, what: impl FnOnce() -> String) {
        if let Some(session) = self.session.as_mut() {
            if !session.interference {
                debug!(
                    input = %what(),
                    device = %event.source.display(),
                    "interaction detected, tap negated"
                );
            }
            session.interference = true;
        }
    }

    /// Run the detector, consuming events until every sender is dropped.
    ///
    /// Injection is spawned so a slow virtual device never stalls the queue.
    pub async fn run<S: KeySink>(
        mut self,
        mut events: mpsc::Receiver<DeviceEvent>,
        injector: Arc<Injector<S>>,
    ) {
        info!(trigger = ?self.trigger, timeout_ms = self.timeout.as_millis() as u64, "tap detector started");

        while let Some(event) = events.recv().await {
            let Some(outcome) = self.handle(&event) else {
                continue;
            };
            if !outcome.is_tap() {
                continue;
            }

            if !injector.is_enabled() {
                info!("injection disabled, tap not forwarded");
                continue;
            }

            let injector = Arc::clone(&injector);
            tokio::spawn(async move {
                if let Err(e) = injector.inject().await {
                    warn!(error = %e, "failed to inject keys");
                }
            });
        }

        info!(state = %self.state(), "tap detector stopped");
    }
}
