//! Tap detection state machine
//!
//! Two states:
//! - Idle: trigger key is up
//! - TriggerDown: trigger key is held, interference is being tracked

mod machine;

pub use machine::TapDetector;
