//! Daemon coordinator
//!
//! Owns the device table, the tap detector task, the virtual injector and
//! the hotplug watcher, and tears them down in order on shutdown.

mod coordinator;
mod manager;

pub use coordinator::Daemon;
