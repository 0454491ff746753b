// Copyright 2020 Joyent, Inc.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};
use derive_more::Display;
use slog::Logger;

/// The configuration options for a node.
#[derive(Clone, Debug, Default)]
pub struct NodeOptions {
    /// An optional `slog` logger instance. If none is provided then the logging
    /// will fall back to using the [`slog-stdlog`](https://docs.rs/slog-stdlog)
    /// drain which is essentially the same as using the rust standard
    /// [`log`](https://docs.rs/log) crate.
    pub log: Option<Logger>,
}

/// Sum type representing the health of a node as last observed.
#[derive(Copy, Clone, Debug, Display, Eq, PartialEq)]
pub enum Health {
    /// The node has never been probed.
    #[display(fmt = "unknown")]
    Unknown,
    /// The last connection attempt or exchange succeeded.
    #[display(fmt = "up")]
    Up,
    /// The last connection attempt or exchange failed. The node should be
    /// avoided until it is refreshed.
    #[display(fmt = "down")]
    Down,
}

impl Default for Health {
    fn default() -> Self {
        Health::Unknown
    }
}

// `down_at` is only ever set together with `Health::Down`. Keeping both behind
// one lock lets readers see them change together.
#[doc(hidden)]
#[derive(Clone, Copy, Debug, Default)]
pub struct HealthState {
    pub health: Health,
    pub down_at: Option<DateTime<Utc>>,
}

/// A cloneable, read-only view of a node's health.
///
/// The node updates its health while it runs commands; monitors on other
/// threads read it through this handle.
#[derive(Clone, Debug, Default)]
pub struct HealthMonitor(Arc<RwLock<HealthState>>);

impl HealthMonitor {
    pub fn new() -> Self {
        HealthMonitor::default()
    }

    fn read(&self) -> RwLockReadGuard<HealthState> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<HealthState> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn health(&self) -> Health {
        self.read().health
    }

    /// The time of the most recent failure, present only while down.
    pub fn down_at(&self) -> Option<DateTime<Utc>> {
        self.read().down_at
    }

    /// How long the node has been down, measured from its latest failure.
    pub fn down_for(&self) -> Option<Duration> {
        self.down_at().map(|at| Utc::now().signed_duration_since(at))
    }

    pub fn is_up(&self) -> bool {
        self.health() == Health::Up
    }

    pub fn is_down(&self) -> bool {
        self.health() == Health::Down
    }

    pub(crate) fn mark_up(&self) -> Health {
        let mut state = self.write();
        let previous = state.health;
        state.health = Health::Up;
        state.down_at = None;
        previous
    }

    // Confirming that a down node is still down moves `down_at` forward.
    pub(crate) fn mark_down(&self) -> Health {
        let mut state = self.write();
        let previous = state.health;
        state.health = Health::Down;
        state.down_at = Some(Utc::now());
        previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::thread;

    #[test]
    fn down_at_follows_health() {
        let monitor = HealthMonitor::new();
        assert_eq!(monitor.health(), Health::Unknown);
        assert!(monitor.down_at().is_none());

        assert_eq!(monitor.mark_down(), Health::Unknown);
        assert!(monitor.is_down());
        let first = monitor.down_at().unwrap();
        assert!(monitor.down_for().unwrap() >= Duration::zero());

        thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(monitor.mark_down(), Health::Down);
        assert!(monitor.down_at().unwrap() > first);

        assert_eq!(monitor.mark_up(), Health::Down);
        assert!(monitor.is_up());
        assert!(monitor.down_at().is_none());
        assert!(monitor.down_for().is_none());
    }

    #[test]
    fn clones_share_state() {
        let monitor = HealthMonitor::new();
        let reader = monitor.clone();
        let handle = thread::spawn(move || reader.is_up());

        monitor.mark_up();
        let _ = handle.join();
        assert!(monitor.clone().is_up());
        assert_eq!(Health::Down.to_string(), "down");
    }
}
