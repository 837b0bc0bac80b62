//! Time sources handed to the registry and authenticator.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::SystemTime,
};

pub trait Clock: Send + Sync {
    /// Seconds since the UNIX epoch
    fn now(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        // A clock set before 1970 reads as the epoch itself
        SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
    }
}

/// A manually driven clock, for tests and replays of recorded traffic.
#[derive(Debug, Default)]
pub struct FixedClock(AtomicU64);

impl FixedClock {
    pub fn new(seconds_since_epoch: u64) -> Self {
        Self(AtomicU64::new(seconds_since_epoch))
    }

    pub fn set(&self, seconds_since_epoch: u64) {
        self.0.store(seconds_since_epoch, Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: u64) {
        self.0.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}
