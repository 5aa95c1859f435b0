// Connector Gateway -- cache
// Single-value cache with an explicit expiry and an injected clock.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }
}

pub struct ExpiringCache<T> {
    entry: Option<(T, Instant)>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<T: Clone> ExpiringCache<T> {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entry: None,
            ttl,
            clock,
        }
    }

    /// The cached value, if one is stored and has not expired.
    pub fn get(&self) -> Option<T> {
        let now = self.clock.now();
        self.entry
            .as_ref()
            .filter(|(_, expires_at)| now < *expires_at)
            .map(|(value, _)| value.clone())
    }

    pub fn put(&mut self, value: T) {
        let expires_at = self.clock.now() + self.ttl;
        self.entry = Some((value, expires_at));
    }

    pub fn expires_at(&self) -> Option<Instant> {
        self.entry.as_ref().map(|(_, t)| *t)
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }
}
