use crate::clock::SharedClock;
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Short-TTL guard against duplicate delivery of the same revoke event.
/// Both an "after" and a "before" view of one deletion commonly fire
/// handling independently; only the first within the window proceeds.
pub struct RevokeGuard {
    seen: Mutex<HashMap<String, DateTime<Utc>>>,
    ttl: TimeDelta,
    clock: SharedClock,
}

impl RevokeGuard {
    pub fn new(ttl: std::time::Duration, clock: SharedClock) -> Self {
        Self {
            seen: Mutex::new(HashMap::new()),
            ttl: TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX),
            clock,
        }
    }

    /// True exactly once per id within the TTL window; marks the id as seen
    /// on that first call.
    pub fn should_process(&self, id: &str) -> bool {
        let now = self.clock.now();
        let mut seen = self.lock();
        seen.retain(|_, marked_at| now - *marked_at < self.ttl);
        if seen.contains_key(id) {
            return false;
        }
        seen.insert(id.to_string(), now);
        true
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, DateTime<Utc>>> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Discards revoke events replayed by the protocol layer right after
/// (re)connection. Until the grace period after readiness has elapsed,
/// nothing counts as a fresh deletion.
pub struct StartupSuppressor {
    ready_at: Mutex<Option<DateTime<Utc>>>,
    grace: TimeDelta,
    clock: SharedClock,
}

impl StartupSuppressor {
    pub fn new(grace: std::time::Duration, clock: SharedClock) -> Self {
        Self {
            ready_at: Mutex::new(None),
            grace: TimeDelta::from_std(grace).unwrap_or(TimeDelta::MAX),
            clock,
        }
    }

    /// Record connection readiness. A reconnect marks again and restarts
    /// the grace window.
    pub fn mark_ready(&self) {
        let now = self.clock.now();
        *self.lock() = Some(now);
    }

    pub fn is_within_grace_period(&self) -> bool {
        let now = self.clock.now();
        match *self.lock() {
            None => true,
            Some(ready_at) => now - ready_at < self.grace,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<DateTime<Utc>>> {
        self.ready_at.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
