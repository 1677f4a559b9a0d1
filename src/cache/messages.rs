use crate::clock::SharedClock;
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Lightweight snapshot of a message, kept only long enough to survive a
/// deletion event. Immutable once written.
#[derive(Debug, Clone)]
pub struct MessageSnapshot {
    pub id: String,
    pub sender_name: String,
    pub sender_address: String,
    pub chat_location: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
    pub cached_at: DateTime<Utc>,
}

struct Entry {
    snapshot: MessageSnapshot,
    expires_at: DateTime<Utc>,
    seq: u64,
}

struct Inner {
    entries: HashMap<String, Entry>,
    /// Insertion order as (seq, id) markers. A marker whose seq no longer
    /// matches the live entry is stale (the entry was overwritten or
    /// removed) and is skipped during eviction.
    order: VecDeque<(u64, String)>,
    next_seq: u64,
}

/// Insertion-ordered, capacity-bounded cache of recently seen messages.
///
/// Once `capacity` is reached the single oldest-inserted entry is evicted
/// before a new one goes in. Every entry also carries its own retention
/// deadline; expired entries stop being returned immediately and are dropped
/// for good by [`MessageCache::sweep`]. Cloning hands out another handle to
/// the same cache, which is how the reaper task shares it.
#[derive(Clone)]
pub struct MessageCache {
    inner: Arc<Mutex<Inner>>,
    clock: SharedClock,
    capacity: usize,
    retention: TimeDelta,
}

impl MessageCache {
    pub fn new(capacity: usize, retention: std::time::Duration, clock: SharedClock) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
                next_seq: 0,
            })),
            clock,
            capacity,
            retention: TimeDelta::from_std(retention).unwrap_or(TimeDelta::MAX),
        }
    }

    /// Insert a snapshot, evicting the oldest-inserted entry first when the
    /// cache is full. A second `put` for the same id overwrites fully and
    /// re-enters insertion order.
    pub fn put(&self, snapshot: MessageSnapshot) {
        let now = self.clock.now();
        let expires_at = now
            .checked_add_signed(self.retention)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let id = snapshot.id.clone();

        let mut inner = self.lock();
        if !inner.entries.contains_key(&id) {
            while inner.entries.len() >= self.capacity {
                let Some((seq, oldest)) = inner.order.pop_front() else {
                    break;
                };
                if inner.entries.get(&oldest).is_some_and(|e| e.seq == seq) {
                    inner.entries.remove(&oldest);
                }
            }
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.order.push_back((seq, id.clone()));
        inner.entries.insert(
            id,
            Entry {
                snapshot,
                expires_at,
                seq,
            },
        );
    }

    /// Look up a snapshot; entries past their retention deadline are gone
    /// even if the sweep has not reaped them yet.
    pub fn get(&self, id: &str) -> Option<MessageSnapshot> {
        let now = self.clock.now();
        let inner = self.lock();
        inner
            .entries
            .get(id)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.snapshot.clone())
    }

    /// Idempotent removal; a later expiry against the same key is silent.
    pub fn remove(&self, id: &str) {
        self.lock().entries.remove(id);
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Drop entries whose retention deadline has passed and prune stale
    /// order markers. Called by the reaper task.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| entry.expires_at > now);
        let reaped = before - inner.entries.len();

        let entries = &inner.entries;
        let live: Vec<(u64, String)> = inner
            .order
            .iter()
            .filter(|(seq, id)| entries.get(id).is_some_and(|e| e.seq == *seq))
            .cloned()
            .collect();
        inner.order = live.into();
        reaped
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
