//! Bounded, idle-expiring bucket storage.

use std::collections::{BTreeMap, HashMap};

use tracing::trace;

use super::bucket::Bucket;

#[derive(Debug)]
struct Slot {
    bucket: Bucket,
    expires_at: u64,
    /// Position in the recency order
    stamp: u64,
}

/// A `key -> Bucket` map bounded by entry count and idle time.
///
/// Entries are ordered by last write. Writing a new key into a full store
/// evicts the least-recently-written entry. An entry that has not been
/// written for `ttl_ms` is treated as absent.
///
/// The store is not synchronized; [`RateLimiter`](super::RateLimiter)
/// holds it behind a mutex.
#[derive(Debug)]
pub struct BucketStore {
    slots: HashMap<String, Slot>,
    /// stamp -> key, oldest first
    recency: BTreeMap<u64, String>,
    next_stamp: u64,
    capacity: usize,
    ttl_ms: u64,
}

impl BucketStore {
    /// Create a store holding at most `capacity` keys, each expiring
    /// `ttl_ms` after its last write.
    pub fn new(capacity: usize, ttl_ms: u64) -> Self {
        Self {
            slots: HashMap::with_capacity(capacity.min(1024)),
            recency: BTreeMap::new(),
            next_stamp: 0,
            capacity,
            ttl_ms,
        }
    }

    /// Look up a live bucket. Expired entries are dropped.
    ///
    /// Reads do not refresh the idle timer.
    pub fn get(&mut self, key: &str, now: u64) -> Option<Bucket> {
        let expired = match self.slots.get(key) {
            Some(slot) if now < slot.expires_at => return Some(slot.bucket),
            Some(_) => true,
            None => false,
        };

        if expired {
            trace!(key = %key, "Dropping expired bucket");
            self.remove(key);
        }
        None
    }

    /// Store `bucket` as the most recently used entry, resetting its
    /// idle timer.
    pub fn insert(&mut self, key: &str, bucket: Bucket, now: u64) {
        let stamp = self.next_stamp;
        self.next_stamp += 1;
        let expires_at = now.saturating_add(self.ttl_ms);

        if let Some(slot) = self.slots.get_mut(key) {
            self.recency.remove(&slot.stamp);
            slot.bucket = bucket;
            slot.expires_at = expires_at;
            slot.stamp = stamp;
            self.recency.insert(stamp, key.to_string());
            return;
        }

        while self.slots.len() >= self.capacity {
            if !self.evict_oldest() {
                break;
            }
        }

        self.slots.insert(
            key.to_string(),
            Slot {
                bucket,
                expires_at,
                stamp,
            },
        );
        self.recency.insert(stamp, key.to_string());
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn purge_expired(&mut self, now: u64) -> usize {
        let expired: Vec<String> = self
            .slots
            .iter()
            .filter(|(_, slot)| now >= slot.expires_at)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.remove(key);
        }
        expired.len()
    }

    /// Whether `key` is held, expired or not.
    pub fn contains(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    /// Number of entries held, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.recency.clear();
    }

    fn remove(&mut self, key: &str) {
        if let Some(slot) = self.slots.remove(key) {
            self.recency.remove(&slot.stamp);
        }
    }

    fn evict_oldest(&mut self) -> bool {
        match self.recency.pop_first() {
            Some((_, key)) => {
                trace!(key = %key, "Evicting least recently used bucket");
                self.slots.remove(&key);
                true
            }
            None => false,
        }
    }
}
