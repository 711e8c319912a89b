//! Liveness cache, one slice per bucket, aligned slot-for-slot with the bucket's peers.

use std::time::Duration;

use time::OffsetDateTime;

/// The last known liveness state of the peer occupying a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheEntry {
    pub last_checked: OffsetDateTime,
    pub dead: bool,
}

impl CacheEntry {
    /// An entry stamped now.
    pub fn checked(dead: bool) -> Self {
        Self {
            last_checked: OffsetDateTime::now_utc(),
            dead,
        }
    }

    /// An entry that was never checked by this process, it is stale for any expiry.
    pub fn unchecked() -> Self {
        Self {
            last_checked: OffsetDateTime::UNIX_EPOCH,
            dead: false,
        }
    }

    pub fn is_stale(&self, expiry: Duration) -> bool {
        OffsetDateTime::now_utc() - self.last_checked >= expiry
    }
}

/// A bucket's slice of the liveness cache.
///
/// Entries are only ever created or overwritten together with the peer they describe, the owning
/// bucket actor guarantees `entries.len() == bucket.len()`.
#[derive(Debug, Default, Clone)]
pub struct LivenessCache {
    entries: Vec<CacheEntry>,
}

impl LivenessCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cache for `len` peers loaded from persistent state.
    pub fn unchecked(len: usize) -> Self {
        Self {
            entries: vec![CacheEntry::unchecked(); len],
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, col: usize) -> Option<CacheEntry> {
        self.entries.get(col).copied()
    }

    /// Stamps the slot with the current time and the supplied state, appending a new entry if
    /// `col` is one past the end.
    pub fn set(&mut self, col: usize, dead: bool) {
        let entry = CacheEntry::checked(dead);

        match col.cmp(&self.entries.len()) {
            std::cmp::Ordering::Less => self.entries[col] = entry,
            std::cmp::Ordering::Equal => self.entries.push(entry),
            // Entries never precede their peer.
            std::cmp::Ordering::Greater => unreachable!("cache slot {col} is past the bucket end"),
        }
    }

    /// Returns `true` if the slot's last check is at least `expiry` old.
    pub fn is_stale(&self, col: usize, expiry: Duration) -> bool {
        self.entries
            .get(col)
            .map_or(true, |entry| entry.is_stale(expiry))
    }

    /// Returns the lowest slot currently marked dead.
    pub fn first_dead(&self) -> Option<usize> {
        self.entries.iter().position(|entry| entry.dead)
    }
}
