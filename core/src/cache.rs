//! TTL- and capacity-bounded cache for per-process metadata.
//!
//! Batch metadata resolution spawns external tools, so results are cached
//! per pid. Entries expire after a fixed TTL and the store is bounded; at
//! capacity the least-recently-used entry is evicted. An entry is deleted
//! explicitly whenever a kill is attempted for its pid, since the OS may
//! reuse the pid and stale command/cwd would misattribute.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Enriched metadata for one process.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MetadataEntry {
    /// Full command line.
    pub command: String,
    /// Working directory, when resolvable.
    pub cwd: Option<String>,
    /// Seconds since process start, when resolvable.
    pub lifetime: Option<u64>,
}

#[derive(Debug)]
struct Slot {
    entry: MetadataEntry,
    inserted: Instant,
    last_access: Instant,
}

/// Default entry time-to-live.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

/// Default maximum entry count.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Per-adapter metadata cache keyed by pid.
#[derive(Debug)]
pub struct MetadataCache {
    slots: HashMap<u32, Slot>,
    ttl: Duration,
    capacity: usize,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::with_config(DEFAULT_TTL, DEFAULT_CAPACITY)
    }

    /// Create a cache with explicit bounds. Used by tests to exercise
    /// expiry and eviction without waiting out the production TTL.
    pub fn with_config(ttl: Duration, capacity: usize) -> Self {
        Self {
            slots: HashMap::new(),
            ttl,
            capacity,
        }
    }

    /// Get an unexpired entry, refreshing its recency.
    pub fn get(&mut self, pid: u32) -> Option<MetadataEntry> {
        let ttl = self.ttl;
        let slot = self.slots.get_mut(&pid)?;
        if slot.inserted.elapsed() >= ttl {
            self.slots.remove(&pid);
            return None;
        }
        slot.last_access = Instant::now();
        Some(slot.entry.clone())
    }

    /// Insert or overwrite an entry, recording insertion time.
    ///
    /// When the insert would exceed capacity, the least-recently-used
    /// entry is evicted first.
    pub fn set(&mut self, pid: u32, entry: MetadataEntry) {
        if !self.slots.contains_key(&pid) && self.slots.len() >= self.capacity {
            self.evict_lru();
        }
        let now = Instant::now();
        self.slots.insert(
            pid,
            Slot {
                entry,
                inserted: now,
                last_access: now,
            },
        );
    }

    /// Remove an entry immediately.
    pub fn delete(&mut self, pid: u32) {
        self.slots.remove(&pid);
    }

    /// Sweep expired entries so they never count toward the capacity bound.
    ///
    /// Invoked before each batch-resolution pass.
    pub fn cleanup(&mut self) {
        let ttl = self.ttl;
        self.slots.retain(|_, slot| slot.inserted.elapsed() < ttl);
    }

    /// Number of live (possibly expired, not yet swept) entries.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn evict_lru(&mut self) {
        if let Some(&victim) = self
            .slots
            .iter()
            .min_by_key(|(_, slot)| slot.last_access)
            .map(|(pid, _)| pid)
        {
            tracing::trace!(pid = victim, "metadata cache full, evicting LRU entry");
            self.slots.remove(&victim);
        }
    }
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new()
    }
}
