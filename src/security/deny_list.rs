//! Brute-force deny list.
//!
//! # Responsibilities
//! - Map client address → saturating failure counter
//! - Forget entries after an idle window (time-to-idle, not time-to-live)
//! - Bound memory: a hot tier of `capacity` entries, spilling least-recently
//!   touched entries into a bounded LRU overflow tier
//! - Snapshot to / restore from disk across restarts
//!
//! # Design Decisions
//! - Every per-key operation runs under that key's DashMap shard write lock,
//!   including the overflow lookup, so read-increment-write is atomic per address
//! - Lock order is always shard → overflow and shard → recency, never the reverse
//! - Hot-tier recency lives in an unbounded LRU index kept in step with the map
//!   under the shard lock, so picking a spill victim is O(1)
//! - A spilled entry is pushed into overflow before it leaves the hot map,
//!   with its shard guard held throughout
//! - Loopback addresses are never stored
//! - IPv4-mapped IPv6 keys are canonicalized to IPv4

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::net::IpAddr;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::BruteForceConfig;
use crate::observability::metrics;

/// Error type for deny list persistence.
#[derive(Debug, thiserror::Error)]
pub enum DenyListError {
    #[error("deny list snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("deny list snapshot is malformed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Next value of a saturating failure counter.
///
/// The first failure yields 1; afterwards the count grows by one and sticks at 255.
pub fn next_failure_count(prev: Option<u8>) -> u8 {
    prev.map_or(1, |count| count.saturating_add(1))
}

#[derive(Debug, Clone, Copy)]
struct DenyEntry {
    count: u8,
    touched: Instant,
}

impl DenyEntry {
    fn new(count: u8, touched: Instant) -> Self {
        Self { count, touched }
    }

    fn is_expired(&self, now: Instant, idle: Duration) -> bool {
        now.saturating_duration_since(self.touched) >= idle
    }
}

/// One persisted deny list entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenyRecord {
    pub address: IpAddr,
    pub failures: u8,
    /// Seconds since the entry was last touched.
    pub idle_secs: u64,
}

/// On-disk form of the deny list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DenyListSnapshot {
    /// Unix time the snapshot was written.
    pub saved_at: u64,
    pub entries: Vec<DenyRecord>,
}

impl DenyListSnapshot {
    /// Read a snapshot from a JSON file.
    pub fn load(path: &Path) -> Result<Self, DenyListError> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Write the snapshot as JSON.
    pub fn save(&self, path: &Path) -> Result<(), DenyListError> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Seconds elapsed since the snapshot was written.
    pub fn age_secs(&self) -> u64 {
        unix_now().saturating_sub(self.saved_at)
    }
}

/// Concurrent, bounded, time-to-idle deny list keyed by client address.
pub struct DenyList {
    hot: DashMap<IpAddr, DenyEntry>,
    overflow: Option<Mutex<LruCache<IpAddr, DenyEntry>>>,
    /// Hot-tier keys, least recently touched first.
    recency: Mutex<LruCache<IpAddr, ()>>,
    capacity: usize,
    idle: Duration,
}

impl DenyList {
    /// Create a deny list. An `overflow_capacity` of zero disables the overflow tier.
    pub fn new(capacity: usize, overflow_capacity: usize, idle: Duration) -> Self {
        let overflow = NonZeroUsize::new(overflow_capacity).map(|cap| Mutex::new(LruCache::new(cap)));
        Self {
            hot: DashMap::new(),
            overflow,
            recency: Mutex::new(LruCache::unbounded()),
            capacity: capacity.max(1),
            idle,
        }
    }

    pub fn from_config(config: &BruteForceConfig) -> Self {
        Self::new(
            config.capacity,
            config.overflow_capacity,
            Duration::from_secs(config.idle_secs),
        )
    }

    /// Configured idle window.
    pub fn idle_window(&self) -> Duration {
        self.idle
    }

    /// Failure count for `ip`, refreshing its idle timer.
    pub fn get(&self, ip: &IpAddr) -> Option<u8> {
        let ip = ip.to_canonical();
        let now = Instant::now();
        let mut promoted = false;

        let count = match self.hot.entry(ip) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now, self.idle) {
                    self.forget_recent(&ip);
                    occupied.remove();
                    None
                } else {
                    occupied.get_mut().touched = now;
                    self.touch_recent(&ip);
                    Some(occupied.get().count)
                }
            }
            Entry::Vacant(vacant) => match self.take_overflow(&ip, now) {
                Some(entry) => {
                    promoted = true;
                    self.touch_recent(&ip);
                    vacant.insert(DenyEntry::new(entry.count, now));
                    Some(entry.count)
                }
                None => None,
            },
        };

        if promoted {
            self.enforce_capacity();
        }
        count
    }

    /// Store a failure count for `ip`, refreshing its idle timer.
    pub fn put(&self, ip: IpAddr, count: u8) {
        let ip = ip.to_canonical();
        if ip.is_loopback() {
            tracing::debug!(address = %ip, "Ignoring deny list write for loopback address");
            return;
        }
        let now = Instant::now();
        let inserted = match self.hot.entry(ip) {
            Entry::Occupied(mut occupied) => {
                *occupied.get_mut() = DenyEntry::new(count, now);
                self.touch_recent(&ip);
                false
            }
            Entry::Vacant(vacant) => {
                let _ = self.take_overflow(&ip, now);
                self.touch_recent(&ip);
                vacant.insert(DenyEntry::new(count, now));
                true
            }
        };
        if inserted {
            self.enforce_capacity();
        }
    }

    /// Whether `ip` currently has a live entry. Does not refresh the idle timer.
    pub fn contains(&self, ip: &IpAddr) -> bool {
        let ip = ip.to_canonical();
        let now = Instant::now();
        match self.hot.entry(ip) {
            Entry::Occupied(occupied) => {
                if occupied.get().is_expired(now, self.idle) {
                    self.forget_recent(&ip);
                    occupied.remove();
                    false
                } else {
                    true
                }
            }
            Entry::Vacant(_) => self.peek_overflow(&ip, now),
        }
    }

    /// Atomically increment the failure counter for `ip` and return the new value.
    ///
    /// Returns `None` for loopback addresses, which are never tracked.
    pub fn record_failure(&self, ip: IpAddr) -> Option<u8> {
        let ip = ip.to_canonical();
        if ip.is_loopback() {
            return None;
        }
        let now = Instant::now();
        let mut inserted = false;

        let count = match self.hot.entry(ip) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                let prev = (!entry.is_expired(now, self.idle)).then_some(entry.count);
                *entry = DenyEntry::new(next_failure_count(prev), now);
                self.touch_recent(&ip);
                entry.count
            }
            Entry::Vacant(vacant) => {
                let prev = self.take_overflow(&ip, now).map(|e| e.count);
                let count = next_failure_count(prev);
                self.touch_recent(&ip);
                vacant.insert(DenyEntry::new(count, now));
                inserted = true;
                count
            }
        };

        if inserted {
            self.enforce_capacity();
        }
        Some(count)
    }

    /// Drop the entry for `ip`, returning its last count.
    pub fn remove(&self, ip: &IpAddr) -> Option<u8> {
        let ip = ip.to_canonical();
        let now = Instant::now();
        match self.hot.entry(ip) {
            Entry::Occupied(occupied) => {
                self.forget_recent(&ip);
                Some(occupied.remove().count)
            }
            Entry::Vacant(_) => self.take_overflow(&ip, now).map(|e| e.count),
        }
    }

    /// Total live-or-unswept entries across both tiers.
    pub fn len(&self) -> usize {
        self.hot.len() + self.overflow_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries held in the hot tier.
    pub fn hot_len(&self) -> usize {
        self.hot.len()
    }

    /// Entries held in the overflow tier.
    pub fn overflow_len(&self) -> usize {
        self.overflow.as_ref().map_or(0, |overflow| overflow.lock().len())
    }

    /// Remove every expired entry. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let idle = self.idle;
        let mut removed = 0;

        self.hot.retain(|ip, entry| {
            let keep = !entry.is_expired(now, idle);
            if !keep {
                self.forget_recent(ip);
                removed += 1;
            }
            keep
        });

        if let Some(overflow) = &self.overflow {
            let mut overflow = overflow.lock();
            let expired: Vec<IpAddr> = overflow
                .iter()
                .filter(|(_, entry)| entry.is_expired(now, idle))
                .map(|(ip, _)| *ip)
                .collect();
            for ip in &expired {
                overflow.pop(ip);
            }
            removed += expired.len();
        }

        metrics::record_deny_list_size(self.hot_len(), self.overflow_len());
        removed
    }

    /// Capture every live entry for persistence.
    pub fn snapshot(&self) -> DenyListSnapshot {
        let now = Instant::now();
        let idle = self.idle;
        let to_record = |ip: IpAddr, entry: &DenyEntry| DenyRecord {
            address: ip,
            failures: entry.count,
            idle_secs: now.saturating_duration_since(entry.touched).as_secs(),
        };

        let mut entries: Vec<DenyRecord> = self
            .hot
            .iter()
            .filter(|r| !r.value().is_expired(now, idle))
            .map(|r| to_record(*r.key(), r.value()))
            .collect();

        if let Some(overflow) = &self.overflow {
            let overflow = overflow.lock();
            entries.extend(
                overflow
                    .iter()
                    .filter(|(_, entry)| !entry.is_expired(now, idle))
                    .map(|(ip, entry)| to_record(*ip, entry)),
            );
        }

        DenyListSnapshot {
            saved_at: unix_now(),
            entries,
        }
    }

    /// Load entries from a snapshot, skipping any that have since gone idle.
    ///
    /// Returns the number of entries restored.
    pub fn restore(&self, snapshot: &DenyListSnapshot) -> usize {
        let now = Instant::now();
        let age = snapshot.age_secs();
        let mut restored = 0;

        // Oldest first, so the recency index matches the recorded idle times.
        let mut records: Vec<&DenyRecord> = snapshot.entries.iter().collect();
        records.sort_by_key(|record| std::cmp::Reverse(record.idle_secs));

        for record in records {
            let ip = record.address.to_canonical();
            let idle_for = Duration::from_secs(record.idle_secs.saturating_add(age));
            if idle_for >= self.idle || ip.is_loopback() {
                continue;
            }
            let touched = now.checked_sub(idle_for).unwrap_or(now);
            match self.hot.entry(ip) {
                Entry::Occupied(mut occupied) => {
                    *occupied.get_mut() = DenyEntry::new(record.failures, touched);
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(DenyEntry::new(record.failures, touched));
                }
            }
            self.touch_recent(&ip);
            restored += 1;
        }

        self.enforce_capacity();
        restored
    }

    /// Restore from a snapshot file if it exists.
    pub fn load_from_file(&self, path: &Path) -> Result<usize, DenyListError> {
        if !path.exists() {
            return Ok(0);
        }
        let snapshot = DenyListSnapshot::load(path)?;
        let restored = self.restore(&snapshot);
        tracing::info!(
            path = %path.display(),
            restored,
            skipped = snapshot.entries.len() - restored,
            "Deny list restored from snapshot"
        );
        Ok(restored)
    }

    /// Write a snapshot file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), DenyListError> {
        let snapshot = self.snapshot();
        snapshot.save(path)?;
        tracing::info!(
            path = %path.display(),
            entries = snapshot.entries.len(),
            "Deny list saved"
        );
        Ok(())
    }

    /// Periodically purge expired entries until shutdown.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let deny_list = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = deny_list.purge_expired();
                        if removed > 0 {
                            tracing::debug!(removed, remaining = deny_list.len(), "Deny list sweep");
                        }
                    }
                    _ = shutdown.recv() => {
                        tracing::debug!("Deny list sweeper stopping");
                        break;
                    }
                }
            }
        })
    }

    fn take_overflow(&self, ip: &IpAddr, now: Instant) -> Option<DenyEntry> {
        let overflow = self.overflow.as_ref()?;
        let entry = overflow.lock().pop(ip)?;
        (!entry.is_expired(now, self.idle)).then_some(entry)
    }

    fn peek_overflow(&self, ip: &IpAddr, now: Instant) -> bool {
        let Some(overflow) = &self.overflow else {
            return false;
        };
        let mut overflow = overflow.lock();
        match overflow.peek(ip) {
            Some(entry) if entry.is_expired(now, self.idle) => {
                overflow.pop(ip);
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Mark `ip` most recently touched. Call with its shard guard held.
    fn touch_recent(&self, ip: &IpAddr) {
        self.recency.lock().put(*ip, ());
    }

    /// Drop `ip` from the recency index. Call with its shard guard held.
    fn forget_recent(&self, ip: &IpAddr) {
        self.recency.lock().pop(ip);
    }

    /// Spill least-recently touched hot entries until the hot tier fits.
    ///
    /// Must be called with no shard guard held.
    fn enforce_capacity(&self) {
        while self.hot.len() > self.capacity {
            let victim = self.recency.lock().peek_lru().map(|(ip, _)| *ip);
            let Some(victim) = victim else {
                break;
            };
            match self.hot.entry(victim) {
                // The entry stays in the hot map until overflow holds it.
                Entry::Occupied(occupied) => {
                    if let Some(overflow) = &self.overflow {
                        if let Some((dropped, _)) = overflow.lock().push(victim, *occupied.get()) {
                            if dropped != victim {
                                tracing::trace!(address = %dropped, "Deny list overflow evicted entry");
                            }
                        }
                    }
                    self.forget_recent(&victim);
                    occupied.remove();
                }
                Entry::Vacant(_) => self.forget_recent(&victim),
            }
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
