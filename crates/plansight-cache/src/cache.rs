//! Report cache using moka
//!
//! Holds one [`CacheEntry`] per report id. Every mutation goes through
//! moka's per-key `and_compute_with`, so a fetch result is compared against
//! the entry's generation and the session epoch atomically before it is
//! written.
//!
//! Freshness and idleness are judged against the injected [`Clock`]; moka's
//! own time-to-idle uses the same horizon and only reclaims memory.

use crate::clock::Clock;
use crate::entry::CacheEntry;
use moka::future::Cache;
use moka::ops::compute::{CompResult, Op};
use plansight_core::{AccessorConfig, ReportError, ReportId, ReportRecord};
use std::future::ready;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Explicit, session-scoped report cache
///
/// Construct one per session and call [`ReportCache::clear`] on logout or
/// session change. Results of fetches started before a clear are dropped.
#[derive(Debug)]
pub struct ReportCache {
    entries: Cache<ReportId, CacheEntry>,
    clock: Arc<dyn Clock>,
    freshness_window: Duration,
    eviction_horizon: Duration,
    next_generation: AtomicU64,
    epoch: AtomicU64,
}

impl ReportCache {
    /// Create cache from accessor config
    #[must_use]
    pub fn new(config: &AccessorConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(config.max_capacity)
                .time_to_idle(config.eviction_horizon)
                .build(),
            clock,
            freshness_window: config.freshness_window,
            eviction_horizon: config.eviction_horizon,
            next_generation: AtomicU64::new(1),
            epoch: AtomicU64::new(0),
        }
    }

    /// Current time on the cache clock
    #[inline]
    #[must_use]
    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Age after which entries are stale
    #[inline]
    #[must_use]
    pub fn freshness_window(&self) -> Duration {
        self.freshness_window
    }

    /// Idle time after which entries are evicted
    #[inline]
    #[must_use]
    pub fn eviction_horizon(&self) -> Duration {
        self.eviction_horizon
    }

    /// Allocate a generation for a new fetch
    #[inline]
    pub fn next_generation(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::SeqCst)
    }

    /// Current session epoch
    #[inline]
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Read an entry, counting it as an access
    ///
    /// An entry idle past the eviction horizon is removed and reported as
    /// a miss.
    pub async fn lookup(&self, id: &ReportId) -> Option<CacheEntry> {
        let now = self.now();
        let horizon = self.eviction_horizon;

        let result = self
            .entries
            .entry_by_ref(id)
            .and_compute_with(|current| {
                let op = match current.map(moka::Entry::into_value) {
                    Some(entry) if entry.is_idle(now, horizon) => Op::Remove,
                    Some(mut entry) => {
                        entry.touch(now);
                        Op::Put(entry)
                    }
                    None => Op::Nop,
                };
                ready(op)
            })
            .await;

        match result {
            CompResult::ReplacedWith(entry) => Some(entry.into_value()),
            CompResult::Removed(_) => {
                tracing::debug!(report_id = %id, "evicted idle report");
                None
            }
            _ => None,
        }
    }

    /// Read an entry without counting it as an access
    pub async fn peek(&self, id: &ReportId) -> Option<CacheEntry> {
        let now = self.now();
        self.entries
            .get(id)
            .await
            .filter(|entry| !entry.is_idle(now, self.eviction_horizon))
    }

    /// Hand the entry for `id` to the fetch identified by `generation`
    ///
    /// Returns false if the session moved on or a newer fetch already owns
    /// the entry.
    pub async fn begin_fetch(&self, id: &ReportId, generation: u64, epoch: u64) -> bool {
        let now = self.now();
        let window = self.freshness_window;

        let result = self
            .entries
            .entry_by_ref(id)
            .and_compute_with(|current| {
                let op = if self.epoch() != epoch {
                    Op::Nop
                } else {
                    match current.map(moka::Entry::into_value) {
                        None => Op::Put(CacheEntry::pending(now, generation)),
                        Some(entry) if entry.generation() > generation => Op::Nop,
                        Some(mut entry) => match entry.begin_fetch(generation, now, window) {
                            Ok(()) => Op::Put(entry),
                            Err(err) => {
                                tracing::warn!(report_id = %id, error = %err, "cannot start fetch");
                                Op::Nop
                            }
                        },
                    }
                };
                ready(op)
            })
            .await;

        matches!(result, CompResult::Inserted(_) | CompResult::ReplacedWith(_))
    }

    /// Apply a fetch outcome if its fetch still owns the entry
    ///
    /// Returns false when the result was superseded (newer generation,
    /// invalidation, or a cleared session) and was discarded.
    pub async fn complete_fetch(
        &self,
        id: &ReportId,
        generation: u64,
        epoch: u64,
        outcome: &Result<Arc<ReportRecord>, ReportError>,
    ) -> bool {
        let now = self.now();

        let result = self
            .entries
            .entry_by_ref(id)
            .and_compute_with(|current| {
                let op = if self.epoch() != epoch {
                    Op::Nop
                } else {
                    match current.map(moka::Entry::into_value) {
                        // Evicted mid-flight: repopulate for future readers.
                        None => {
                            let mut entry = CacheEntry::pending(now, generation);
                            match entry.complete(outcome, now) {
                                Ok(()) => Op::Put(entry),
                                Err(_) => Op::Nop,
                            }
                        }
                        Some(entry) if entry.generation() != generation => Op::Nop,
                        Some(mut entry) => match entry.complete(outcome, now) {
                            Ok(()) => Op::Put(entry),
                            Err(err) => {
                                tracing::warn!(report_id = %id, error = %err, "cannot apply fetch result");
                                Op::Nop
                            }
                        },
                    }
                };
                ready(op)
            })
            .await;

        matches!(result, CompResult::Inserted(_) | CompResult::ReplacedWith(_))
    }

    /// Mark an entry stale and orphan its in-flight fetch
    ///
    /// Returns false if there was no entry.
    pub async fn invalidate(&self, id: &ReportId) -> bool {
        let generation = self.next_generation();
        let result = self
            .entries
            .entry_by_ref(id)
            .and_compute_with(|current| {
                let op = match current.map(moka::Entry::into_value) {
                    Some(mut entry) => {
                        entry.invalidate(generation);
                        Op::Put(entry)
                    }
                    None => Op::Nop,
                };
                ready(op)
            })
            .await;

        matches!(result, CompResult::ReplacedWith(_))
    }

    /// Drop every entry and start a new session epoch
    pub fn clear(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.entries.invalidate_all();
        tracing::info!("report cache cleared");
    }

    /// Remove entries idle past the eviction horizon
    ///
    /// Returns the number of entries removed.
    pub async fn collect_garbage(&self) -> usize {
        let now = self.now();
        let horizon = self.eviction_horizon;
        let candidates: Vec<Arc<ReportId>> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_idle(now, horizon))
            .map(|(id, _)| id)
            .collect();

        let mut removed = 0;
        for id in candidates {
            let result = self
                .entries
                .entry_by_ref(id.as_ref())
                .and_compute_with(|current| {
                    let op = match current {
                        Some(entry) if entry.value().is_idle(now, horizon) => Op::Remove,
                        _ => Op::Nop,
                    };
                    ready(op)
                })
                .await;
            if matches!(result, CompResult::Removed(_)) {
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::debug!(removed, "collected idle reports");
        }
        removed
    }

    /// Number of entries after pending maintenance has run
    pub async fn len(&self) -> u64 {
        self.entries.run_pending_tasks().await;
        self.entries.entry_count()
    }

    /// Whether the cache holds no entries
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
