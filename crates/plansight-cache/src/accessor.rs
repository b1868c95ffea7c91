//! Report accessor
//!
//! Serves report records from the [`ReportCache`], fetching from the
//! [`ReportStore`] when needed:
//! - Fresh entries are returned without touching the store
//! - Stale entries are returned immediately and revalidated in the background
//! - Concurrent requests for one report share a single store call
//! - Failures are logged, cached as `Errored`, and surfaced without retry;
//!   like a success, a failure goes stale after the freshness window and
//!   the next read revalidates it

use crate::cache::ReportCache;
use crate::clock::{Clock, SystemClock};
use crate::entry::EntryState;
use crate::store::ReportStore;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use plansight_core::{
    AccessorConfig, ConfigError, ReportError, ReportId, ReportRecord, ReportSnapshot, StoreError,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

/// Outcome of one store read
pub type FetchResult = Result<Arc<ReportRecord>, ReportError>;

/// Handle to an in-flight fetch; every clone resolves to the same result
pub type PendingFetch = Shared<BoxFuture<'static, FetchResult>>;

const EVENT_CAPACITY: usize = 64;

/// Change notifications for subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// A fetch for this report finished, or the entry was invalidated
    Updated(ReportId),
    /// The session cache was cleared
    Cleared,
}

/// Accessor statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccessorStats {
    /// Entries currently cached
    pub entry_count: u64,
    /// Fetches in flight
    pub in_flight: usize,
    /// Reads served fresh from cache
    pub hits: u64,
    /// Reads served stale while revalidating
    pub stale_hits: u64,
    /// Reads that found no entry
    pub misses: u64,
    /// Calls made to the store
    pub store_calls: u64,
    /// Requests that joined an existing fetch
    pub coalesced: u64,
    /// Fetch results dropped because they were superseded
    pub discarded: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    stale_hits: AtomicU64,
    misses: AtomicU64,
    store_calls: AtomicU64,
    coalesced: AtomicU64,
    discarded: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

struct InFlight {
    generation: u64,
    responded: Arc<AtomicBool>,
    fetch: PendingFetch,
}

/// Cache-backed report reader
///
/// Cheap to clone; clones share the cache, the in-flight table and the
/// store.
#[derive(Clone)]
pub struct ReportAccessor {
    cache: Arc<ReportCache>,
    store: Arc<dyn ReportStore>,
    in_flight: Arc<DashMap<ReportId, InFlight>>,
    counters: Arc<Counters>,
    events: broadcast::Sender<CacheEvent>,
    table: Arc<str>,
    fetch_timeout: Duration,
}

impl std::fmt::Debug for ReportAccessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportAccessor")
            .field("table", &self.table)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

impl ReportAccessor {
    /// Create accessor on the system clock
    ///
    /// # Errors
    /// - `ConfigError::Invalid` if the config fails validation
    pub fn new(store: Arc<dyn ReportStore>, config: &AccessorConfig) -> Result<Self, ConfigError> {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    /// Create accessor with an explicit clock
    ///
    /// # Errors
    /// - `ConfigError::Invalid` if the config fails validation
    pub fn with_clock(
        store: Arc<dyn ReportStore>,
        config: &AccessorConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            cache: Arc::new(ReportCache::new(config, clock)),
            store,
            in_flight: Arc::new(DashMap::new()),
            counters: Arc::new(Counters::default()),
            events,
            table: Arc::from(config.table.as_str()),
            fetch_timeout: config.fetch_timeout,
        })
    }

    /// Underlying cache
    #[inline]
    #[must_use]
    pub fn cache(&self) -> &ReportCache {
        &self.cache
    }

    /// Subscribe to cache change notifications
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    /// Current view of a report, starting a fetch if one is needed
    ///
    /// Never waits on the store. An absent id yields an idle snapshot and
    /// no store activity. An `Errored` entry is returned as-is until the
    /// failure is older than the freshness window (or the entry is
    /// invalidated); the next read after that revalidates it.
    pub async fn fetch_report(&self, id: Option<&ReportId>) -> ReportSnapshot {
        let Some(id) = id else {
            return ReportSnapshot::idle();
        };

        let Some(entry) = self.cache.lookup(id).await else {
            Counters::bump(&self.counters.misses);
            tracing::debug!(report_id = %id, "cache miss");
            self.start_fetch(id);
            return ReportSnapshot::loading();
        };

        let now = self.cache.now();
        let window = self.cache.freshness_window();
        match entry.state_at(now, window) {
            EntryState::Fresh => {
                Counters::bump(&self.counters.hits);
            }
            EntryState::Stale | EntryState::Refreshing => {
                if entry.record().is_some() {
                    Counters::bump(&self.counters.stale_hits);
                    tracing::debug!(report_id = %id, "serving stale report, revalidating");
                } else {
                    tracing::debug!(report_id = %id, "retrying failed report");
                }
                self.start_fetch(id);
            }
            // Joins the owner, or restarts a fetch orphaned by invalidation.
            EntryState::Pending => {
                self.start_fetch(id);
            }
            EntryState::Errored | EntryState::Empty => {}
        }

        entry.snapshot(now, window, self.is_fetching(id))
    }

    /// Resolve a report, waiting for the store only when there is nothing
    /// usable cached
    ///
    /// An `Errored` entry yields its cached error even when it still holds
    /// a previous record; [`ReportAccessor::fetch_report`] is the call that
    /// shows both side by side.
    ///
    /// # Errors
    /// - The cached error for an `Errored` entry
    /// - Whatever the (shared) fetch fails with
    pub async fn load(&self, id: &ReportId) -> FetchResult {
        if let Some(entry) = self.cache.lookup(id).await {
            let now = self.cache.now();
            match (entry.state_at(now, self.cache.freshness_window()), entry.record()) {
                (EntryState::Fresh, Some(record)) => {
                    Counters::bump(&self.counters.hits);
                    return Ok(Arc::clone(record));
                }
                (EntryState::Stale | EntryState::Refreshing, Some(record)) => {
                    Counters::bump(&self.counters.stale_hits);
                    self.start_fetch(id);
                    return Ok(Arc::clone(record));
                }
                (EntryState::Errored, _) => {
                    if let Some(error) = entry.error() {
                        return Err(error.clone());
                    }
                }
                _ => {}
            }
        } else {
            Counters::bump(&self.counters.misses);
        }

        self.start_fetch(id).await
    }

    /// Fetch regardless of freshness, joining a fetch already in flight
    ///
    /// # Errors
    /// - Whatever the fetch fails with
    pub async fn refetch(&self, id: &ReportId) -> FetchResult {
        self.trigger_refetch(id).await
    }

    /// Start (or join) a fetch without waiting for it
    pub fn trigger_refetch(&self, id: &ReportId) -> PendingFetch {
        self.start_fetch(id)
    }

    /// Mark a report stale so its next read revalidates
    ///
    /// A fetch already in flight is orphaned: its result will not be
    /// written to the cache.
    pub async fn invalidate(&self, id: &ReportId) -> bool {
        self.in_flight.remove(id);
        let invalidated = self.cache.invalidate(id).await;
        if invalidated {
            let _ = self.events.send(CacheEvent::Updated(id.clone()));
        }
        invalidated
    }

    /// Drop all cached reports, e.g. on logout or session change
    pub fn clear(&self) {
        self.cache.clear();
        self.in_flight.clear();
        let _ = self.events.send(CacheEvent::Cleared);
    }

    /// Remove entries idle past the eviction horizon
    pub async fn collect_garbage(&self) -> usize {
        self.cache.collect_garbage().await
    }

    /// Current view of a report without side effects
    pub async fn peek(&self, id: &ReportId) -> Option<ReportSnapshot> {
        let entry = self.cache.peek(id).await?;
        Some(entry.snapshot(
            self.cache.now(),
            self.cache.freshness_window(),
            self.is_fetching(id),
        ))
    }

    /// Handle to the fetch in flight for `id`, if any
    #[must_use]
    pub fn in_flight(&self, id: &ReportId) -> Option<PendingFetch> {
        self.in_flight.get(id).map(|flight| flight.fetch.clone())
    }

    /// Whether a fetch is in flight for `id`
    #[inline]
    #[must_use]
    pub fn is_fetching(&self, id: &ReportId) -> bool {
        self.in_flight.contains_key(id)
    }

    /// Snapshot of counters
    pub async fn stats(&self) -> AccessorStats {
        AccessorStats {
            entry_count: self.cache.len().await,
            in_flight: self.in_flight.len(),
            hits: self.counters.hits.load(Ordering::Relaxed),
            stale_hits: self.counters.stale_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            store_calls: self.counters.store_calls.load(Ordering::Relaxed),
            coalesced: self.counters.coalesced.load(Ordering::Relaxed),
            discarded: self.counters.discarded.load(Ordering::Relaxed),
        }
    }

    /// Join the fetch in flight for `id` or spawn a new one
    ///
    /// A fetch whose store call has already returned is not joined: its
    /// result predates this request.
    fn start_fetch(&self, id: &ReportId) -> PendingFetch {
        match self.in_flight.entry(id.clone()) {
            Entry::Occupied(slot) if !slot.get().responded.load(Ordering::SeqCst) => {
                Counters::bump(&self.counters.coalesced);
                tracing::trace!(report_id = %id, "joining in-flight fetch");
                slot.get().fetch.clone()
            }
            Entry::Occupied(mut slot) => {
                let flight = self.spawn_fetch(id);
                let fetch = flight.fetch.clone();
                slot.insert(flight);
                fetch
            }
            Entry::Vacant(slot) => {
                let flight = self.spawn_fetch(id);
                let fetch = flight.fetch.clone();
                slot.insert(flight);
                fetch
            }
        }
    }

    fn spawn_fetch(&self, id: &ReportId) -> InFlight {
        let generation = self.cache.next_generation();
        let epoch = self.cache.epoch();
        let responded = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(self.clone().run_fetch(
            id.clone(),
            generation,
            epoch,
            Arc::clone(&responded),
        ));
        let fetch = task
            .map(|joined| {
                joined.unwrap_or_else(|err| {
                    Err(ReportError::network(format!("fetch task failed: {err}")))
                })
            })
            .boxed()
            .shared();
        InFlight {
            generation,
            responded,
            fetch,
        }
    }

    async fn run_fetch(
        self,
        id: ReportId,
        generation: u64,
        epoch: u64,
        responded: Arc<AtomicBool>,
    ) -> FetchResult {
        if !self.cache.begin_fetch(&id, generation, epoch).await {
            tracing::debug!(report_id = %id, generation, "fetch does not own the cache entry");
        }

        Counters::bump(&self.counters.store_calls);
        let started = Instant::now();
        let outcome: FetchResult =
            match tokio::time::timeout(self.fetch_timeout, self.store.get(&self.table, &id)).await {
                Ok(Ok(record)) => Ok(Arc::new(record)),
                Ok(Err(err)) => Err(err.into()),
                Err(_) => Err(StoreError::Timeout(self.fetch_timeout).into()),
            };
        responded.store(true, Ordering::SeqCst);
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match &outcome {
            Ok(_) => tracing::info!(report_id = %id, elapsed_ms, "report fetched"),
            Err(err) => tracing::error!(
                report_id = %id,
                kind = err.kind(),
                error = %err,
                elapsed_ms,
                "report fetch failed"
            ),
        }

        if !self.cache.complete_fetch(&id, generation, epoch, &outcome).await {
            Counters::bump(&self.counters.discarded);
            tracing::warn!(report_id = %id, generation, "discarding superseded fetch result");
        }

        self.in_flight
            .remove_if(&id, |_, flight| flight.generation == generation);
        let _ = self.events.send(CacheEvent::Updated(id));
        outcome
    }
}
