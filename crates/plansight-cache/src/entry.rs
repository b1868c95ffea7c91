//! Per-report cache entry and its state machine
//!
//! ```text
//! Empty ─▶ Pending ─▶ Fresh ─▶ Stale ─▶ Refreshing ─▶ Fresh
//!             │                  ▲              │
//!             └─▶ Errored ───────┴──────────────┘
//! ```
//!
//! `Stale` is normally derived from age rather than stored: an entry is
//! stored as `Fresh` (or `Errored`) and reads as `Stale` once the last
//! fetch outlives the freshness window. `invalidate` stores `Stale`
//! explicitly. A stale entry without a record refetches as `Pending`.

use plansight_core::{ReportError, ReportRecord, ReportSnapshot};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Lifecycle state of a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryState {
    /// No entry
    Empty,
    /// First fetch in flight, nothing to serve
    Pending,
    /// Record within the freshness window
    Fresh,
    /// Record past the freshness window; still served
    Stale,
    /// Record being revalidated; previous value still served
    Refreshing,
    /// Last fetch failed
    Errored,
}

impl EntryState {
    /// Whether a fetch is outstanding in this state
    #[inline]
    #[must_use]
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Pending | Self::Refreshing)
    }
}

/// Illegal state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal entry transition: {from:?} -> {to:?}")]
pub struct StateMachineError {
    /// State before
    pub from: EntryState,
    /// Rejected target
    pub to: EntryState,
}

/// Validates a state transition.
///
/// A fetch that supersedes another one re-enters the same in-flight state,
/// so `Pending -> Pending` and `Refreshing -> Refreshing` are legal.
pub fn validate_transition(from: EntryState, to: EntryState) -> Result<(), StateMachineError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(StateMachineError { from, to })
    }
}

/// States reachable from `from` in one step
#[must_use]
pub fn allowed_transitions(from: EntryState) -> Vec<EntryState> {
    use EntryState::*;
    match from {
        Empty => vec![Pending],
        Pending => vec![Pending, Fresh, Errored],
        Fresh => vec![Stale, Refreshing],
        Stale => vec![Pending, Refreshing],
        Refreshing => vec![Refreshing, Fresh, Errored],
        Errored => vec![Pending, Stale, Refreshing],
    }
}

/// Cached state for one report
#[derive(Debug, Clone)]
pub struct CacheEntry {
    state: EntryState,
    record: Option<Arc<ReportRecord>>,
    error: Option<ReportError>,
    fetched_at: Option<Instant>,
    errored_at: Option<Instant>,
    last_accessed: Instant,
    generation: u64,
}

impl CacheEntry {
    /// Entry for a first fetch started under `generation`
    #[must_use]
    pub fn pending(now: Instant, generation: u64) -> Self {
        Self {
            state: EntryState::Pending,
            record: None,
            error: None,
            fetched_at: None,
            errored_at: None,
            last_accessed: now,
            generation,
        }
    }

    /// Stored state, without age applied
    #[inline]
    #[must_use]
    pub fn stored_state(&self) -> EntryState {
        self.state
    }

    /// State as seen at `now` given the freshness window
    ///
    /// Both a success and a failure age out: once the last fetch is older
    /// than the window the entry reads as `Stale` and the next read
    /// revalidates it.
    #[must_use]
    pub fn state_at(&self, now: Instant, freshness_window: Duration) -> EntryState {
        let settled_at = match self.state {
            EntryState::Fresh => self.fetched_at,
            EntryState::Errored => self.errored_at,
            state => return state,
        };
        match settled_at {
            Some(at) if now.saturating_duration_since(at) >= freshness_window => EntryState::Stale,
            _ => self.state,
        }
    }

    /// Last successfully fetched record
    #[inline]
    #[must_use]
    pub fn record(&self) -> Option<&Arc<ReportRecord>> {
        self.record.as_ref()
    }

    /// Error from the last fetch
    #[inline]
    #[must_use]
    pub fn error(&self) -> Option<&ReportError> {
        self.error.as_ref()
    }

    /// When the record was fetched
    #[inline]
    #[must_use]
    pub fn fetched_at(&self) -> Option<Instant> {
        self.fetched_at
    }

    /// When the last fetch failed
    #[inline]
    #[must_use]
    pub fn errored_at(&self) -> Option<Instant> {
        self.errored_at
    }

    /// When a caller last read this entry
    #[inline]
    #[must_use]
    pub fn last_accessed(&self) -> Instant {
        self.last_accessed
    }

    /// Generation of the fetch that owns this entry
    #[inline]
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the entry has gone unread for at least `horizon`
    #[inline]
    #[must_use]
    pub fn is_idle(&self, now: Instant, horizon: Duration) -> bool {
        now.saturating_duration_since(self.last_accessed) >= horizon
    }

    /// Record a read
    #[inline]
    pub fn touch(&mut self, now: Instant) {
        self.last_accessed = now;
    }

    /// Hand ownership to a new fetch
    ///
    /// # Errors
    /// - `StateMachineError` if the entry cannot start a fetch from its current state
    pub fn begin_fetch(
        &mut self,
        generation: u64,
        now: Instant,
        freshness_window: Duration,
    ) -> Result<(), StateMachineError> {
        let from = self.state_at(now, freshness_window);
        let to = if self.record.is_some() {
            EntryState::Refreshing
        } else {
            EntryState::Pending
        };
        validate_transition(from, to)?;
        self.state = to;
        self.generation = generation;
        Ok(())
    }

    /// Apply the outcome of the fetch that owns this entry
    ///
    /// A failure keeps the previous record so consumers can keep showing it
    /// alongside the error.
    ///
    /// # Errors
    /// - `StateMachineError` if no fetch is in flight
    pub fn complete(
        &mut self,
        outcome: &Result<Arc<ReportRecord>, ReportError>,
        now: Instant,
    ) -> Result<(), StateMachineError> {
        let to = if outcome.is_ok() {
            EntryState::Fresh
        } else {
            EntryState::Errored
        };
        validate_transition(self.state, to)?;

        match outcome {
            Ok(record) => {
                self.record = Some(Arc::clone(record));
                self.error = None;
                self.fetched_at = Some(now);
                self.errored_at = None;
            }
            Err(error) => {
                self.error = Some(error.clone());
                self.errored_at = Some(now);
            }
        }
        self.state = to;
        Ok(())
    }

    /// Force the next read to revalidate and orphan any in-flight fetch
    pub fn invalidate(&mut self, generation: u64) {
        if matches!(self.state, EntryState::Fresh | EntryState::Errored) {
            self.state = EntryState::Stale;
        }
        self.generation = generation;
    }

    /// Consumer view of this entry
    #[must_use]
    pub fn snapshot(&self, now: Instant, freshness_window: Duration, fetching: bool) -> ReportSnapshot {
        let state = self.state_at(now, freshness_window);
        let is_fetching = fetching || state.is_in_flight();
        ReportSnapshot {
            data: self.record.clone(),
            is_loading: is_fetching && self.record.is_none(),
            is_fetching,
            error: if state == EntryState::Errored {
                self.error.clone()
            } else {
                None
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plansight_core::ReportId;
    use proptest::prelude::*;

    const WINDOW: Duration = Duration::from_secs(300);

    fn record() -> Arc<ReportRecord> {
        Arc::new(ReportRecord::new(
            ReportId::parse("r1").unwrap(),
            serde_json::Map::new(),
        ))
    }

    #[test]
    fn first_fetch_lifecycle() {
        let t0 = Instant::now();
        let mut entry = CacheEntry::pending(t0, 1);
        assert_eq!(entry.state_at(t0, WINDOW), EntryState::Pending);
        assert!(entry.snapshot(t0, WINDOW, false).is_loading);

        entry.complete(&Ok(record()), t0).unwrap();
        assert_eq!(entry.state_at(t0, WINDOW), EntryState::Fresh);
        assert_eq!(entry.state_at(t0 + WINDOW - Duration::from_secs(1), WINDOW), EntryState::Fresh);
        assert_eq!(entry.state_at(t0 + WINDOW, WINDOW), EntryState::Stale);
    }

    #[test]
    fn stale_entry_refreshes_with_previous_data() {
        let t0 = Instant::now();
        let mut entry = CacheEntry::pending(t0, 1);
        entry.complete(&Ok(record()), t0).unwrap();

        let later = t0 + WINDOW * 2;
        entry.begin_fetch(2, later, WINDOW).unwrap();
        assert_eq!(entry.stored_state(), EntryState::Refreshing);
        assert_eq!(entry.generation(), 2);

        let snapshot = entry.snapshot(later, WINDOW, false);
        assert!(snapshot.has_data());
        assert!(snapshot.is_fetching);
        assert!(!snapshot.is_loading);
    }

    #[test]
    fn failed_refresh_keeps_record() {
        let t0 = Instant::now();
        let mut entry = CacheEntry::pending(t0, 1);
        entry.complete(&Ok(record()), t0).unwrap();
        entry.begin_fetch(2, t0, WINDOW).unwrap();
        entry
            .complete(&Err(ReportError::network("reset")), t0)
            .unwrap();

        assert_eq!(entry.stored_state(), EntryState::Errored);
        let snapshot = entry.snapshot(t0, WINDOW, false);
        assert!(snapshot.has_data());
        assert_eq!(snapshot.error, Some(ReportError::network("reset")));
    }

    #[test]
    fn complete_without_fetch_is_rejected() {
        let t0 = Instant::now();
        let mut entry = CacheEntry::pending(t0, 1);
        entry.complete(&Ok(record()), t0).unwrap();
        assert!(entry.complete(&Ok(record()), t0).is_err());
    }

    #[test]
    fn invalidate_marks_fresh_entry_stale() {
        let t0 = Instant::now();
        let mut entry = CacheEntry::pending(t0, 1);
        entry.complete(&Ok(record()), t0).unwrap();
        entry.invalidate(5);
        assert_eq!(entry.state_at(t0, WINDOW), EntryState::Stale);
        assert_eq!(entry.generation(), 5);
    }

    #[test]
    fn failure_ages_into_stale() {
        let t0 = Instant::now();
        let mut entry = CacheEntry::pending(t0, 1);
        entry.complete(&Ok(record()), t0).unwrap();

        let failed = t0 + WINDOW;
        entry.begin_fetch(2, failed, WINDOW).unwrap();
        entry.complete(&Err(ReportError::network("reset")), failed).unwrap();
        assert_eq!(entry.errored_at(), Some(failed));
        assert_eq!(entry.state_at(failed + WINDOW / 2, WINDOW), EntryState::Errored);

        let later = failed + WINDOW;
        assert_eq!(entry.state_at(later, WINDOW), EntryState::Stale);
        entry.begin_fetch(3, later, WINDOW).unwrap();
        assert_eq!(entry.stored_state(), EntryState::Refreshing);
    }

    #[test]
    fn failed_first_fetch_refetches_as_pending() {
        let t0 = Instant::now();
        let mut entry = CacheEntry::pending(t0, 1);
        entry.complete(&Err(ReportError::network("reset")), t0).unwrap();

        entry.begin_fetch(2, t0 + WINDOW, WINDOW).unwrap();
        assert_eq!(entry.stored_state(), EntryState::Pending);
        assert!(entry.snapshot(t0 + WINDOW, WINDOW, false).is_loading);
    }

    #[test]
    fn invalidate_marks_errored_entry_stale() {
        let t0 = Instant::now();
        let mut entry = CacheEntry::pending(t0, 1);
        entry.complete(&Err(ReportError::network("reset")), t0).unwrap();

        entry.invalidate(4);
        assert_eq!(entry.state_at(t0, WINDOW), EntryState::Stale);
        assert!(entry.snapshot(t0, WINDOW, false).error.is_none());
        entry.begin_fetch(5, t0, WINDOW).unwrap();
        assert_eq!(entry.stored_state(), EntryState::Pending);
    }

    #[test]
    fn idle_check_uses_last_access() {
        let t0 = Instant::now();
        let mut entry = CacheEntry::pending(t0, 1);
        let horizon = Duration::from_secs(1800);
        entry.touch(t0 + Duration::from_secs(1000));
        assert!(!entry.is_idle(t0 + horizon, horizon));
        assert!(entry.is_idle(t0 + Duration::from_secs(2800), horizon));
    }

    #[test]
    fn rejects_skipping_the_fetch() {
        assert!(validate_transition(EntryState::Empty, EntryState::Pending).is_ok());
        assert!(validate_transition(EntryState::Empty, EntryState::Fresh).is_err());
        assert!(validate_transition(EntryState::Stale, EntryState::Fresh).is_err());
        assert!(validate_transition(EntryState::Errored, EntryState::Fresh).is_err());
    }

    fn any_state() -> impl Strategy<Value = EntryState> {
        prop_oneof![
            Just(EntryState::Empty),
            Just(EntryState::Pending),
            Just(EntryState::Fresh),
            Just(EntryState::Stale),
            Just(EntryState::Refreshing),
            Just(EntryState::Errored),
        ]
    }

    proptest! {
        #[test]
        fn prop_validation_agrees_with_table(from in any_state(), to in any_state()) {
            let allowed = allowed_transitions(from);
            prop_assert_eq!(validate_transition(from, to).is_ok(), allowed.contains(&to));
        }

        #[test]
        fn prop_nothing_returns_to_empty(from in any_state()) {
            prop_assert!(validate_transition(from, EntryState::Empty).is_err());
        }
    }
}
