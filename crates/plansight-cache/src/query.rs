//! Consumer-facing report subscription
//!
//! A [`ReportQuery`] is what a view holds: it is bound to one report id at
//! a time, publishes [`ReportSnapshot`]s over a `watch` channel, and keeps
//! them current as fetches for that id complete.
//!
//! Switching ids bumps a view token. A listener only publishes while its
//! token is current, so a late result for the previous id never reaches a
//! view that has moved on. The token is bumped and compared while holding
//! the `watch` value lock, which makes check-and-publish a single step.
//! Dropping the query stops all publication; any fetch it started still
//! lands in the shared cache.

use crate::accessor::{CacheEvent, FetchResult, ReportAccessor};
use plansight_core::{ReportId, ReportSnapshot};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

/// Live view of one report
#[derive(Debug)]
pub struct ReportQuery {
    accessor: ReportAccessor,
    report_id: Option<ReportId>,
    view: Arc<AtomicU64>,
    state: Arc<watch::Sender<ReportSnapshot>>,
    listener: Option<JoinHandle<()>>,
}

impl ReportQuery {
    /// Subscribe to `report_id` (or to nothing, if absent)
    pub async fn new(accessor: ReportAccessor, report_id: Option<ReportId>) -> Self {
        let (state, _) = watch::channel(ReportSnapshot::idle());
        let mut query = Self {
            accessor,
            report_id: None,
            view: Arc::new(AtomicU64::new(0)),
            state: Arc::new(state),
            listener: None,
        };
        query.set_report_id(report_id).await;
        query
    }

    /// Id currently viewed
    #[inline]
    #[must_use]
    pub fn report_id(&self) -> Option<&ReportId> {
        self.report_id.as_ref()
    }

    /// Latest snapshot
    #[must_use]
    pub fn snapshot(&self) -> ReportSnapshot {
        self.state.borrow().clone()
    }

    /// Receive every snapshot change
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ReportSnapshot> {
        self.state.subscribe()
    }

    /// Point the view at another report
    pub async fn set_report_id(&mut self, report_id: Option<ReportId>) {
        self.stop_listening();
        let view = self.next_view();
        self.report_id = report_id;

        let Some(id) = self.report_id.clone() else {
            self.state.send_replace(ReportSnapshot::idle());
            return;
        };

        // Subscribe before reading so a completion between the two is not lost.
        let events = self.accessor.subscribe();
        let snapshot = self.accessor.fetch_report(Some(&id)).await;
        self.state.send_replace(snapshot);

        self.listener = Some(tokio::spawn(listen(
            self.accessor.clone(),
            id,
            view,
            Arc::clone(&self.view),
            Arc::clone(&self.state),
            events,
        )));
    }

    /// Refetch the current report regardless of freshness
    ///
    /// Returns `None` when no report is selected.
    pub async fn refetch(&mut self) -> Option<FetchResult> {
        let id = self.report_id.clone()?;
        let view = self.view.load(Ordering::SeqCst);

        let fetch = self.accessor.trigger_refetch(&id);
        self.state.send_modify(|snapshot| {
            snapshot.is_fetching = true;
            snapshot.is_loading = snapshot.data.is_none();
        });
        let result = fetch.await;

        let settled = self
            .accessor
            .peek(&id)
            .await
            .unwrap_or_else(|| ReportSnapshot::from_result(&result));
        publish(&self.state, &self.view, view, settled);
        Some(result)
    }

    /// Wait until no fetch is outstanding and return that snapshot
    pub async fn settled(&self) -> ReportSnapshot {
        let mut rx = self.subscribe();
        let settled = rx
            .wait_for(|snapshot| !snapshot.is_fetching)
            .await
            .map(|snapshot| snapshot.clone());
        settled.unwrap_or_else(|_| self.snapshot())
    }

    /// Retire the current view token under the value lock
    fn next_view(&self) -> u64 {
        let mut next = 0;
        self.state.send_if_modified(|_| {
            next = self.view.fetch_add(1, Ordering::SeqCst) + 1;
            false
        });
        next
    }

    fn stop_listening(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

impl Drop for ReportQuery {
    fn drop(&mut self) {
        self.next_view();
        self.stop_listening();
    }
}

/// Publish `snapshot` if `view` is still the current token
///
/// Returns false when the view has moved on.
fn publish(
    state: &watch::Sender<ReportSnapshot>,
    current: &AtomicU64,
    view: u64,
    snapshot: ReportSnapshot,
) -> bool {
    let mut published = false;
    state.send_if_modified(|slot| {
        if current.load(Ordering::SeqCst) == view {
            *slot = snapshot;
            published = true;
        }
        published
    });
    published
}

async fn listen(
    accessor: ReportAccessor,
    id: ReportId,
    view: u64,
    current: Arc<AtomicU64>,
    state: Arc<watch::Sender<ReportSnapshot>>,
    mut events: broadcast::Receiver<CacheEvent>,
) {
    loop {
        let relevant = match events.recv().await {
            Ok(CacheEvent::Updated(updated)) => updated == id,
            Ok(CacheEvent::Cleared) | Err(RecvError::Lagged(_)) => true,
            Err(RecvError::Closed) => break,
        };
        if !relevant {
            continue;
        }

        let snapshot = accessor.fetch_report(Some(&id)).await;
        if !publish(&state, &current, view, snapshot) {
            tracing::trace!(report_id = %id, "view moved on, dropping update");
            break;
        }
    }
}
