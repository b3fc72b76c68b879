//! The candidate collection cache service.
//!
//! `CandidateCache` holds the one authoritative in-memory snapshot of the
//! candidate collection and mediates every read and write against the remote
//! API. Consumers subscribe to the `loading` and `candidates` watch channels;
//! late subscribers immediately observe the current value, and every publish
//! is delivered in order.
//!
//! Mutations follow a replace-whole-collection discipline: each successful
//! operation takes one snapshot, computes the next collection, and publishes
//! it wholesale. Nothing holds a lock across a network round trip.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Duration, Instant};
use tracing::{debug, error, warn};

use crate::api::CandidateApi;
use crate::models::Candidate;

// ============================================================================
// Constants
// ============================================================================

/// How long a successful load keeps the collection fresh.
/// Refreshes inside this window are no-ops, sparing the server redundant
/// full-collection reads. The window is boundary-inclusive.
const CACHE_FRESH_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Extra delay applied after fetch and delete responses.
/// Keeps loading indicators visible even against a fast local API.
const SIMULATED_LATENCY: Duration = Duration::from_secs(1);

/// Buffer size for the background failure channel.
/// Detached refreshes are rare; 16 leaves headroom before errors are dropped.
const ERROR_CHANNEL_SIZE: usize = 16;

// ============================================================================
// Cache service
// ============================================================================

struct Inner<A> {
    api: A,
    loading: watch::Sender<bool>,
    candidates: watch::Sender<Vec<Candidate>>,
    /// Monotonic time of the last successful full load; None until then
    last_load: Mutex<Option<Instant>>,
    errors_tx: mpsc::Sender<anyhow::Error>,
    errors_rx: Mutex<Option<mpsc::Receiver<anyhow::Error>>>,
}

/// Reactive cache over the remote candidate collection.
/// Clone is cheap - the state lives behind an Arc shared by all handles.
/// Create one per application (or per test) and pass clones to consumers.
pub struct CandidateCache<A> {
    inner: Arc<Inner<A>>,
}

impl<A> Clone for CandidateCache<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A> CandidateCache<A>
where
    A: CandidateApi + 'static,
{
    pub fn new(api: A) -> Self {
        let (loading, _) = watch::channel(false);
        let (candidates, _) = watch::channel(Vec::new());
        let (errors_tx, errors_rx) = mpsc::channel(ERROR_CHANNEL_SIZE);

        Self {
            inner: Arc::new(Inner {
                api,
                loading,
                candidates,
                last_load: Mutex::new(None),
                errors_tx,
                errors_rx: Mutex::new(Some(errors_rx)),
            }),
        }
    }

    /// Subscribe to the loading flag. The receiver starts at the current
    /// value and sees every subsequent transition.
    pub fn loading(&self) -> watch::Receiver<bool> {
        self.inner.loading.subscribe()
    }

    /// Subscribe to collection snapshots. The receiver starts at the latest
    /// snapshot and sees every subsequent publish in order.
    pub fn candidates(&self) -> watch::Receiver<Vec<Candidate>> {
        self.inner.candidates.subscribe()
    }

    /// Take the receiver for failures of detached background tasks.
    /// Returns None if it was already taken.
    pub fn error_receiver(&self) -> Option<mpsc::Receiver<anyhow::Error>> {
        self.inner.errors_rx.lock().unwrap().take()
    }

    fn set_loading(&self, loading: bool) {
        self.inner.loading.send_replace(loading);
    }

    fn is_fresh(&self) -> bool {
        match *self.inner.last_load.lock().unwrap() {
            Some(at) => at.elapsed() <= CACHE_FRESH_WINDOW,
            None => false,
        }
    }

    /// Reload the full collection from the server.
    ///
    /// A no-op while the last successful load is within the fresh window.
    /// On failure the loading flag is reset, no load time is recorded, and
    /// the cached collection is left untouched.
    pub async fn refresh(&self) -> Result<()> {
        if self.is_fresh() {
            debug!("Collection still fresh, skipping fetch");
            return Ok(());
        }

        self.set_loading(true);

        let candidates = match self.inner.api.list_candidates().await {
            Ok(list) => list,
            Err(e) => {
                self.set_loading(false);
                return Err(e.context("failed to refresh candidate collection"));
            }
        };

        time::sleep(SIMULATED_LATENCY).await;

        *self.inner.last_load.lock().unwrap() = Some(Instant::now());
        let count = candidates.len();
        self.inner.candidates.send_replace(candidates);
        self.set_loading(false);

        debug!(count, "Candidate collection refreshed");
        Ok(())
    }

    /// Fire-and-forget form of [`refresh`](Self::refresh). Failures are
    /// logged and forwarded to the error channel rather than dropped.
    pub fn spawn_refresh(&self) {
        let cache = self.clone();
        tokio::spawn(async move {
            if let Err(e) = cache.refresh().await {
                warn!(error = %e, "Background refresh failed");
                cache.report_error(e);
            }
        });
    }

    fn report_error(&self, err: anyhow::Error) {
        if let Err(e) = self.inner.errors_tx.try_send(err) {
            error!(error = %e, "Dropping background failure - error channel full or closed");
        }
    }

    /// Live view of a single candidate.
    ///
    /// If the collection has never been loaded this triggers a background
    /// refresh as a side effect; the returned watch yields `None` until a
    /// snapshot containing the id arrives.
    pub fn candidate(&self, id: u64) -> CandidateWatch {
        let never_loaded = self.inner.last_load.lock().unwrap().is_none();
        if never_loaded {
            debug!(id, "Collection never loaded, triggering background refresh");
            self.spawn_refresh();
        }

        CandidateWatch {
            rx: self.inner.candidates.subscribe(),
            id,
        }
    }

    /// Delete a candidate on the server, then drop it from the cached
    /// collection.
    ///
    /// The post-delete recomputation reads exactly one snapshot, taken when
    /// the delete has settled, so it runs once and does not stay subscribed
    /// to later snapshots. Removing an id that is already absent republishes
    /// an identical collection.
    pub async fn remove(&self, id: u64) -> Result<()> {
        self.set_loading(true);

        if let Err(e) = self.inner.api.delete_candidate(id).await {
            self.set_loading(false);
            return Err(e.context(format!("failed to remove candidate {id}")));
        }

        time::sleep(SIMULATED_LATENCY).await;

        let remaining: Vec<Candidate> = self
            .inner
            .candidates
            .borrow()
            .iter()
            .filter(|c| c.id != id)
            .cloned()
            .collect();
        self.inner.candidates.send_replace(remaining);
        self.set_loading(false);

        debug!(id, "Candidate removed from collection");
        Ok(())
    }

    /// Apply `patch` to the candidate with the given id, publish the result
    /// locally, then sync it to the server.
    ///
    /// The local publish happens before the PATCH request is sent, so
    /// subscribers see the change immediately. A failed request is returned
    /// to the caller but the optimistic value is not rolled back; the
    /// divergence lasts until the next full refresh. Unknown ids are a
    /// no-op.
    pub async fn update<F>(&self, id: u64, patch: F) -> Result<()>
    where
        F: FnOnce(Candidate) -> Candidate + Send,
    {
        let mut next = self.inner.candidates.borrow().clone();
        let updated = match next.iter_mut().find(|c| c.id == id) {
            Some(slot) => {
                let mut patched = patch(slot.clone());
                // ids are server-assigned; a patch cannot move one
                patched.id = id;
                *slot = patched.clone();
                patched
            }
            None => {
                debug!(id, "Update skipped, candidate not in collection");
                return Ok(());
            }
        };

        self.inner.candidates.send_replace(next);

        if let Err(e) = self.inner.api.patch_candidate(&updated).await {
            warn!(id, error = %e, "Patch request failed after optimistic update");
            return Err(e.context(format!("failed to sync update of candidate {id}")));
        }

        Ok(())
    }

    /// Mark a candidate as hired by the given company
    pub async fn hire(&self, id: u64, company: impl Into<String>) -> Result<()> {
        let company = company.into();
        self.update(id, move |c| c.with_company(company)).await
    }
}

// ============================================================================
// Derived per-candidate view
// ============================================================================

/// Watch over a single candidate, derived from collection snapshots.
///
/// `latest` recomputes the lookup against the newest snapshot, so the view
/// follows the candidate's fields across updates and turns `None` once the
/// candidate leaves the collection.
pub struct CandidateWatch {
    rx: watch::Receiver<Vec<Candidate>>,
    id: u64,
}

impl CandidateWatch {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// This candidate as of the latest snapshot, or None when the collection
    /// has not been loaded yet or holds no matching id.
    pub fn latest(&self) -> Option<Candidate> {
        self.rx.borrow().iter().find(|c| c.id == self.id).cloned()
    }

    /// Wait until a new collection snapshot is published. Returns false once
    /// the cache has been dropped and no further snapshots can arrive.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Notify;

    fn cand(id: u64) -> Candidate {
        Candidate {
            id,
            first_name: format!("First{id}"),
            last_name: format!("Last{id}"),
            job: Some("Developer".to_string()),
            company: None,
            skills: vec!["rust".to_string()],
            image_url: None,
        }
    }

    fn hired(id: u64, company: &str) -> Candidate {
        cand(id).with_company(company)
    }

    /// Gate that lets a test hold an API call open until released
    #[derive(Default)]
    struct Gate(Mutex<Option<Arc<Notify>>>);

    impl Gate {
        fn hold(&self) -> Arc<Notify> {
            let notify = Arc::new(Notify::new());
            *self.0.lock().unwrap() = Some(notify.clone());
            notify
        }

        async fn pass(&self) {
            let gate = self.0.lock().unwrap().clone();
            if let Some(gate) = gate {
                gate.notified().await;
            }
        }
    }

    #[derive(Default)]
    struct MockState {
        candidates: Mutex<Vec<Candidate>>,
        list_calls: AtomicUsize,
        deleted: Mutex<Vec<u64>>,
        patched: Mutex<Vec<Candidate>>,
        fail_list: AtomicBool,
        fail_delete: AtomicBool,
        fail_patch: AtomicBool,
        list_gate: Gate,
        patch_gate: Gate,
    }

    #[derive(Clone, Default)]
    struct MockApi {
        state: Arc<MockState>,
    }

    impl MockApi {
        fn with_candidates(candidates: Vec<Candidate>) -> Self {
            let api = Self::default();
            *api.state.candidates.lock().unwrap() = candidates;
            api
        }

        fn list_calls(&self) -> usize {
            self.state.list_calls.load(Ordering::SeqCst)
        }

        fn deleted(&self) -> Vec<u64> {
            self.state.deleted.lock().unwrap().clone()
        }

        fn patched(&self) -> Vec<Candidate> {
            self.state.patched.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CandidateApi for MockApi {
        async fn list_candidates(&self) -> Result<Vec<Candidate>> {
            self.state.list_calls.fetch_add(1, Ordering::SeqCst);
            self.state.list_gate.pass().await;
            if self.state.fail_list.load(Ordering::SeqCst) {
                anyhow::bail!("mock transport failure");
            }
            Ok(self.state.candidates.lock().unwrap().clone())
        }

        async fn delete_candidate(&self, id: u64) -> Result<()> {
            if self.state.fail_delete.load(Ordering::SeqCst) {
                anyhow::bail!("mock transport failure");
            }
            self.state.deleted.lock().unwrap().push(id);
            Ok(())
        }

        async fn patch_candidate(&self, candidate: &Candidate) -> Result<()> {
            self.state.patch_gate.pass().await;
            if self.state.fail_patch.load(Ordering::SeqCst) {
                anyhow::bail!("mock transport failure");
            }
            self.state.patched.lock().unwrap().push(candidate.clone());
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_skips_inside_fresh_window() {
        let api = MockApi::with_candidates(vec![cand(1)]);
        let cache = CandidateCache::new(api.clone());

        cache.refresh().await.unwrap();
        assert_eq!(api.list_calls(), 1);

        // Immediately after a load the window suppresses the fetch
        cache.refresh().await.unwrap();
        assert_eq!(api.list_calls(), 1);

        // The boundary is inclusive: exactly five minutes is still fresh
        tokio::time::advance(Duration::from_secs(300)).await;
        cache.refresh().await.unwrap();
        assert_eq!(api.list_calls(), 1);

        tokio::time::advance(Duration::from_secs(1)).await;
        cache.refresh().await.unwrap();
        assert_eq!(api.list_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn loading_flag_brackets_refresh() {
        let api = MockApi::with_candidates(vec![cand(1), cand(2)]);
        let release = api.state.list_gate.hold();
        let cache = CandidateCache::new(api.clone());

        let mut loading = cache.loading();
        assert!(!*loading.borrow());

        let task = tokio::spawn({
            let cache = cache.clone();
            async move { cache.refresh().await }
        });

        // loading goes true when the fetch starts...
        loading.changed().await.unwrap();
        assert!(*loading.borrow());
        // ...and the collection is untouched while the request is in flight
        assert!(cache.candidates().borrow().is_empty());

        release.notify_one();
        task.await.unwrap().unwrap();

        assert!(!*loading.borrow());
        assert_eq!(cache.candidates().borrow().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn candidate_watch_tracks_snapshots() {
        let api = MockApi::with_candidates(vec![cand(7), cand(8)]);
        let cache = CandidateCache::new(api.clone());

        // Cold cache: candidate() kicks off the initial load itself
        let mut watch = cache.candidate(7);
        assert_eq!(watch.latest(), None);

        assert!(watch.changed().await);
        assert_eq!(watch.latest(), Some(cand(7)));
        assert_eq!(api.list_calls(), 1);

        // A warm cache does not re-trigger the load
        let other = cache.candidate(8);
        assert_eq!(other.latest(), Some(cand(8)));
        assert_eq!(api.list_calls(), 1);

        cache.remove(7).await.unwrap();
        assert_eq!(watch.latest(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn remove_filters_exactly_one_id() {
        let api = MockApi::with_candidates(vec![cand(1), cand(2), cand(3)]);
        let cache = CandidateCache::new(api.clone());
        cache.refresh().await.unwrap();

        cache.remove(2).await.unwrap();

        let snapshot = cache.candidates().borrow().clone();
        assert_eq!(snapshot, vec![cand(1), cand(3)]);
        assert_eq!(api.deleted(), vec![2]);
        assert!(!*cache.loading().borrow());
    }

    #[tokio::test(start_paused = true)]
    async fn remove_of_absent_id_keeps_collection_identical() {
        let api = MockApi::with_candidates(vec![cand(1), cand(2)]);
        let cache = CandidateCache::new(api.clone());
        cache.refresh().await.unwrap();

        cache.remove(99).await.unwrap();

        let snapshot = cache.candidates().borrow().clone();
        assert_eq!(snapshot, vec![cand(1), cand(2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn update_publishes_before_patch_settles() {
        let api = MockApi::with_candidates(vec![hired(5, "A"), cand(6)]);
        let release = api.state.patch_gate.hold();
        let cache = CandidateCache::new(api.clone());
        cache.refresh().await.unwrap();

        let mut rx = cache.candidates();
        let task = tokio::spawn({
            let cache = cache.clone();
            async move { cache.hire(5, "B").await }
        });

        // The optimistic snapshot lands while the PATCH is still in flight
        rx.changed().await.unwrap();
        let snapshot = rx.borrow().clone();
        assert_eq!(snapshot[0].company.as_deref(), Some("B"));
        assert_eq!(snapshot[1], cand(6));
        assert!(api.patched().is_empty());

        release.notify_one();
        task.await.unwrap().unwrap();

        // The request carried the updated entity
        let patched = api.patched();
        assert_eq!(patched.len(), 1);
        assert_eq!(patched[0].id, 5);
        assert_eq!(patched[0].company.as_deref(), Some("B"));
    }

    #[tokio::test(start_paused = true)]
    async fn update_failure_keeps_optimistic_value() {
        let api = MockApi::with_candidates(vec![hired(5, "A")]);
        let cache = CandidateCache::new(api.clone());
        cache.refresh().await.unwrap();
        api.state.fail_patch.store(true, Ordering::SeqCst);

        let result = cache.hire(5, "B").await;
        assert!(result.is_err());

        // No rollback: the local collection diverges until the next refresh
        let snapshot = cache.candidates().borrow().clone();
        assert_eq!(snapshot[0].company.as_deref(), Some("B"));
    }

    #[tokio::test(start_paused = true)]
    async fn update_of_absent_id_is_a_noop() {
        let api = MockApi::with_candidates(vec![cand(1)]);
        let cache = CandidateCache::new(api.clone());
        cache.refresh().await.unwrap();

        let rx = cache.candidates();
        cache.hire(42, "B").await.unwrap();

        assert!(!rx.has_changed().unwrap());
        assert!(api.patched().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_failure_resets_loading_and_refetches() {
        let api = MockApi::with_candidates(vec![cand(1)]);
        api.state.fail_list.store(true, Ordering::SeqCst);
        let cache = CandidateCache::new(api.clone());

        let result = cache.refresh().await;
        assert!(result.is_err());
        assert!(!*cache.loading().borrow());
        assert!(cache.candidates().borrow().is_empty());

        // No load time was recorded, so the next refresh is not suppressed
        api.state.fail_list.store(false, Ordering::SeqCst);
        cache.refresh().await.unwrap();
        assert_eq!(api.list_calls(), 2);
        assert_eq!(cache.candidates().borrow().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn remove_failure_leaves_collection_untouched() {
        let api = MockApi::with_candidates(vec![cand(1), cand(2)]);
        let cache = CandidateCache::new(api.clone());
        cache.refresh().await.unwrap();
        api.state.fail_delete.store(true, Ordering::SeqCst);

        let result = cache.remove(1).await;
        assert!(result.is_err());
        assert!(!*cache.loading().borrow());
        assert_eq!(cache.candidates().borrow().len(), 2);
        assert!(api.deleted().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn late_subscriber_sees_latest_snapshot() {
        let api = MockApi::with_candidates(vec![cand(1), cand(2)]);
        let cache = CandidateCache::new(api.clone());
        cache.refresh().await.unwrap();
        cache.remove(1).await.unwrap();

        // Subscribing after the mutation replays the post-mutation snapshot
        let rx = cache.candidates();
        assert_eq!(rx.borrow().clone(), vec![cand(2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_refresh_failures_reach_error_channel() {
        let api = MockApi::with_candidates(vec![]);
        api.state.fail_list.store(true, Ordering::SeqCst);
        let cache = CandidateCache::new(api.clone());

        let mut errors = cache.error_receiver().expect("receiver available");
        assert!(cache.error_receiver().is_none(), "receiver is take-once");

        cache.spawn_refresh();

        let err = errors.recv().await.expect("failure delivered");
        assert!(err.to_string().contains("refresh"));
    }
}
