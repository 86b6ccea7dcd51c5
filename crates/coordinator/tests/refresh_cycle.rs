#![allow(unused_crate_dependencies)]

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use dssr_coordinator::{CoordinatorConfig, CycleState, RefreshCoordinator, RetryPolicy, RunOutcome, TriggerReason};
use dssr_decoder::{CodeDecoder, decode};
use dssr_primitives::{CodeCombination, DatasetId, DecodedResult, EventRow, ReferenceEntry};
use dssr_resolver::GapResolver;
use dssr_store::{MemoryStore, MemoryView, RefreshAck, ReferenceStore, StoreError, UpsertReport, ViewRefresher};
use pretty_assertions::assert_eq;
use tokio::sync::Notify;

fn config() -> CoordinatorConfig {
	CoordinatorConfig {
		retry: RetryPolicy {
			max_attempts: 3,
			initial_backoff_ms: 1,
			max_backoff_ms: 4,
		},
		cycle_timeout: Duration::from_secs(5),
		refresh_timeout: Duration::from_secs(1),
		lookback: None,
	}
}

fn land(view: &MemoryView, dataset: &str, combos: &[(&str, &str)]) {
	view.ingest(combos.iter().enumerate().map(|(i, (lsr, ssr))| EventRow {
		dataset: DatasetId::from(dataset),
		fixture_key: format!("{dataset}-{i}"),
		landed_at: DateTime::<Utc>::from_timestamp(1_000, 0).unwrap(),
		combo: CodeCombination::new(*lsr, *ssr),
	}));
}

fn coordinator(dataset: &str, store: Arc<dyn ReferenceStore>, view: Arc<MemoryView>, refresher: Arc<dyn ViewRefresher>) -> Arc<RefreshCoordinator> {
	let resolver = GapResolver::new(store, view, Arc::new(CodeDecoder::default()));
	Arc::new(RefreshCoordinator::new(DatasetId::from(dataset), resolver, refresher, config()))
}

fn completed(outcome: RunOutcome) -> dssr_coordinator::CycleReport {
	match outcome {
		RunOutcome::Completed(report) => report,
		RunOutcome::Coalesced => panic!("cycle was coalesced"),
	}
}

/// Fails the first `failures` calls with a transient error.
struct FlakyStore {
	inner: MemoryStore,
	failures: AtomicUsize,
}

impl FlakyStore {
	fn new(failures: usize) -> Self {
		Self {
			inner: MemoryStore::new(),
			failures: AtomicUsize::new(failures),
		}
	}

	fn trip(&self) -> Result<(), StoreError> {
		let tripped = self.failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1)).is_ok();
		if tripped {
			Err(StoreError::Unavailable("connection reset".into()))
		} else {
			Ok(())
		}
	}
}

#[async_trait]
impl ReferenceStore for FlakyStore {
	async fn lookup_many(&self, combos: &BTreeSet<CodeCombination>) -> Result<HashMap<CodeCombination, Option<DecodedResult>>, StoreError> {
		self.trip()?;
		self.inner.lookup_many(combos).await
	}

	async fn upsert_many(&self, entries: Vec<ReferenceEntry>) -> Result<UpsertReport, StoreError> {
		self.trip()?;
		self.inner.upsert_many(entries).await
	}

	async fn malformed_entries(&self) -> Result<Vec<ReferenceEntry>, StoreError> {
		self.inner.malformed_entries().await
	}

	async fn entry_count(&self) -> Result<usize, StoreError> {
		self.inner.entry_count().await
	}
}

/// Counts refresh signals and checks the store already holds `expected`.
struct CheckingRefresher {
	view: Arc<MemoryView>,
	store: Arc<dyn ReferenceStore>,
	expected: Vec<CodeCombination>,
	calls: AtomicUsize,
}

#[async_trait]
impl ViewRefresher for CheckingRefresher {
	async fn refresh(&self, dataset: &DatasetId) -> Result<RefreshAck, StoreError> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		for combo in &self.expected {
			assert!(self.store.lookup(combo).await?.is_some(), "refresh signalled before {combo} was stored");
		}
		self.view.refresh(dataset).await
	}
}

/// Announces entry, then waits for the gate before refreshing.
struct GatedRefresher {
	view: Arc<MemoryView>,
	entered: Notify,
	gate: Notify,
}

#[async_trait]
impl ViewRefresher for GatedRefresher {
	async fn refresh(&self, dataset: &DatasetId) -> Result<RefreshAck, StoreError> {
		self.entered.notify_one();
		self.gate.notified().await;
		self.view.refresh(dataset).await
	}
}

/// Never acknowledges its first refresh.
struct StallingRefresher {
	view: Arc<MemoryView>,
	calls: AtomicUsize,
}

#[async_trait]
impl ViewRefresher for StallingRefresher {
	async fn refresh(&self, dataset: &DatasetId) -> Result<RefreshAck, StoreError> {
		if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
			std::future::pending::<()>().await;
		}
		self.view.refresh(dataset).await
	}
}

#[tokio::test]
async fn cycle_resolves_then_refreshes() {
	let store = Arc::new(MemoryStore::new());
	let view = Arc::new(MemoryView::new(store.clone()));
	land(&view, "mlb", &[("L1", "S2"), ("", "S2"), ("L1", "S2")]);
	let refresher = Arc::new(CheckingRefresher {
		view: view.clone(),
		store: store.clone(),
		expected: vec![CodeCombination::new("L1", "S2"), CodeCombination::new("", "S2")],
		calls: AtomicUsize::new(0),
	});
	let coordinator = coordinator("mlb", store.clone(), view.clone(), refresher.clone());
	let mut events = coordinator.subscribe();

	let report = completed(coordinator.run_cycle(TriggerReason::NewData).await);
	assert!(report.succeeded());
	assert_eq!(report.resolved, 2);
	assert_eq!(report.malformed.len(), 1);
	assert!(report.refreshed);
	assert_eq!(
		report.refresh,
		Some(RefreshAck {
			decoded: 2,
			malformed: 1,
			pending: 0,
		})
	);
	assert_eq!(report.attempts, 2);
	assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
	assert_eq!(coordinator.state(), CycleState::Done);

	let mut transitions = Vec::new();
	while let Ok(event) = events.try_recv() {
		transitions.push((event.from, event.to));
	}
	assert_eq!(
		transitions,
		[
			(CycleState::Idle, CycleState::Resolving),
			(CycleState::Resolving, CycleState::Refreshing),
			(CycleState::Refreshing, CycleState::Done),
		]
	);
}

#[tokio::test]
async fn no_gaps_means_no_refresh_signal() {
	let store = Arc::new(MemoryStore::new());
	let view = Arc::new(MemoryView::new(store.clone()));
	let refresher = Arc::new(CheckingRefresher {
		view: view.clone(),
		store: store.clone(),
		expected: Vec::new(),
		calls: AtomicUsize::new(0),
	});
	let coordinator = coordinator("mlb", store.clone(), view, refresher.clone());

	let report = completed(coordinator.run_cycle(TriggerReason::Manual).await);
	assert_eq!(report.state, CycleState::Done);
	assert_eq!(report.resolved, 0);
	assert!(!report.refreshed);
	assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
	assert_eq!(store.entry_count().await.unwrap(), 0);
}

#[tokio::test]
async fn second_cycle_after_refresh_is_idle() {
	let store = Arc::new(MemoryStore::new());
	let view = Arc::new(MemoryView::new(store.clone()));
	land(&view, "mlb", &[("L1", "S2")]);
	let coordinator = coordinator("mlb", store.clone(), view.clone(), view.clone());

	completed(coordinator.run_cycle(TriggerReason::NewData).await);
	let again = completed(coordinator.run_cycle(TriggerReason::PostRefresh).await);
	assert_eq!(again.resolved, 0);
	assert_eq!(again.awaiting_refresh, 0);
	assert!(!again.refreshed);
}

#[tokio::test]
async fn trigger_during_cycle_is_coalesced() {
	let store = Arc::new(MemoryStore::new());
	let view = Arc::new(MemoryView::new(store.clone()));
	land(&view, "mlb", &[("L1", "S2")]);
	let refresher = Arc::new(GatedRefresher {
		view: view.clone(),
		entered: Notify::new(),
		gate: Notify::new(),
	});
	let coordinator = coordinator("mlb", store.clone(), view.clone(), refresher.clone());

	let first = tokio::spawn({
		let coordinator = coordinator.clone();
		async move { coordinator.run_cycle(TriggerReason::NewData).await }
	});
	refresher.entered.notified().await;
	assert_eq!(coordinator.state(), CycleState::Refreshing);

	assert_eq!(coordinator.run_cycle(TriggerReason::NewData).await, RunOutcome::Coalesced);
	assert_eq!(coordinator.run_cycle(TriggerReason::Manual).await, RunOutcome::Coalesced);
	assert_eq!(coordinator.coalesced_count(), 2);

	refresher.gate.notify_one();
	let report = completed(first.await.unwrap());
	assert!(report.succeeded());
	assert_eq!(store.entry_count().await.unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn transient_store_errors_are_retried() {
	let store = Arc::new(FlakyStore::new(2));
	let view = Arc::new(MemoryView::new(store.clone()));
	land(&view, "mlb", &[("L1", "S2")]);
	let coordinator = coordinator("mlb", store.clone(), view.clone(), view.clone());

	let report = completed(coordinator.run_cycle(TriggerReason::NewData).await);
	assert!(report.succeeded(), "{:?}", report.failure);
	assert_eq!(report.attempts, 4);
	assert_eq!(report.resolved, 1);
	assert_eq!(view.summary(&DatasetId::from("mlb")).decoded, 1);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_fail_the_cycle_without_writes() {
	let store = Arc::new(FlakyStore::new(usize::MAX));
	let view = Arc::new(MemoryView::new(store.clone()));
	land(&view, "mlb", &[("L1", "S2")]);
	let coordinator = coordinator("mlb", store.clone(), view.clone(), view.clone());

	let report = completed(coordinator.run_cycle(TriggerReason::NewData).await);
	assert_eq!(report.state, CycleState::Failed);
	assert!(!report.refreshed);
	assert!(report.failure.as_deref().is_some_and(|msg| msg.starts_with("giving up after 3 attempts")));
	assert_eq!(report.attempts, 3);
	assert_eq!(store.entry_count().await.unwrap(), 0);
	assert_eq!(view.summary(&DatasetId::from("mlb")).pending, 1);

	// A failed cycle does not wedge the coordinator.
	store.failures.store(0, Ordering::SeqCst);
	assert!(completed(coordinator.run_cycle(TriggerReason::Manual).await).succeeded());
}

#[tokio::test(start_paused = true)]
async fn unacknowledged_refresh_times_out() {
	let store = Arc::new(MemoryStore::new());
	let view = Arc::new(MemoryView::new(store.clone()));
	land(&view, "mlb", &[("L1", "S2")]);
	let refresher = Arc::new(StallingRefresher {
		view: view.clone(),
		calls: AtomicUsize::new(0),
	});
	let coordinator = coordinator("mlb", store.clone(), view.clone(), refresher);

	let report = completed(coordinator.run_cycle(TriggerReason::NewData).await);
	assert_eq!(report.state, CycleState::Failed);
	assert_eq!(report.failure.as_deref(), Some("refresh timed out after 1s"));
	assert_eq!(report.attempts, 2);
	// The write landed before the signal and stays.
	assert_eq!(store.entry_count().await.unwrap(), 1);

	// Nothing new to write, so no second signal; the row waits for the next refresh.
	let retry = completed(coordinator.run_cycle(TriggerReason::Manual).await);
	assert!(retry.succeeded());
	assert_eq!(retry.resolved, 0);
	assert_eq!(retry.awaiting_refresh, 1);
	assert!(!retry.refreshed);
}

#[tokio::test]
async fn already_cached_gaps_do_not_signal_refresh() {
	let combo = CodeCombination::new("L1", "S2");
	let store = Arc::new(MemoryStore::with_entries(vec![ReferenceEntry::new(
		combo.clone(),
		decode(&combo),
		DateTime::<Utc>::from_timestamp(0, 0).unwrap(),
	)]));
	let view = Arc::new(MemoryView::new(store.clone()));
	land(&view, "mlb", &[("L1", "S2")]);
	let refresher = Arc::new(CheckingRefresher {
		view: view.clone(),
		store: store.clone(),
		expected: Vec::new(),
		calls: AtomicUsize::new(0),
	});
	let coordinator = coordinator("mlb", store.clone(), view.clone(), refresher.clone());

	let report = completed(coordinator.run_cycle(TriggerReason::PostRefresh).await);
	assert_eq!(report.state, CycleState::Done);
	assert_eq!(report.resolved, 0);
	assert_eq!(report.awaiting_refresh, 1);
	assert!(!report.refreshed);
	assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn default_config_covers_rows_landed_long_ago() {
	let store = Arc::new(MemoryStore::new());
	let view = Arc::new(MemoryView::new(store.clone()));
	view.ingest([EventRow {
		dataset: DatasetId::from("mlb"),
		fixture_key: "F1".into(),
		landed_at: Utc::now() - TimeDelta::hours(30),
		combo: CodeCombination::new("L1", "S2"),
	}]);
	let resolver = GapResolver::new(store.clone(), view.clone(), Arc::new(CodeDecoder::default()));
	let coordinator = RefreshCoordinator::new(DatasetId::from("mlb"), resolver, view.clone(), CoordinatorConfig::default());

	let report = completed(coordinator.run_cycle(TriggerReason::NewData).await);
	assert!(report.succeeded());
	assert_eq!(report.resolved, 1);
	assert_eq!(store.entry_count().await.unwrap(), 1);
	assert_eq!(view.summary(&DatasetId::from("mlb")).pending, 0);
}

#[tokio::test(start_paused = true)]
async fn cancelled_cycle_releases_the_slot() {
	let store = Arc::new(MemoryStore::new());
	let view = Arc::new(MemoryView::new(store.clone()));
	land(&view, "mlb", &[("L1", "S2")]);
	let refresher = Arc::new(StallingRefresher {
		view: view.clone(),
		calls: AtomicUsize::new(0),
	});
	let coordinator = coordinator("mlb", store.clone(), view.clone(), refresher.clone());

	let stuck = tokio::spawn({
		let coordinator = coordinator.clone();
		async move { coordinator.run_cycle(TriggerReason::NewData).await }
	});
	while refresher.calls.load(Ordering::SeqCst) == 0 {
		tokio::task::yield_now().await;
	}
	stuck.abort();
	assert!(stuck.await.unwrap_err().is_cancelled());
	assert_eq!(coordinator.state(), CycleState::Failed);

	assert!(completed(coordinator.run_cycle(TriggerReason::Manual).await).succeeded());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_cycles_share_one_entry() {
	let store = Arc::new(MemoryStore::new());
	let east = Arc::new(MemoryView::new(store.clone()));
	let west = Arc::new(MemoryView::new(store.clone()));
	land(&east, "east", &[("L9", "S9")]);
	land(&west, "west", &[("L9", "S9")]);
	let east = coordinator("east", store.clone(), east.clone(), east);
	let west = coordinator("west", store.clone(), west.clone(), west);

	let (a, b) = tokio::join!(
		tokio::spawn({
			let east = east.clone();
			async move { east.run_cycle(TriggerReason::NewData).await }
		}),
		tokio::spawn({
			let west = west.clone();
			async move { west.run_cycle(TriggerReason::NewData).await }
		}),
	);
	let (a, b) = (completed(a.unwrap()), completed(b.unwrap()));

	assert!(a.succeeded() && b.succeeded());
	assert!(a.corrections + b.corrections <= 1);
	assert_eq!(store.entry_count().await.unwrap(), 1);
	assert_eq!(
		store.lookup(&CodeCombination::new("L9", "S9")).await.unwrap().and_then(|result| result.text()).as_deref(),
		Some("Lateness reason 9 / Suspension reason 9")
	);
}

#[tokio::test]
async fn report_serializes_for_operators() {
	let store = Arc::new(MemoryStore::new());
	let view = Arc::new(MemoryView::new(store.clone()));
	land(&view, "mlb", &[("LX", "S1")]);
	let coordinator = coordinator("mlb", store, view.clone(), view);

	let report = completed(coordinator.run_cycle(TriggerReason::NewData).await);
	let json = serde_json::to_value(&report).unwrap();
	assert_eq!(json["dataset"], "mlb");
	assert_eq!(json["trigger"], "new_data");
	assert_eq!(json["state"], "done");
	assert_eq!(json["malformed"][0]["combo"]["lsr"], "LX");
}
