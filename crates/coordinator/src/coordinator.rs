use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};
use dssr_primitives::DatasetId;
use dssr_resolver::{GapReport, GapResolver, MalformedCombo};
use dssr_store::{GapScope, RefreshAck, ViewRefresher};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::error::CycleError;
use crate::retry::{RetryPolicy, with_retry};
use crate::state::{CycleEvent, CycleState};
use crate::trigger::TriggerReason;

const EVENT_BUFFER: usize = 64;

/// Tunables for one coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorConfig {
	pub retry: RetryPolicy,
	/// Budget for the whole cycle, refresh included.
	pub cycle_timeout: Duration,
	/// How long to wait for the view to acknowledge a refresh.
	pub refresh_timeout: Duration,
	/// Only rows landed within this window are scanned for gaps. `None`
	/// scans every row.
	pub lookback: Option<TimeDelta>,
}

impl Default for CoordinatorConfig {
	fn default() -> Self {
		Self {
			retry: RetryPolicy::default(),
			cycle_timeout: Duration::from_secs(300),
			refresh_timeout: Duration::from_secs(30),
			lookback: None,
		}
	}
}

/// Status report of one completed cycle, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
	pub dataset: DatasetId,
	pub trigger: TriggerReason,
	pub started_at: DateTime<Utc>,
	pub finished_at: DateTime<Utc>,
	pub elapsed_ms: u64,
	pub state: CycleState,
	pub resolved: usize,
	pub awaiting_refresh: usize,
	pub corrections: usize,
	pub malformed: Vec<MalformedCombo>,
	/// Whether the view was asked to refresh.
	pub refreshed: bool,
	pub refresh: Option<RefreshAck>,
	/// Store/view calls made, retries included.
	pub attempts: u32,
	pub failure: Option<String>,
}

impl CycleReport {
	pub fn succeeded(&self) -> bool {
		self.state == CycleState::Done
	}
}

/// Result of asking a coordinator to run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
	Completed(CycleReport),
	/// Another cycle for the dataset was in flight and absorbs this trigger.
	Coalesced,
}

impl RunOutcome {
	pub fn report(&self) -> Option<&CycleReport> {
		match self {
			Self::Completed(report) => Some(report),
			Self::Coalesced => None,
		}
	}
}

#[derive(Default)]
struct Progress {
	gaps: Option<GapReport>,
	refresh: Option<RefreshAck>,
	refreshed: bool,
	attempts: u32,
}

/// Drives detect → resolve → commit → signal for one dataset, one cycle at
/// a time.
///
/// The store write always completes before the refresh signal, so a
/// refreshed view never misses an entry the cycle resolved.
pub struct RefreshCoordinator {
	dataset: DatasetId,
	resolver: GapResolver,
	refresher: Arc<dyn ViewRefresher>,
	config: CoordinatorConfig,
	state: Mutex<CycleState>,
	running: AtomicBool,
	coalesced: AtomicU64,
	events: broadcast::Sender<CycleEvent>,
}

impl RefreshCoordinator {
	pub fn new(dataset: DatasetId, resolver: GapResolver, refresher: Arc<dyn ViewRefresher>, config: CoordinatorConfig) -> Self {
		let (events, _) = broadcast::channel(EVENT_BUFFER);
		Self {
			dataset,
			resolver,
			refresher,
			config,
			state: Mutex::new(CycleState::Idle),
			running: AtomicBool::new(false),
			coalesced: AtomicU64::new(0),
			events,
		}
	}

	pub fn dataset(&self) -> &DatasetId {
		&self.dataset
	}

	pub fn state(&self) -> CycleState {
		*self.state.lock()
	}

	pub fn config(&self) -> &CoordinatorConfig {
		&self.config
	}

	/// Triggers absorbed by an in-flight cycle so far.
	pub fn coalesced_count(&self) -> u64 {
		self.coalesced.load(Ordering::Relaxed)
	}

	/// Subscribes to state transitions.
	pub fn subscribe(&self) -> broadcast::Receiver<CycleEvent> {
		self.events.subscribe()
	}

	/// Runs one cycle, or coalesces into the one already running.
	///
	/// Failures are reported in the returned [`CycleReport`]; the
	/// coordinator stays usable and the next trigger starts afresh.
	pub async fn run_cycle(&self, trigger: TriggerReason) -> RunOutcome {
		let Some(flight) = Flight::take(self) else {
			let coalesced = self.coalesced.fetch_add(1, Ordering::Relaxed) + 1;
			tracing::info!(dataset = %self.dataset, %trigger, coalesced, "cycle.coalesced");
			return RunOutcome::Coalesced;
		};

		let started_at = Utc::now();
		let clock = Instant::now();
		self.transition(CycleState::Resolving);

		let mut progress = Progress::default();
		let result = match tokio::time::timeout(self.config.cycle_timeout, self.drive(&mut progress)).await {
			Ok(result) => result,
			Err(_) => Err(CycleError::Timeout {
				phase: "cycle",
				after: self.config.cycle_timeout,
			}),
		};

		let state = match &result {
			Ok(()) => CycleState::Done,
			Err(err) => {
				tracing::warn!(dataset = %self.dataset, %trigger, error = %err, "cycle.failed");
				CycleState::Failed
			}
		};
		flight.land(state);

		let gaps = progress.gaps.unwrap_or_default();
		let report = CycleReport {
			dataset: self.dataset.clone(),
			trigger,
			started_at,
			finished_at: Utc::now(),
			elapsed_ms: u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX),
			state,
			resolved: gaps.resolved_count(),
			awaiting_refresh: gaps.awaiting_refresh,
			corrections: gaps.corrections,
			malformed: gaps.malformed.into_iter().chain(gaps.rejected).collect(),
			refreshed: progress.refreshed,
			refresh: progress.refresh,
			attempts: progress.attempts,
			failure: result.err().map(|err| err.to_string()),
		};
		tracing::info!(
			dataset = %report.dataset,
			%trigger,
			state = %report.state,
			resolved = report.resolved,
			malformed = report.malformed.len(),
			refreshed = report.refreshed,
			elapsed_ms = report.elapsed_ms,
			"cycle.finished"
		);
		RunOutcome::Completed(report)
	}

	async fn drive(&self, progress: &mut Progress) -> Result<(), CycleError> {
		let scope = self.scope();
		let policy = self.config.retry;
		let gaps = with_retry(&policy, &self.dataset, "resolve", &mut progress.attempts, || self.resolver.resolve_gaps(&scope)).await?;
		let needs_refresh = gaps.needs_refresh();
		progress.gaps = Some(gaps);

		if !needs_refresh {
			return Ok(());
		}

		self.transition(CycleState::Refreshing);
		progress.refreshed = true;
		let signal = with_retry(&policy, &self.dataset, "refresh", &mut progress.attempts, || self.refresher.refresh(&self.dataset));
		let ack = tokio::time::timeout(self.config.refresh_timeout, signal)
			.await
			.map_err(|_| CycleError::Timeout {
				phase: "refresh",
				after: self.config.refresh_timeout,
			})??;
		progress.refresh = Some(ack);
		Ok(())
	}

	fn scope(&self) -> GapScope {
		let scope = GapScope::dataset(self.dataset.clone());
		match self.config.lookback {
			Some(window) => scope.since(Utc::now() - window),
			None => scope,
		}
	}

	fn transition(&self, to: CycleState) {
		let from = std::mem::replace(&mut *self.state.lock(), to);
		tracing::debug!(dataset = %self.dataset, %from, %to, "cycle.state");
		let _ = self.events.send(CycleEvent {
			dataset: self.dataset.clone(),
			from,
			to,
		});
	}
}

/// Single-flight slot. Dropping it before [`Flight::land`] (the cycle
/// future was cancelled) marks the cycle failed and frees the slot.
struct Flight<'a> {
	owner: &'a RefreshCoordinator,
	landed: bool,
}

impl<'a> Flight<'a> {
	fn take(owner: &'a RefreshCoordinator) -> Option<Self> {
		owner
			.running
			.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
			.ok()
			.map(|_| Self { owner, landed: false })
	}

	fn land(mut self, state: CycleState) {
		self.owner.transition(state);
		self.landed = true;
	}
}

impl Drop for Flight<'_> {
	fn drop(&mut self) {
		if !self.landed {
			tracing::warn!(dataset = %self.owner.dataset, "cycle.abandoned");
			self.owner.transition(CycleState::Failed);
		}
		self.owner.running.store(false, Ordering::Release);
	}
}
