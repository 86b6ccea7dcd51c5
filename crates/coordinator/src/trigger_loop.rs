use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::coordinator::{CycleReport, RunOutcome};
use crate::dispatcher::Dispatcher;
use crate::inbox::TriggerInbox;

/// Drains `inbox`, running each trigger on its own task so datasets
/// progress independently. Finished cycle reports are published on
/// `reports`.
///
/// Cancellation aborts in-flight cycles, which end in `Failed`. Closing the
/// inbox instead lets them finish before the loop returns.
pub fn spawn_trigger_loop(
	dispatcher: Arc<Dispatcher>,
	inbox: TriggerInbox,
	reports: broadcast::Sender<CycleReport>,
	cancel: CancellationToken,
) -> JoinHandle<()> {
	tokio::spawn(async move {
		let mut cycles = JoinSet::new();
		loop {
			tokio::select! {
				biased;
				_ = cancel.cancelled() => {
					tracing::info!(in_flight = cycles.len(), "trigger_loop.cancelled");
					cycles.shutdown().await;
					return;
				}
				Some(joined) = cycles.join_next() => {
					if let Err(err) = joined {
						tracing::error!(error = %err, "trigger_loop.cycle_panicked");
					}
				}
				next = inbox.recv() => {
					let Some(trigger) = next else { break };
					let dispatcher = Arc::clone(&dispatcher);
					let reports = reports.clone();
					cycles.spawn(async move {
						match dispatcher.dispatch(trigger).await {
							Ok(RunOutcome::Completed(report)) => {
								let _ = reports.send(report);
							}
							Ok(RunOutcome::Coalesced) => {}
							Err(err) => tracing::warn!(error = %err, "trigger_loop.dispatch_failed"),
						}
					});
				}
			}
		}

		while let Some(joined) = cycles.join_next().await {
			if let Err(err) = joined {
				tracing::error!(error = %err, "trigger_loop.cycle_panicked");
			}
		}
		tracing::debug!("trigger_loop.drained");
	})
}
