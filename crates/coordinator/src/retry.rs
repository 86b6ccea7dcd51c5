use std::future::Future;
use std::time::Duration;

use dssr_primitives::DatasetId;
use dssr_store::StoreError;
use serde::{Deserialize, Serialize};

use crate::error::CycleError;

/// Exponential backoff for transient store failures.
///
/// Non-transient errors are never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
	/// Total attempts including the first. Zero is treated as one.
	pub max_attempts: u32,
	pub initial_backoff_ms: u64,
	pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_attempts: 4,
			initial_backoff_ms: 200,
			max_backoff_ms: 5_000,
		}
	}
}

impl RetryPolicy {
	/// A single attempt, no retries.
	pub fn never() -> Self {
		Self {
			max_attempts: 1,
			..Self::default()
		}
	}

	/// Delay after the `failed`-th consecutive failure (1-based).
	pub fn backoff(&self, failed: u32) -> Duration {
		let shift = failed.saturating_sub(1).min(16);
		let delay = self.initial_backoff_ms.saturating_mul(1 << shift).min(self.max_backoff_ms);
		Duration::from_millis(delay)
	}

	fn attempts(&self) -> u32 {
		self.max_attempts.max(1)
	}
}

/// Runs `op` until it succeeds, fails permanently, or the policy gives up.
///
/// Every call of `op` is added to `spent`, whatever the outcome, so the
/// caller keeps an accurate count even when the phase fails or is dropped.
pub(crate) async fn with_retry<T, F, Fut>(policy: &RetryPolicy, dataset: &DatasetId, phase: &'static str, spent: &mut u32, mut op: F) -> Result<T, CycleError>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, StoreError>>,
{
	let mut attempt = 1;
	loop {
		*spent += 1;
		match op().await {
			Ok(value) => return Ok(value),
			Err(err) if !err.is_transient() => return Err(CycleError::Store(err)),
			Err(err) if attempt >= policy.attempts() => {
				return Err(CycleError::RetriesExhausted { attempts: attempt, last: err });
			}
			Err(err) => {
				let delay = policy.backoff(attempt);
				tracing::warn!(%dataset, phase, attempt, ?delay, error = %err, "cycle.retry");
				tokio::time::sleep(delay).await;
				attempt += 1;
			}
		}
	}
}
