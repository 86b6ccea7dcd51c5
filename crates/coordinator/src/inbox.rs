//! Bounded trigger queue where pending triggers for the same dataset
//! replace each other.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::Notify;

use crate::trigger::Trigger;

/// Outcome of enqueueing a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboxSendOutcome {
	Enqueued,
	/// A queued trigger for the same dataset was replaced.
	Coalesced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InboxSendError {
	#[error("trigger inbox is closed")]
	Closed,
	/// Every slot holds a trigger for a different dataset.
	#[error("trigger inbox is full")]
	Full,
}

struct InboxState {
	queue: VecDeque<Trigger>,
	closed: bool,
}

struct InboxInner {
	capacity: usize,
	state: Mutex<InboxState>,
	notify: Notify,
}

/// Trigger inbox shared by producers and the trigger loop.
#[derive(Clone)]
pub struct TriggerInbox {
	inner: Arc<InboxInner>,
}

impl TriggerInbox {
	/// # Panics
	///
	/// Panics if `capacity` is zero.
	pub fn new(capacity: usize) -> Self {
		assert!(capacity > 0, "inbox capacity must be > 0");
		Self {
			inner: Arc::new(InboxInner {
				capacity,
				state: Mutex::new(InboxState {
					queue: VecDeque::with_capacity(capacity),
					closed: false,
				}),
				notify: Notify::new(),
			}),
		}
	}

	pub fn send(&self, trigger: Trigger) -> Result<InboxSendOutcome, InboxSendError> {
		let mut state = self.inner.state.lock();
		if state.closed {
			return Err(InboxSendError::Closed);
		}
		if let Some(queued) = state.queue.iter_mut().find(|queued| queued.dataset == trigger.dataset) {
			*queued = trigger;
			return Ok(InboxSendOutcome::Coalesced);
		}
		if state.queue.len() >= self.inner.capacity {
			return Err(InboxSendError::Full);
		}
		state.queue.push_back(trigger);
		drop(state);
		self.inner.notify.notify_one();
		Ok(InboxSendOutcome::Enqueued)
	}

	/// Next trigger in arrival order. Returns `None` once closed and drained.
	pub async fn recv(&self) -> Option<Trigger> {
		loop {
			// Registered before the check so a close in between is not missed.
			let notified = self.inner.notify.notified();
			{
				let mut state = self.inner.state.lock();
				if let Some(trigger) = state.queue.pop_front() {
					return Some(trigger);
				}
				if state.closed {
					return None;
				}
			}
			notified.await;
		}
	}

	/// Stops accepting triggers. Queued ones are still delivered.
	pub fn close(&self) {
		self.inner.state.lock().closed = true;
		self.inner.notify.notify_waiters();
	}

	pub fn len(&self) -> usize {
		self.inner.state.lock().queue.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use super::*;
	use crate::trigger::TriggerReason;

	#[test]
	fn same_dataset_coalesces_latest_reason_wins() {
		let inbox = TriggerInbox::new(4);
		assert_eq!(inbox.send(Trigger::new("mlb", TriggerReason::NewData)), Ok(InboxSendOutcome::Enqueued));
		assert_eq!(inbox.send(Trigger::new("nba", TriggerReason::NewData)), Ok(InboxSendOutcome::Enqueued));
		assert_eq!(inbox.send(Trigger::new("mlb", TriggerReason::Manual)), Ok(InboxSendOutcome::Coalesced));
		assert_eq!(inbox.len(), 2);
	}

	#[test]
	fn full_inbox_rejects_new_datasets_but_still_coalesces() {
		let inbox = TriggerInbox::new(1);
		inbox.send(Trigger::new("mlb", TriggerReason::NewData)).unwrap();
		assert_eq!(inbox.send(Trigger::new("nba", TriggerReason::NewData)), Err(InboxSendError::Full));
		assert_eq!(inbox.send(Trigger::new("mlb", TriggerReason::PostRefresh)), Ok(InboxSendOutcome::Coalesced));
	}

	#[tokio::test]
	async fn recv_preserves_order_and_drains_after_close() {
		let inbox = TriggerInbox::new(4);
		inbox.send(Trigger::new("mlb", TriggerReason::NewData)).unwrap();
		inbox.send(Trigger::new("nba", TriggerReason::NewData)).unwrap();
		inbox.send(Trigger::new("mlb", TriggerReason::Manual)).unwrap();
		inbox.close();

		assert_eq!(inbox.send(Trigger::new("nhl", TriggerReason::NewData)), Err(InboxSendError::Closed));
		assert_eq!(inbox.recv().await, Some(Trigger::new("mlb", TriggerReason::Manual)));
		assert_eq!(inbox.recv().await, Some(Trigger::new("nba", TriggerReason::NewData)));
		assert_eq!(inbox.recv().await, None);
	}

	#[tokio::test]
	async fn close_wakes_a_waiting_receiver() {
		let inbox = TriggerInbox::new(1);
		let waiter = tokio::spawn({
			let inbox = inbox.clone();
			async move { inbox.recv().await }
		});
		tokio::time::sleep(Duration::from_millis(10)).await;
		inbox.close();
		assert_eq!(tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap(), None);
	}
}
