//! Refresh cycle orchestration.
//!
//! A [`RefreshCoordinator`] owns one dataset. Each cycle resolves the
//! dataset's gaps into the reference store and, once the write has landed,
//! asks the live view to refresh. At most one cycle per dataset runs at a
//! time; triggers arriving meanwhile are coalesced.
//!
//! [`Dispatcher`] maps datasets to coordinators and [`spawn_trigger_loop`]
//! feeds it from a [`TriggerInbox`].

mod coordinator;
mod dispatcher;
pub mod error;
mod inbox;
mod retry;
mod state;
mod trigger;
mod trigger_loop;

pub use coordinator::{CoordinatorConfig, CycleReport, RefreshCoordinator, RunOutcome};
pub use dispatcher::Dispatcher;
pub use error::{CycleError, DispatchError};
pub use inbox::{InboxSendError, InboxSendOutcome, TriggerInbox};
pub use retry::RetryPolicy;
pub use state::{CycleEvent, CycleState};
pub use trigger::{Trigger, TriggerReason};
pub use trigger_loop::spawn_trigger_loop;
