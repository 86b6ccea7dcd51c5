//! Storage boundary of the decode cache.
//!
//! - [`ReferenceStore`]: the persisted combination → decoded result table,
//!   with [`MemoryStore`] and [`JsonFileStore`] adapters.
//! - [`LiveView`] / [`ViewRefresher`]: the gap query and refresh signal of
//!   the joined event view, with the in-memory [`MemoryView`].

mod arena;
pub mod error;
mod file;
mod memory;
mod reference;
pub mod view;

pub use error::{Result, StoreError};
pub use file::JsonFileStore;
pub use memory::MemoryStore;
pub use reference::{Correction, ReferenceStore, UpsertReport};
pub use view::{GapScope, LiveView, MemoryView, RefreshAck, ViewRefresher};
