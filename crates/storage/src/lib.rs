//! Storage for AceFlow.
//!
//! File-backed project state, the task-breakdown parser, usage-event
//! stores and the resource cache.

#![warn(missing_docs)]

pub mod trait_;
pub mod project_store;
pub mod task_parser;
pub mod memory_events;
pub mod cache;

#[cfg(feature = "sqlite")]
pub mod sqlite_events;

pub use trait_::{EventStore, StorageError, Result};
pub use project_store::{read_json, write_atomic, write_json, ProjectStore, RESULT_DIR, STATE_DIR};
pub use task_parser::TaskParser;
pub use memory_events::InMemoryEventStore;
pub use cache::{CacheStats, CacheStrategy, Clock, ResourceCache, SystemClock};

#[cfg(feature = "sqlite")]
pub use sqlite_events::SqliteEventStore;
