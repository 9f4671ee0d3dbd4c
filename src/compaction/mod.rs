//! Keyspace compaction orchestration.
//!
//! [`run_on_existing_tables`] drives one operation over a shard's tables in
//! order, tolerating tables dropped concurrently. [`major`] builds the
//! keyspace-wide major compaction on top of it: a cluster-wide coordinator
//! task with one child per shard.

/// Compaction error types.
mod error;
/// Keyspace-wide major compaction tasks.
pub mod major;
/// Sequential per-table execution.
mod runner;

pub use error::CompactionError;
pub use major::{
    force_keyspace_compaction, sort_by_live_disk_space, MajorKeyspaceCompactionTask,
    ShardMajorKeyspaceCompactionTask, FORCE_KEYSPACE_COMPACTION, MAJOR_COMPACTION,
};
pub use runner::run_on_existing_tables;
